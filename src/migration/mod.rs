//! SeaORM database migrations.
//!
//! Tables are declared with the schema builder so the same migrations run
//! on PostgreSQL and on the SQLite databases used in development and tests.

pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_auth_tables;
mod m20260101_000002_create_product_tables;
mod m20260101_000003_create_library_tables;
mod m20260101_000004_create_execution_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_auth_tables::Migration),
            Box::new(m20260101_000002_create_product_tables::Migration),
            Box::new(m20260101_000003_create_library_tables::Migration),
            Box::new(m20260101_000004_create_execution_tables::Migration),
        ]
    }
}

pub fn uuid_primary_key<T>(name: T) -> ColumnDef
where
    T: Iden + 'static,
{
    ColumnDef::new(name).uuid().not_null().primary_key().to_owned()
}

pub fn uuid_column<T>(name: T) -> ColumnDef
where
    T: Iden + 'static,
{
    ColumnDef::new(name).uuid().not_null().to_owned()
}

pub fn timestamp_column<T>(name: T) -> ColumnDef
where
    T: Iden + 'static,
{
    ColumnDef::new(name)
        .timestamp_with_time_zone()
        .not_null()
        .to_owned()
}

/// Foreign key that cascades deletes from the parent row.
pub fn owned_by<F, C, P, K>(table: F, column: C, parent: P, key: K) -> ForeignKeyCreateStatement
where
    F: Iden + 'static,
    C: Iden + 'static,
    P: Iden + 'static,
    K: Iden + 'static,
{
    ForeignKey::create()
        .from(table, column)
        .to(parent, key)
        .on_delete(ForeignKeyAction::Cascade)
        .to_owned()
}

/// Foreign key that blocks deleting a referenced parent row.
pub fn references<F, C, P, K>(table: F, column: C, parent: P, key: K) -> ForeignKeyCreateStatement
where
    F: Iden + 'static,
    C: Iden + 'static,
    P: Iden + 'static,
    K: Iden + 'static,
{
    ForeignKey::create()
        .from(table, column)
        .to(parent, key)
        .on_delete(ForeignKeyAction::Restrict)
        .to_owned()
}

/// Optional foreign key, cleared when the parent goes away.
pub fn nullable_reference<F, C, P, K>(
    table: F,
    column: C,
    parent: P,
    key: K,
) -> ForeignKeyCreateStatement
where
    F: Iden + 'static,
    C: Iden + 'static,
    P: Iden + 'static,
    K: Iden + 'static,
{
    ForeignKey::create()
        .from(table, column)
        .to(parent, key)
        .on_delete(ForeignKeyAction::SetNull)
        .to_owned()
}
