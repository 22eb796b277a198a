//! Migration: products, product versions and environments.

use sea_orm_migration::prelude::*;

use super::{owned_by, timestamp_column, uuid_column, uuid_primary_key};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(Products::Id))
                    .col(ColumnDef::new(Products::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Products::Description).text().not_null())
                    .col(
                        ColumnDef::new(Products::CcVersion)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(timestamp_column(Products::CreatedAt))
                    .col(timestamp_column(Products::ModifiedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductVersions::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(ProductVersions::Id))
                    .col(uuid_column(ProductVersions::ProductId))
                    .col(ColumnDef::new(ProductVersions::Version).string_len(100).not_null())
                    .col(ColumnDef::new(ProductVersions::Codename).string_len(100).not_null())
                    .col(ColumnDef::new(ProductVersions::Order).integer().not_null())
                    .col(timestamp_column(ProductVersions::CreatedAt))
                    .foreign_key(&mut owned_by(
                        ProductVersions::Table,
                        ProductVersions::ProductId,
                        Products::Table,
                        Products::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_versions_product_version")
                    .table(ProductVersions::Table)
                    .col(ProductVersions::ProductId)
                    .col(ProductVersions::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Environments::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(Environments::Id))
                    .col(ColumnDef::new(Environments::Name).string_len(200).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductVersionEnvironments::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(ProductVersionEnvironments::Id))
                    .col(uuid_column(ProductVersionEnvironments::ProductversionId))
                    .col(uuid_column(ProductVersionEnvironments::EnvironmentId))
                    .foreign_key(&mut owned_by(
                        ProductVersionEnvironments::Table,
                        ProductVersionEnvironments::ProductversionId,
                        ProductVersions::Table,
                        ProductVersions::Id,
                    ))
                    .foreign_key(&mut owned_by(
                        ProductVersionEnvironments::Table,
                        ProductVersionEnvironments::EnvironmentId,
                        Environments::Table,
                        Environments::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            ProductVersionEnvironments::Table.into_iden(),
            Environments::Table.into_iden(),
            ProductVersions::Table.into_iden(),
            Products::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum Products {
    Table,
    Id,
    Name,
    Description,
    CcVersion,
    CreatedAt,
    ModifiedAt,
}

#[derive(DeriveIden)]
pub enum ProductVersions {
    Table,
    Id,
    ProductId,
    Version,
    Codename,
    Order,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum Environments {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum ProductVersionEnvironments {
    Table,
    Id,
    ProductversionId,
    EnvironmentId,
}
