//! Migration: test cases, their versions and steps, and suites.

use sea_orm_migration::prelude::*;

use super::m20260101_000002_create_product_tables::{ProductVersions, Products};
use super::{owned_by, timestamp_column, uuid_column, uuid_primary_key};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Cases::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(Cases::Id))
                    .col(uuid_column(Cases::ProductId))
                    .col(timestamp_column(Cases::CreatedAt))
                    .foreign_key(&mut owned_by(
                        Cases::Table,
                        Cases::ProductId,
                        Products::Table,
                        Products::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CaseVersions::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(CaseVersions::Id))
                    .col(uuid_column(CaseVersions::CaseId))
                    .col(uuid_column(CaseVersions::ProductversionId))
                    .col(ColumnDef::new(CaseVersions::Name).string_len(200).not_null())
                    .col(ColumnDef::new(CaseVersions::Description).text().not_null())
                    .col(ColumnDef::new(CaseVersions::Status).string_len(30).not_null())
                    .col(timestamp_column(CaseVersions::CreatedAt))
                    .col(timestamp_column(CaseVersions::ModifiedAt))
                    .foreign_key(&mut owned_by(
                        CaseVersions::Table,
                        CaseVersions::CaseId,
                        Cases::Table,
                        Cases::Id,
                    ))
                    .foreign_key(&mut owned_by(
                        CaseVersions::Table,
                        CaseVersions::ProductversionId,
                        ProductVersions::Table,
                        ProductVersions::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        // One version of a case per product version.
        manager
            .create_index(
                Index::create()
                    .name("idx_case_versions_case_productversion")
                    .table(CaseVersions::Table)
                    .col(CaseVersions::CaseId)
                    .col(CaseVersions::ProductversionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CaseSteps::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(CaseSteps::Id))
                    .col(uuid_column(CaseSteps::CaseversionId))
                    .col(ColumnDef::new(CaseSteps::Number).integer().not_null())
                    .col(ColumnDef::new(CaseSteps::Instruction).text().not_null())
                    .col(ColumnDef::new(CaseSteps::Expected).text().not_null())
                    .foreign_key(&mut owned_by(
                        CaseSteps::Table,
                        CaseSteps::CaseversionId,
                        CaseVersions::Table,
                        CaseVersions::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Suites::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(Suites::Id))
                    .col(uuid_column(Suites::ProductId))
                    .col(ColumnDef::new(Suites::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Suites::Description).text().not_null())
                    .col(ColumnDef::new(Suites::Status).string_len(30).not_null())
                    .col(timestamp_column(Suites::CreatedAt))
                    .foreign_key(&mut owned_by(
                        Suites::Table,
                        Suites::ProductId,
                        Products::Table,
                        Products::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SuiteCases::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(SuiteCases::Id))
                    .col(uuid_column(SuiteCases::SuiteId))
                    .col(uuid_column(SuiteCases::CaseId))
                    .col(ColumnDef::new(SuiteCases::Order).integer().not_null())
                    .foreign_key(&mut owned_by(
                        SuiteCases::Table,
                        SuiteCases::SuiteId,
                        Suites::Table,
                        Suites::Id,
                    ))
                    .foreign_key(&mut owned_by(
                        SuiteCases::Table,
                        SuiteCases::CaseId,
                        Cases::Table,
                        Cases::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            SuiteCases::Table.into_iden(),
            Suites::Table.into_iden(),
            CaseSteps::Table.into_iden(),
            CaseVersions::Table.into_iden(),
            Cases::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Cases {
    Table,
    Id,
    ProductId,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum CaseVersions {
    Table,
    Id,
    CaseId,
    ProductversionId,
    Name,
    Description,
    Status,
    CreatedAt,
    ModifiedAt,
}

#[derive(DeriveIden)]
pub enum CaseSteps {
    Table,
    Id,
    CaseversionId,
    Number,
    Instruction,
    Expected,
}

#[derive(DeriveIden)]
pub enum Suites {
    Table,
    Id,
    ProductId,
    Name,
    Description,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SuiteCases {
    Table,
    Id,
    SuiteId,
    CaseId,
    Order,
}
