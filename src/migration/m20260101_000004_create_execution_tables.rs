//! Migration: runs, the case versions locked into them, and results.

use sea_orm_migration::prelude::*;

use super::m20260101_000001_create_auth_tables::Users;
use super::m20260101_000002_create_product_tables::{Environments, ProductVersions};
use super::m20260101_000003_create_library_tables::{CaseSteps, CaseVersions, Suites};
use super::{
    nullable_reference, owned_by, references, timestamp_column, uuid_column, uuid_primary_key,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Runs::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(Runs::Id))
                    .col(uuid_column(Runs::ProductversionId))
                    .col(ColumnDef::new(Runs::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Runs::Description).text().not_null())
                    .col(ColumnDef::new(Runs::Status).string_len(30).not_null())
                    .col(ColumnDef::new(Runs::Start).date().not_null())
                    .col(ColumnDef::new(Runs::End).date().null())
                    .col(ColumnDef::new(Runs::Build).string_len(200).null())
                    .col(ColumnDef::new(Runs::IsSeries).boolean().not_null())
                    .col(ColumnDef::new(Runs::SeriesId).uuid().null())
                    .col(ColumnDef::new(Runs::CcVersion).integer().not_null().default(0))
                    .col(ColumnDef::new(Runs::CreatedBy).uuid().null())
                    .col(ColumnDef::new(Runs::ModifiedBy).uuid().null())
                    .col(timestamp_column(Runs::CreatedAt))
                    .col(timestamp_column(Runs::ModifiedAt))
                    .foreign_key(&mut references(
                        Runs::Table,
                        Runs::ProductversionId,
                        ProductVersions::Table,
                        ProductVersions::Id,
                    ))
                    .foreign_key(&mut nullable_reference(
                        Runs::Table,
                        Runs::SeriesId,
                        Runs::Table,
                        Runs::Id,
                    ))
                    .foreign_key(&mut nullable_reference(
                        Runs::Table,
                        Runs::CreatedBy,
                        Users::Table,
                        Users::Id,
                    ))
                    .foreign_key(&mut nullable_reference(
                        Runs::Table,
                        Runs::ModifiedBy,
                        Users::Table,
                        Users::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RunSuites::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(RunSuites::Id))
                    .col(uuid_column(RunSuites::RunId))
                    .col(uuid_column(RunSuites::SuiteId))
                    .col(ColumnDef::new(RunSuites::Order).integer().not_null())
                    .foreign_key(&mut owned_by(
                        RunSuites::Table,
                        RunSuites::RunId,
                        Runs::Table,
                        Runs::Id,
                    ))
                    .foreign_key(&mut references(
                        RunSuites::Table,
                        RunSuites::SuiteId,
                        Suites::Table,
                        Suites::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RunEnvironments::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(RunEnvironments::Id))
                    .col(uuid_column(RunEnvironments::RunId))
                    .col(uuid_column(RunEnvironments::EnvironmentId))
                    .foreign_key(&mut owned_by(
                        RunEnvironments::Table,
                        RunEnvironments::RunId,
                        Runs::Table,
                        Runs::Id,
                    ))
                    .foreign_key(&mut references(
                        RunEnvironments::Table,
                        RunEnvironments::EnvironmentId,
                        Environments::Table,
                        Environments::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RunCaseVersions::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(RunCaseVersions::Id))
                    .col(uuid_column(RunCaseVersions::RunId))
                    .col(uuid_column(RunCaseVersions::CaseversionId))
                    .col(ColumnDef::new(RunCaseVersions::Order).integer().not_null())
                    .foreign_key(&mut owned_by(
                        RunCaseVersions::Table,
                        RunCaseVersions::RunId,
                        Runs::Table,
                        Runs::Id,
                    ))
                    .foreign_key(&mut references(
                        RunCaseVersions::Table,
                        RunCaseVersions::CaseversionId,
                        CaseVersions::Table,
                        CaseVersions::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_run_case_versions_unique")
                    .table(RunCaseVersions::Table)
                    .col(RunCaseVersions::RunId)
                    .col(RunCaseVersions::CaseversionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Results::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(Results::Id))
                    .col(uuid_column(Results::TesterId))
                    .col(uuid_column(Results::RuncaseversionId))
                    .col(uuid_column(Results::EnvironmentId))
                    .col(ColumnDef::new(Results::Status).string_len(50).not_null())
                    .col(ColumnDef::new(Results::Comment).text().not_null())
                    .col(ColumnDef::new(Results::IsLatest).boolean().not_null())
                    .col(ColumnDef::new(Results::CreatedBy).uuid().null())
                    .col(ColumnDef::new(Results::ModifiedBy).uuid().null())
                    .col(timestamp_column(Results::CreatedAt))
                    .col(timestamp_column(Results::ModifiedAt))
                    .foreign_key(&mut references(
                        Results::Table,
                        Results::TesterId,
                        Users::Table,
                        Users::Id,
                    ))
                    .foreign_key(&mut owned_by(
                        Results::Table,
                        Results::RuncaseversionId,
                        RunCaseVersions::Table,
                        RunCaseVersions::Id,
                    ))
                    .foreign_key(&mut references(
                        Results::Table,
                        Results::EnvironmentId,
                        Environments::Table,
                        Environments::Id,
                    ))
                    .foreign_key(&mut nullable_reference(
                        Results::Table,
                        Results::CreatedBy,
                        Users::Table,
                        Users::Id,
                    ))
                    .foreign_key(&mut nullable_reference(
                        Results::Table,
                        Results::ModifiedBy,
                        Users::Table,
                        Users::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        // Lookup path for result_for / other_result_for.
        manager
            .create_index(
                Index::create()
                    .name("idx_results_latest_lookup")
                    .table(Results::Table)
                    .col(Results::RuncaseversionId)
                    .col(Results::EnvironmentId)
                    .col(Results::IsLatest)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StepResults::Table)
                    .if_not_exists()
                    .col(uuid_primary_key(StepResults::Id))
                    .col(uuid_column(StepResults::ResultId))
                    .col(uuid_column(StepResults::StepId))
                    .col(ColumnDef::new(StepResults::Status).string_len(50).not_null())
                    .col(ColumnDef::new(StepResults::BugUrl).string().not_null())
                    .col(timestamp_column(StepResults::CreatedAt))
                    .foreign_key(&mut owned_by(
                        StepResults::Table,
                        StepResults::ResultId,
                        Results::Table,
                        Results::Id,
                    ))
                    .foreign_key(&mut owned_by(
                        StepResults::Table,
                        StepResults::StepId,
                        CaseSteps::Table,
                        CaseSteps::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            StepResults::Table.into_iden(),
            Results::Table.into_iden(),
            RunCaseVersions::Table.into_iden(),
            RunEnvironments::Table.into_iden(),
            RunSuites::Table.into_iden(),
            Runs::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Runs {
    Table,
    Id,
    ProductversionId,
    Name,
    Description,
    Status,
    Start,
    End,
    Build,
    IsSeries,
    SeriesId,
    CcVersion,
    CreatedBy,
    ModifiedBy,
    CreatedAt,
    ModifiedAt,
}

#[derive(DeriveIden)]
enum RunSuites {
    Table,
    Id,
    RunId,
    SuiteId,
    Order,
}

#[derive(DeriveIden)]
enum RunEnvironments {
    Table,
    Id,
    RunId,
    EnvironmentId,
}

#[derive(DeriveIden)]
enum RunCaseVersions {
    Table,
    Id,
    RunId,
    CaseversionId,
    Order,
}

#[derive(DeriveIden)]
enum Results {
    Table,
    Id,
    TesterId,
    RuncaseversionId,
    EnvironmentId,
    Status,
    Comment,
    IsLatest,
    CreatedBy,
    ModifiedBy,
    CreatedAt,
    ModifiedAt,
}

#[derive(DeriveIden)]
enum StepResults {
    Table,
    Id,
    ResultId,
    StepId,
    Status,
    BugUrl,
    CreatedAt,
}
