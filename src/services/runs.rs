//! Run lifecycle: activation, deactivation and series builds.

use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::info;
use uuid::Uuid;

use crate::db::runs;
use crate::error::{AppError, AppResult};
use crate::forms::runs::concurrent_edit;
use crate::models::ObjectStatus;
use crate::models::run::RunDetail;

/// Activate a run and lock its case versions.
pub async fn activate(
    db: &DatabaseConnection,
    run_id: Uuid,
    user_id: Option<Uuid>,
) -> AppResult<RunDetail> {
    db.transaction::<_, RunDetail, AppError>(|txn| {
        Box::pin(async move {
            let run = runs::set_status(txn, run_id, ObjectStatus::Active, user_id)
                .await?
                .ok_or_else(concurrent_edit)?;
            let locked = runs::lock_case_versions(txn, &run).await?;
            info!("Activated run {} ({} case versions locked)", run_id, locked);
            runs::detail(txn, run_id).await
        })
    })
    .await
    .map_err(AppError::from)
}

pub async fn deactivate(
    db: &DatabaseConnection,
    run_id: Uuid,
    user_id: Option<Uuid>,
) -> AppResult<RunDetail> {
    runs::set_status(db, run_id, ObjectStatus::Disabled, user_id)
        .await?
        .ok_or_else(concurrent_edit)?;
    info!("Deactivated run {}", run_id);
    runs::detail(db, run_id).await
}

/// Name of the run cloned from a series for a build.
pub fn series_build_name(series_name: &str, build: &str) -> String {
    format!("{} - Build: {}", series_name, build)
}

/// Clone an active series run into an active child run for `build`. A build
/// that was cloned before gets its existing child back; the flag says
/// whether a run was created.
pub async fn clone_for_build(
    db: &DatabaseConnection,
    series_id: Uuid,
    build: &str,
    user_id: Option<Uuid>,
) -> AppResult<(RunDetail, bool)> {
    let build = build.trim().to_string();
    if build.is_empty() {
        return Err(AppError::InvalidInput("A build is required".to_string()));
    }

    db.transaction::<_, (RunDetail, bool), AppError>(|txn| {
        Box::pin(async move {
            let series = runs::detail(txn, series_id).await?;
            if !series.run.is_series {
                return Err(AppError::InvalidInput(
                    "Only series runs can be cloned for a build".to_string(),
                ));
            }
            if series.run.status != ObjectStatus::Active {
                return Err(AppError::InvalidInput(
                    "Only an active series can be cloned for a build".to_string(),
                ));
            }
            if let Some(existing) = runs::find_series_child(txn, series_id, &build).await? {
                return Ok((runs::detail(txn, existing.id).await?, false));
            }

            let child = runs::insert(
                txn,
                runs::NewRun {
                    productversion_id: series.run.productversion_id,
                    name: series_build_name(&series.run.name, &build),
                    description: series.run.description.clone(),
                    status: ObjectStatus::Draft,
                    start: Utc::now().date_naive(),
                    end: series.run.end,
                    build: Some(build.clone()),
                    is_series: false,
                    series_id: Some(series_id),
                    created_by: user_id,
                },
            )
            .await?;

            runs::replace_suites(txn, child.id, &series.suites).await?;
            runs::set_environments(txn, child.id, &series.environments).await?;

            let child = runs::set_status(txn, child.id, ObjectStatus::Active, user_id)
                .await?
                .ok_or_else(concurrent_edit)?;
            runs::lock_case_versions(txn, &child).await?;

            info!(
                "Cloned series run {} for build '{}' as run {}",
                series_id, build, child.id
            );
            Ok((runs::detail(txn, child.id).await?, true))
        })
    })
    .await
    .map_err(AppError::from)
}
