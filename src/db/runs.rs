//! Database operations for runs, their suites, environments and locked case
//! versions.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use sea_orm::*;
use uuid::Uuid;

use crate::entity::{product_version, run, run_case_version, run_environment, run_suite};
use crate::error::{AppError, AppResult};
use crate::models::ObjectStatus;
use crate::models::run::{Run, RunDetail};

/// Fields for a new run row.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub productversion_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: ObjectStatus,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub build: Option<String>,
    pub is_series: bool,
    pub series_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

/// Changes applied by the edit form.
#[derive(Debug, Clone)]
pub struct RunChanges {
    pub productversion_id: Uuid,
    pub name: String,
    pub description: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub build: Option<String>,
    pub is_series: bool,
    pub modified_by: Option<Uuid>,
}

pub async fn insert<C: ConnectionTrait>(db: &C, new: NewRun) -> AppResult<Run> {
    let now = Utc::now();
    let model = run::ActiveModel {
        id: Set(Uuid::now_v7()),
        productversion_id: Set(new.productversion_id),
        name: Set(new.name),
        description: Set(new.description),
        status: Set(new.status.as_str().to_string()),
        start: Set(new.start),
        end: Set(new.end),
        build: Set(new.build),
        is_series: Set(new.is_series),
        series_id: Set(new.series_id),
        cc_version: Set(1),
        created_by: Set(new.created_by),
        modified_by: Set(new.created_by),
        created_at: Set(now),
        modified_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(model_to_run(model))
}

/// Apply edits when the stored `cc_version` still equals `expected_cc`,
/// bumping it. `None` when another save got there first.
pub async fn update<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    expected_cc: i32,
    changes: RunChanges,
) -> AppResult<Option<Run>> {
    let active = run::ActiveModel {
        productversion_id: Set(changes.productversion_id),
        name: Set(changes.name),
        description: Set(changes.description),
        start: Set(changes.start),
        end: Set(changes.end),
        build: Set(changes.build),
        is_series: Set(changes.is_series),
        modified_by: Set(changes.modified_by),
        ..Default::default()
    };
    write_if_current(db, id, expected_cc, active).await
}

/// Change the status of a run, bumping `cc_version`. `None` when the run
/// changed between the read and the write.
pub async fn set_status<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    status: ObjectStatus,
    modified_by: Option<Uuid>,
) -> AppResult<Option<Run>> {
    let current = find_model(db, id).await?;
    let active = run::ActiveModel {
        status: Set(status.as_str().to_string()),
        modified_by: Set(modified_by),
        ..Default::default()
    };
    write_if_current(db, id, current.cc_version, active).await
}

async fn write_if_current<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    expected_cc: i32,
    mut active: run::ActiveModel,
) -> AppResult<Option<Run>> {
    active.cc_version = Set(expected_cc + 1);
    active.modified_at = Set(Utc::now());
    let res = run::Entity::update_many()
        .set(active)
        .filter(run::Column::Id.eq(id))
        .filter(run::Column::CcVersion.eq(expected_cc))
        .exec(db)
        .await?;
    if res.rows_affected == 0 {
        return Ok(None);
    }
    get(db, id).await.map(Some)
}

async fn find_model<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<run::Model> {
    run::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Run".to_string()))
}

pub async fn find<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<Run>> {
    Ok(run::Entity::find_by_id(id).one(db).await?.map(model_to_run))
}

pub async fn get<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Run> {
    Ok(model_to_run(find_model(db, id).await?))
}

/// Run with its product, suites and environments.
pub async fn detail<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<RunDetail> {
    let run = get(db, id).await?;
    let product_id = product_id_for_version(db, run.productversion_id).await?;
    let suites = suite_ids(db, id).await?;
    let environments = environment_ids(db, id).await?;
    Ok(RunDetail {
        run,
        product_id,
        suites,
        environments,
    })
}

/// The run already cloned from `series_id` for `build`, if any.
pub async fn find_series_child<C: ConnectionTrait>(
    db: &C,
    series_id: Uuid,
    build: &str,
) -> AppResult<Option<Run>> {
    Ok(run::Entity::find()
        .filter(run::Column::SeriesId.eq(series_id))
        .filter(run::Column::Build.eq(build))
        .order_by_asc(run::Column::CreatedAt)
        .one(db)
        .await?
        .map(model_to_run))
}

pub async fn product_id_for_version<C: ConnectionTrait>(
    db: &C,
    productversion_id: Uuid,
) -> AppResult<Uuid> {
    product_version::Entity::find_by_id(productversion_id)
        .one(db)
        .await?
        .map(|pv| pv.product_id)
        .ok_or_else(|| AppError::NotFound("Product version".to_string()))
}

/// Runs, newest first, with the total count.
pub async fn list<C: ConnectionTrait>(
    db: &C,
    productversion_id: Option<Uuid>,
    status: Option<ObjectStatus>,
    offset: u64,
    limit: u64,
) -> AppResult<(Vec<Run>, u64)> {
    let mut query = run::Entity::find();
    if let Some(pv) = productversion_id {
        query = query.filter(run::Column::ProductversionId.eq(pv));
    }
    if let Some(s) = status {
        query = query.filter(run::Column::Status.eq(s.as_str()));
    }
    let total = query.clone().count(db).await?;
    let models = query
        .order_by_desc(run::Column::CreatedAt)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;
    Ok((models.into_iter().map(model_to_run).collect(), total))
}

/// Suite ids of a run, in run order.
pub async fn suite_ids<C: ConnectionTrait>(db: &C, run_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(run_suite::Entity::find()
        .filter(run_suite::Column::RunId.eq(run_id))
        .order_by_asc(run_suite::Column::Order)
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.suite_id)
        .collect())
}

/// Replace the run's suites, keeping the given order.
pub async fn replace_suites<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    suite_ids: &[Uuid],
) -> AppResult<()> {
    run_suite::Entity::delete_many()
        .filter(run_suite::Column::RunId.eq(run_id))
        .exec(db)
        .await?;

    for (index, suite_id) in suite_ids.iter().enumerate() {
        run_suite::ActiveModel {
            id: Set(Uuid::now_v7()),
            run_id: Set(run_id),
            suite_id: Set(*suite_id),
            order: Set(index as i32 + 1),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

pub async fn environment_ids<C: ConnectionTrait>(db: &C, run_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(run_environment::Entity::find()
        .filter(run_environment::Column::RunId.eq(run_id))
        .order_by_asc(run_environment::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.environment_id)
        .collect())
}

pub async fn set_environments<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    environment_ids: &[Uuid],
) -> AppResult<()> {
    run_environment::Entity::delete_many()
        .filter(run_environment::Column::RunId.eq(run_id))
        .exec(db)
        .await?;

    for env_id in environment_ids {
        run_environment::ActiveModel {
            id: Set(Uuid::now_v7()),
            run_id: Set(run_id),
            environment_id: Set(*env_id),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

/// Case versions locked into a run, in run order.
pub async fn case_versions<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
) -> AppResult<Vec<run_case_version::Model>> {
    Ok(run_case_version::Entity::find()
        .filter(run_case_version::Column::RunId.eq(run_id))
        .order_by_asc(run_case_version::Column::Order)
        .all(db)
        .await?)
}

pub async fn count_case_versions<C: ConnectionTrait>(db: &C, run_id: Uuid) -> AppResult<u64> {
    Ok(run_case_version::Entity::find()
        .filter(run_case_version::Column::RunId.eq(run_id))
        .count(db)
        .await?)
}

/// A page of a run's case versions.
pub async fn case_versions_page<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    offset: u64,
    limit: u64,
) -> AppResult<Vec<run_case_version::Model>> {
    Ok(run_case_version::Entity::find()
        .filter(run_case_version::Column::RunId.eq(run_id))
        .order_by_asc(run_case_version::Column::Order)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?)
}

pub async fn find_case_version<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> AppResult<Option<run_case_version::Model>> {
    Ok(run_case_version::Entity::find_by_id(id).one(db).await?)
}

/// Lock case versions into the run: for each suite in order, each case in
/// suite order, the active version for the run's product version. Cases
/// already locked keep their row.
pub async fn lock_case_versions<C: ConnectionTrait>(db: &C, run: &Run) -> AppResult<u64> {
    let existing: BTreeSet<Uuid> = case_versions(db, run.id)
        .await?
        .into_iter()
        .map(|m| m.caseversion_id)
        .collect();
    let mut next_order = existing.len() as i32;
    let mut seen = existing;
    let mut added = 0;

    for suite_id in suite_ids(db, run.id).await? {
        for case_id in crate::db::library::suite_case_ids(db, suite_id).await? {
            let Some(cv_id) =
                crate::db::library::active_case_version(db, case_id, run.productversion_id)
                    .await?
            else {
                continue;
            };
            if !seen.insert(cv_id) {
                continue;
            }
            next_order += 1;
            run_case_version::ActiveModel {
                id: Set(Uuid::now_v7()),
                run_id: Set(run.id),
                caseversion_id: Set(cv_id),
                order: Set(next_order),
            }
            .insert(db)
            .await?;
            added += 1;
        }
    }

    Ok(added)
}

fn model_to_run(m: run::Model) -> Run {
    Run {
        id: m.id,
        productversion_id: m.productversion_id,
        name: m.name,
        description: m.description,
        status: ObjectStatus::parse(&m.status).unwrap_or_default(),
        start: m.start,
        end: m.end,
        build: m.build,
        is_series: m.is_series,
        series_id: m.series_id,
        cc_version: m.cc_version,
        created_by: m.created_by,
        modified_by: m.modified_by,
        created_at: m.created_at,
        modified_at: m.modified_at,
    }
}
