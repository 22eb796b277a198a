//! Database operations for results and step results.

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::{result, step_result};
use crate::error::AppResult;
use crate::models::{ResultStatus, StepResultStatus};

/// Fields for a new result row.
#[derive(Debug, Clone)]
pub struct NewResult {
    pub tester_id: Uuid,
    pub runcaseversion_id: Uuid,
    pub environment_id: Uuid,
    pub status: ResultStatus,
    pub comment: String,
    pub user_id: Uuid,
}

/// Latest results for a tester/case/environment, most recently modified
/// first. More than one row means the latest flag needs repair.
pub async fn latest_for<C: ConnectionTrait>(
    db: &C,
    runcaseversion_id: Uuid,
    tester_id: Uuid,
    environment_id: Uuid,
) -> AppResult<Vec<result::Model>> {
    Ok(result::Entity::find()
        .filter(result::Column::RuncaseversionId.eq(runcaseversion_id))
        .filter(result::Column::TesterId.eq(tester_id))
        .filter(result::Column::EnvironmentId.eq(environment_id))
        .filter(result::Column::IsLatest.eq(true))
        .order_by_desc(result::Column::ModifiedAt)
        .order_by_desc(result::Column::Id)
        .all(db)
        .await?)
}

/// Clear the latest flag on every other row of the result's triple.
pub async fn set_latest<C: ConnectionTrait>(db: &C, keep: &result::Model) -> AppResult<u64> {
    let res = result::Entity::update_many()
        .col_expr(result::Column::IsLatest, sea_orm::sea_query::Expr::value(false))
        .filter(result::Column::RuncaseversionId.eq(keep.runcaseversion_id))
        .filter(result::Column::TesterId.eq(keep.tester_id))
        .filter(result::Column::EnvironmentId.eq(keep.environment_id))
        .filter(result::Column::Id.ne(keep.id))
        .filter(result::Column::IsLatest.eq(true))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

/// Insert a result as the new latest one and demote the previous ones.
pub async fn insert_latest<C: ConnectionTrait>(db: &C, new: NewResult) -> AppResult<result::Model> {
    let now = Utc::now();
    let model = result::ActiveModel {
        id: Set(Uuid::now_v7()),
        tester_id: Set(new.tester_id),
        runcaseversion_id: Set(new.runcaseversion_id),
        environment_id: Set(new.environment_id),
        status: Set(new.status.as_str().to_string()),
        comment: Set(new.comment),
        is_latest: Set(true),
        created_by: Set(Some(new.user_id)),
        modified_by: Set(Some(new.user_id)),
        created_at: Set(now),
        modified_at: Set(now),
    }
    .insert(db)
    .await?;

    set_latest(db, &model).await?;
    Ok(model)
}

/// Most recently modified latest result on the case/environment from any
/// tester but `exclude_tester`, limited to the given statuses.
pub async fn other_latest<C: ConnectionTrait>(
    db: &C,
    runcaseversion_id: Uuid,
    environment_id: Uuid,
    exclude_tester: Uuid,
    statuses: &[ResultStatus],
) -> AppResult<Option<result::Model>> {
    Ok(result::Entity::find()
        .filter(result::Column::RuncaseversionId.eq(runcaseversion_id))
        .filter(result::Column::EnvironmentId.eq(environment_id))
        .filter(result::Column::IsLatest.eq(true))
        .filter(result::Column::Status.is_in(statuses.iter().map(|s| s.as_str())))
        .filter(result::Column::TesterId.ne(exclude_tester))
        .order_by_desc(result::Column::ModifiedAt)
        .order_by_desc(result::Column::Id)
        .one(db)
        .await?)
}

/// Every latest result in an environment for the given case versions.
pub async fn latest_in_environment<C: ConnectionTrait>(
    db: &C,
    runcaseversion_ids: Vec<Uuid>,
    environment_id: Uuid,
) -> AppResult<Vec<result::Model>> {
    if runcaseversion_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(result::Entity::find()
        .filter(result::Column::RuncaseversionId.is_in(runcaseversion_ids))
        .filter(result::Column::EnvironmentId.eq(environment_id))
        .filter(result::Column::IsLatest.eq(true))
        .all(db)
        .await?)
}

pub async fn find_step_result<C: ConnectionTrait>(
    db: &C,
    result_id: Uuid,
    step_id: Uuid,
) -> AppResult<Option<step_result::Model>> {
    Ok(step_result::Entity::find()
        .filter(step_result::Column::ResultId.eq(result_id))
        .filter(step_result::Column::StepId.eq(step_id))
        .one(db)
        .await?)
}

pub async fn insert_step_result<C: ConnectionTrait>(
    db: &C,
    result_id: Uuid,
    step_id: Uuid,
    status: StepResultStatus,
    bug_url: &str,
) -> AppResult<step_result::Model> {
    Ok(step_result::ActiveModel {
        id: Set(Uuid::now_v7()),
        result_id: Set(result_id),
        step_id: Set(step_id),
        status: Set(status.as_str().to_string()),
        bug_url: Set(bug_url.to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?)
}

/// Insert a result row exactly as given, flags and timestamps included.
pub async fn insert_raw<C: ConnectionTrait>(
    db: &C,
    model: result::Model,
) -> AppResult<result::Model> {
    let active = result::ActiveModel::from(model).reset_all();
    Ok(active.insert(db).await?)
}
