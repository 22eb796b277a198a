//! Run management: listing, the add and edit forms, activation.

use actix_web::{HttpResponse, get, post, put, web};
use tracing::info;
use uuid::Uuid;

use crate::auth::Caller;
use crate::db::{DbPool, runs};
use crate::error::AppResult;
use crate::forms::runs::{AddRunForm, EditRunForm};
use crate::models::run::{Run, RunDetail, RunFilter, RunFormChoices, RunFormData};
use crate::models::user::perms;
use crate::models::{Pagination, PaginationParams};
use crate::services::runs as run_service;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Literal `/runs/form` must be registered before `/runs/{id}`.
    cfg.service(add_form_choices)
        .service(list_runs)
        .service(create_run)
        .service(get_run)
        .service(update_run)
        .service(edit_form_choices)
        .service(activate_run)
        .service(deactivate_run);
}

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct RunListResponse {
    pub runs: Vec<Run>,
    pub pagination: Pagination,
}

/// List runs, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/manage/runs",
    tag = "Runs",
    params(RunFilter),
    responses((status = 200, description = "Runs", body = RunListResponse)),
    security(("api_key" = []))
)]
#[get("/runs")]
pub async fn list_runs(
    _caller: Caller,
    query: web::Query<RunFilter>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    let paging = PaginationParams {
        page: query.page,
        limit: query.limit,
    };
    let limit = paging.clamped_limit();
    let (found, total) = runs::list(
        pool.connection(),
        query.productversion,
        query.status,
        paging.offset(),
        limit as u64,
    )
    .await?;

    Ok(HttpResponse::Ok().json(RunListResponse {
        runs: found,
        pagination: Pagination::new(paging.page(), limit, total),
    }))
}

/// Choices for the add-run form.
#[utoipa::path(
    get,
    path = "/api/v1/manage/runs/form",
    tag = "Runs",
    responses((status = 200, description = "Field choices", body = RunFormChoices)),
    security(("api_key" = []))
)]
#[get("/runs/form")]
pub async fn add_form_choices(caller: Caller, pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_RUNS)?;
    Ok(HttpResponse::Ok().json(AddRunForm::choices(pool.connection()).await?))
}

/// Create a draft run from the add form.
#[utoipa::path(
    post,
    path = "/api/v1/manage/runs",
    tag = "Runs",
    request_body = RunFormData,
    responses(
        (status = 201, description = "Run created", body = RunDetail),
        (status = 400, description = "Form errors"),
        (status = 403, description = "Permission denied")
    ),
    security(("api_key" = []))
)]
#[post("/runs")]
pub async fn create_run(
    caller: Caller,
    body: web::Json<RunFormData>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_RUNS)?;
    let detail = AddRunForm::new(body.into_inner(), caller.user_id())
        .save(pool.connection())
        .await?;

    info!("Created run {} ({})", detail.run.name, detail.run.id);
    Ok(HttpResponse::Created().json(detail))
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/runs/{id}",
    tag = "Runs",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run with suites and environments", body = RunDetail),
        (status = 404, description = "Run not found")
    ),
    security(("api_key" = []))
)]
#[get("/runs/{id}")]
pub async fn get_run(
    _caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(runs::detail(pool.connection(), path.into_inner()).await?))
}

/// Save the edit form. `cc_version` must match the stored run.
#[utoipa::path(
    put,
    path = "/api/v1/manage/runs/{id}",
    tag = "Runs",
    params(("id" = Uuid, Path, description = "Run ID")),
    request_body = RunFormData,
    responses(
        (status = 200, description = "Run saved", body = RunDetail),
        (status = 400, description = "Form errors, including concurrent edits"),
        (status = 404, description = "Run not found")
    ),
    security(("api_key" = []))
)]
#[put("/runs/{id}")]
pub async fn update_run(
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<RunFormData>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_RUNS)?;
    let instance = runs::get(pool.connection(), path.into_inner()).await?;
    let detail = EditRunForm::new(body.into_inner(), instance, caller.user_id())
        .save(pool.connection())
        .await?;

    info!(
        "Saved run {} (cc_version {})",
        detail.run.id, detail.run.cc_version
    );
    Ok(HttpResponse::Ok().json(detail))
}

/// Choices and read-only fields for the edit-run form.
#[utoipa::path(
    get,
    path = "/api/v1/manage/runs/{id}/form",
    tag = "Runs",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses((status = 200, description = "Field choices", body = RunFormChoices)),
    security(("api_key" = []))
)]
#[get("/runs/{id}/form")]
pub async fn edit_form_choices(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_RUNS)?;
    let instance = runs::get(pool.connection(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(EditRunForm::choices(pool.connection(), &instance).await?))
}

/// Activate a run, locking the case versions its suites hold right now.
#[utoipa::path(
    post,
    path = "/api/v1/manage/runs/{id}/activate",
    tag = "Runs",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run activated", body = RunDetail),
        (status = 404, description = "Run not found")
    ),
    security(("api_key" = []))
)]
#[post("/runs/{id}/activate")]
pub async fn activate_run(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_RUNS)?;
    let detail =
        run_service::activate(pool.connection(), path.into_inner(), caller.user_id()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/manage/runs/{id}/deactivate",
    tag = "Runs",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses((status = 200, description = "Run disabled", body = RunDetail)),
    security(("api_key" = []))
)]
#[post("/runs/{id}/deactivate")]
pub async fn deactivate_run(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_RUNS)?;
    let detail =
        run_service::deactivate(pool.connection(), path.into_inner(), caller.user_id()).await?;
    Ok(HttpResponse::Ok().json(detail))
}
