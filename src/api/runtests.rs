//! Run-tests endpoints: what a tester sees and the result actions they take.

use actix_web::{HttpResponse, get, post, web};
use tracing::info;
use uuid::Uuid;

use crate::auth::{AuthUser, CurrentUser};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::PaginationParams;
use crate::models::execution::{ResultAction, ResultActionRequest, RunTestsItem, RunTestsPage};
use crate::models::run::{CloneSeriesRequest, RunDetail};
use crate::models::user::perms;
use crate::services::{execution, runs};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(run_tests)
        .service(run_test_item)
        .service(result_action)
        .service(clone_series);
}

fn tester(current: CurrentUser) -> AppResult<AuthUser> {
    let user = current.0;
    if !user.has_perm(perms::EXECUTE) {
        return Err(AppError::Forbidden(format!(
            "The '{}' permission is required",
            perms::EXECUTE
        )));
    }
    Ok(user)
}

/// Every case of a run with the tester's results in one environment.
#[utoipa::path(
    get,
    path = "/api/v1/runtests/runs/{run_id}/environments/{env_id}",
    tag = "Run Tests",
    params(
        ("run_id" = Uuid, Path, description = "Run ID"),
        ("env_id" = Uuid, Path, description = "Environment ID"),
        PaginationParams
    ),
    responses(
        (status = 200, description = "Cases with results and completion", body = RunTestsPage),
        (status = 400, description = "Run or environment no longer available"),
        (status = 404, description = "Run not found")
    ),
    security(("api_key" = []))
)]
#[get("/runs/{run_id}/environments/{env_id}")]
pub async fn run_tests(
    current: CurrentUser,
    path: web::Path<(Uuid, Uuid)>,
    query: web::Query<PaginationParams>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let user = tester(current)?;
    let (run_id, env_id) = path.into_inner();
    let page =
        execution::run_tests_page(pool.connection(), run_id, env_id, user.id(), &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/runtests/runs/{run_id}/environments/{env_id}/cases/{rcv_id}",
    tag = "Run Tests",
    params(
        ("run_id" = Uuid, Path, description = "Run ID"),
        ("env_id" = Uuid, Path, description = "Environment ID"),
        ("rcv_id" = Uuid, Path, description = "Run case version ID")
    ),
    responses(
        (status = 200, description = "One case", body = RunTestsItem),
        (status = 400, description = "Test no longer available")
    ),
    security(("api_key" = []))
)]
#[get("/runs/{run_id}/environments/{env_id}/cases/{rcv_id}")]
pub async fn run_test_item(
    current: CurrentUser,
    path: web::Path<(Uuid, Uuid, Uuid)>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let user = tester(current)?;
    let (run_id, env_id, rcv_id) = path.into_inner();
    let item =
        execution::run_tests_item(pool.connection(), run_id, env_id, rcv_id, user.id()).await?;
    Ok(HttpResponse::Ok().json(item))
}

/// Record a result: start, pass, fail, invalidate, block or skip.
///
/// `fail` and `block` take a comment, a step number and a bug URL;
/// `invalidate` and `skip` take a comment.
#[utoipa::path(
    post,
    path = "/api/v1/runtests/runs/{run_id}/environments/{env_id}/cases/{rcv_id}/{action}",
    tag = "Run Tests",
    params(
        ("run_id" = Uuid, Path, description = "Run ID"),
        ("env_id" = Uuid, Path, description = "Environment ID"),
        ("rcv_id" = Uuid, Path, description = "Run case version ID"),
        ("action" = ResultAction, Path, description = "Action to take")
    ),
    request_body(content = ResultActionRequest, description = "Optional details"),
    responses(
        (status = 200, description = "Refreshed case", body = RunTestsItem),
        (status = 400, description = "Unknown action, bad bug URL or test no longer available")
    ),
    security(("api_key" = []))
)]
#[post("/runs/{run_id}/environments/{env_id}/cases/{rcv_id}/{action}")]
pub async fn result_action(
    current: CurrentUser,
    path: web::Path<(Uuid, Uuid, Uuid, String)>,
    body: Option<web::Json<ResultActionRequest>>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let user = tester(current)?;
    let (run_id, env_id, rcv_id, action) = path.into_inner();
    let action = ResultAction::parse(&action)
        .ok_or_else(|| AppError::InvalidInput(format!("Unknown action '{}'", action)))?;
    let request = body.map(|b| b.into_inner()).unwrap_or_default();

    let item = execution::record_action(
        pool.connection(),
        run_id,
        env_id,
        rcv_id,
        user.id(),
        action,
        request,
    )
    .await?;

    info!(
        "User {} recorded {:?} on run case {} in environment {}",
        user.user.username, action, rcv_id, env_id
    );
    Ok(HttpResponse::Ok().json(item))
}

/// Clone a series run into an active run for one build.
#[utoipa::path(
    post,
    path = "/api/v1/runtests/runs/{run_id}/series",
    tag = "Run Tests",
    params(("run_id" = Uuid, Path, description = "Series run ID")),
    request_body = CloneSeriesRequest,
    responses(
        (status = 201, description = "Build run created and activated", body = RunDetail),
        (status = 200, description = "Build run already existed", body = RunDetail),
        (status = 400, description = "Not an active series, or no build given")
    ),
    security(("api_key" = []))
)]
#[post("/runs/{run_id}/series")]
pub async fn clone_series(
    current: CurrentUser,
    path: web::Path<Uuid>,
    body: web::Json<CloneSeriesRequest>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let user = tester(current)?;
    let (detail, created) =
        runs::clone_for_build(pool.connection(), path.into_inner(), &body.build, Some(user.id()))
            .await?;
    if created {
        Ok(HttpResponse::Created().json(detail))
    } else {
        Ok(HttpResponse::Ok().json(detail))
    }
}
