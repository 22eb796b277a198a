//! Test cases, case versions and suites.

use actix_web::{HttpResponse, get, post, web};
use sea_orm::TransactionTrait;
use tracing::info;
use uuid::Uuid;

use crate::auth::Caller;
use crate::db::{DbPool, library, products};
use crate::error::{AppError, AppResult};
use crate::models::library::{
    CaseVersion, CreateCaseRequest, CreateCaseVersionRequest, CreateSuiteRequest, Suite,
    SuiteFilter,
};
use crate::models::user::perms;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .service(create_case)
        .service(create_case_version)
        .service(get_case_version)
        .service(list_suites)
        .service(create_suite)
        .service(get_suite);
}

fn required_name(value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("Name is required".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Create a case and its first version, for the product of `productversion`.
#[utoipa::path(
    post,
    path = "/api/v1/manage/cases",
    tag = "Library",
    request_body = CreateCaseRequest,
    responses(
        (status = 201, description = "Case created", body = CaseVersion),
        (status = 404, description = "Product version not found")
    ),
    security(("api_key" = []))
)]
#[post("/cases")]
pub async fn create_case(
    caller: Caller,
    body: web::Json<CreateCaseRequest>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_CASES)?;
    let body = body.into_inner();
    let name = required_name(&body.name)?;

    let created = pool
        .connection()
        .transaction::<_, CaseVersion, AppError>(|txn| {
            Box::pin(async move {
                let version = products::find_version(txn, body.productversion)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Product version".to_string()))?;
                let case_id = library::create_case(txn, version.product_id).await?;
                library::create_case_version(
                    txn,
                    case_id,
                    version.id,
                    &name,
                    &body.description,
                    body.status,
                    &body.steps,
                )
                .await
            })
        })
        .await?;

    info!("Created case {} ({})", created.name, created.case_id);
    Ok(HttpResponse::Created().json(created))
}

/// Write a case for another version of its product.
#[utoipa::path(
    post,
    path = "/api/v1/manage/cases/{id}/versions",
    tag = "Library",
    params(("id" = Uuid, Path, description = "Case ID")),
    request_body = CreateCaseVersionRequest,
    responses(
        (status = 201, description = "Case version created", body = CaseVersion),
        (status = 400, description = "Version of another product, or already written")
    ),
    security(("api_key" = []))
)]
#[post("/cases/{id}/versions")]
pub async fn create_case_version(
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<CreateCaseVersionRequest>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_CASES)?;
    let case_id = path.into_inner();
    let body = body.into_inner();
    let name = required_name(&body.name)?;

    let created = pool
        .connection()
        .transaction::<_, CaseVersion, AppError>(|txn| {
            Box::pin(async move {
                library::create_case_version(
                    txn,
                    case_id,
                    body.productversion,
                    &name,
                    &body.description,
                    body.status,
                    &body.steps,
                )
                .await
            })
        })
        .await?;

    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/caseversions/{id}",
    tag = "Library",
    params(("id" = Uuid, Path, description = "Case version ID")),
    responses(
        (status = 200, description = "Case version with steps", body = CaseVersion),
        (status = 404, description = "Case version not found")
    ),
    security(("api_key" = []))
)]
#[get("/caseversions/{id}")]
pub async fn get_case_version(
    _caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let cv = library::find_case_version(pool.connection(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Case version".to_string()))?;
    Ok(HttpResponse::Ok().json(cv))
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/suites",
    tag = "Library",
    params(SuiteFilter),
    responses((status = 200, description = "Suites ordered by name", body = Vec<Suite>)),
    security(("api_key" = []))
)]
#[get("/suites")]
pub async fn list_suites(
    _caller: Caller,
    query: web::Query<SuiteFilter>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let suites = library::list_suites(pool.connection(), query.product).await?;
    Ok(HttpResponse::Ok().json(suites))
}

/// Create a suite of the product's cases, kept in the given order.
#[utoipa::path(
    post,
    path = "/api/v1/manage/suites",
    tag = "Library",
    request_body = CreateSuiteRequest,
    responses(
        (status = 201, description = "Suite created", body = Suite),
        (status = 400, description = "Case of another product")
    ),
    security(("api_key" = []))
)]
#[post("/suites")]
pub async fn create_suite(
    caller: Caller,
    body: web::Json<CreateSuiteRequest>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_SUITES)?;
    let body = body.into_inner();
    let name = required_name(&body.name)?;

    let suite = pool
        .connection()
        .transaction::<_, Suite, AppError>(|txn| {
            Box::pin(async move {
                library::create_suite(
                    txn,
                    body.product,
                    &name,
                    &body.description,
                    body.status,
                    &body.cases,
                )
                .await
            })
        })
        .await?;

    info!("Created suite {} with {} cases", suite.name, suite.cases.len());
    Ok(HttpResponse::Created().json(suite))
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/suites/{id}",
    tag = "Library",
    params(("id" = Uuid, Path, description = "Suite ID")),
    responses(
        (status = 200, description = "Suite", body = Suite),
        (status = 404, description = "Suite not found")
    ),
    security(("api_key" = []))
)]
#[get("/suites/{id}")]
pub async fn get_suite(
    _caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let suite = library::find_suite(pool.connection(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Suite".to_string()))?;
    Ok(HttpResponse::Ok().json(suite))
}
