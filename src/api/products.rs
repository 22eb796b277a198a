//! Products, product versions and environments.

use actix_web::{HttpResponse, get, post, web};
use sea_orm::TransactionTrait;
use tracing::info;
use uuid::Uuid;

use crate::auth::Caller;
use crate::db::{DbPool, products};
use crate::error::{AppError, AppResult};
use crate::models::product::{
    CreateEnvironmentRequest, CreateProductRequest, CreateProductVersionRequest, Environment,
    Product, ProductVersion,
};
use crate::models::user::perms;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .service(list_products)
        .service(create_product)
        .service(get_product)
        .service(list_versions)
        .service(create_version)
        .service(list_environments)
        .service(create_environment);
}

fn required_name(value: &str, what: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", what)));
    }
    Ok(trimmed.to_string())
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/products",
    tag = "Products",
    responses((status = 200, description = "Products ordered by name", body = Vec<Product>)),
    security(("api_key" = []))
)]
#[get("/products")]
pub async fn list_products(_caller: Caller, pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(products::list_products(pool.connection()).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/manage/products",
    tag = "Products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 403, description = "Permission denied")
    ),
    security(("api_key" = []))
)]
#[post("/products")]
pub async fn create_product(
    caller: Caller,
    body: web::Json<CreateProductRequest>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_PRODUCTS)?;
    let name = required_name(&body.name, "Product name")?;
    let product = products::create_product(pool.connection(), &name, &body.description).await?;

    info!("Created product {} ({})", product.name, product.id);
    Ok(HttpResponse::Created().json(product))
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/products/{id}",
    tag = "Products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product", body = Product),
        (status = 404, description = "Product not found")
    ),
    security(("api_key" = []))
)]
#[get("/products/{id}")]
pub async fn get_product(
    _caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let product = products::find_product(pool.connection(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/products/{id}/versions",
    tag = "Products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses((status = 200, description = "Versions in order", body = Vec<ProductVersion>)),
    security(("api_key" = []))
)]
#[get("/products/{id}/versions")]
pub async fn list_versions(
    _caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let versions = products::list_versions(pool.connection(), Some(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(versions))
}

/// Add a version to a product, with the environments it is tested in.
#[utoipa::path(
    post,
    path = "/api/v1/manage/products/{id}/versions",
    tag = "Products",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = CreateProductVersionRequest,
    responses(
        (status = 201, description = "Version created", body = ProductVersion),
        (status = 404, description = "Product or environment not found")
    ),
    security(("api_key" = []))
)]
#[post("/products/{id}/versions")]
pub async fn create_version(
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<CreateProductVersionRequest>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_PRODUCTS)?;
    let product_id = path.into_inner();
    let body = body.into_inner();
    let version = required_name(&body.version, "Version")?;

    let created = pool
        .connection()
        .transaction::<_, ProductVersion, AppError>(|txn| {
            Box::pin(async move {
                products::create_version(
                    txn,
                    product_id,
                    &version,
                    body.codename.trim(),
                    &body.environments,
                )
                .await
            })
        })
        .await?;

    info!("Created version {} of product {}", created.version, product_id);
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/environments",
    tag = "Products",
    responses((status = 200, description = "Environments ordered by name", body = Vec<Environment>)),
    security(("api_key" = []))
)]
#[get("/environments")]
pub async fn list_environments(
    _caller: Caller,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(products::list_environments(pool.connection()).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/manage/environments",
    tag = "Products",
    request_body = CreateEnvironmentRequest,
    responses((status = 201, description = "Environment created", body = Environment)),
    security(("api_key" = []))
)]
#[post("/environments")]
pub async fn create_environment(
    caller: Caller,
    body: web::Json<CreateEnvironmentRequest>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_ENVIRONMENTS)?;
    let name = required_name(&body.name, "Environment name")?;
    let environment = products::create_environment(pool.connection(), &name).await?;
    Ok(HttpResponse::Created().json(environment))
}
