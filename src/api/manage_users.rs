//! User, role, preference and API key administration.
//!
//! Everything here needs `core.manage_users`, except that users may issue
//! and list their own API keys. The bootstrap admin key passes every check.

use actix_web::{HttpResponse, delete, get, post, put, web};
use tracing::info;
use uuid::Uuid;

use crate::auth::Caller;
use crate::config::Config;
use crate::db::{DbPool, preferences, roles, users};
use crate::error::{AppError, AppResult};
use crate::forms::users::CreateUserForm;
use crate::models::user::{CorePreferences, CreateRoleRequest, CreateUserRequest, perms};
use crate::models::{
    ApiKeyCreateResponse, ApiKeyListItem, Pagination, PaginationParams, Role, UserResponse,
};
use crate::services::api_key;

/// Configure user management routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .service(list_users)
        .service(create_user)
        .service(get_user)
        .service(delete_user)
        .service(activate_user)
        .service(deactivate_user)
        .service(create_apikey)
        .service(list_apikeys)
        .service(revoke_apikey)
        .service(list_roles)
        .service(create_role)
        .service(get_preferences)
        .service(update_preferences);
}

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct UserDetailResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub roles: Vec<Role>,
}

/// Where the management UI shows a user.
pub fn user_manage_url(user_id: Uuid) -> String {
    format!("/manage/user/{}/", user_id)
}

/// Users may manage their own keys; anything else needs `core.manage_users`.
fn require_self_or_manager(caller: &Caller, user_id: Uuid) -> AppResult<()> {
    if caller.user_id() == Some(user_id) {
        return Ok(());
    }
    caller.require_perm(perms::MANAGE_USERS)
}

/// List users.
#[utoipa::path(
    get,
    path = "/api/v1/manage/users",
    tag = "Users",
    params(PaginationParams),
    responses(
        (status = 200, description = "Users ordered by username", body = UserListResponse),
        (status = 403, description = "Permission denied")
    ),
    security(("api_key" = []))
)]
#[get("/users")]
pub async fn list_users(
    caller: Caller,
    query: web::Query<PaginationParams>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    let limit = query.clamped_limit();
    let (found, total) =
        users::list(pool.connection(), query.offset(), limit as u64).await?;

    Ok(HttpResponse::Ok().json(UserListResponse {
        users: found.into_iter().map(UserResponse::from).collect(),
        pagination: Pagination::new(query.page(), limit, total),
    }))
}

/// Create an active user.
#[utoipa::path(
    post,
    path = "/api/v1/manage/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Form errors"),
        (status = 403, description = "Permission denied")
    ),
    security(("api_key" = []))
)]
#[post("/users")]
pub async fn create_user(
    caller: Caller,
    body: web::Json<CreateUserRequest>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    let user = CreateUserForm(body.into_inner())
        .save(pool.connection(), config.password_hash_cost)
        .await?;

    info!("Created user {} ({})", user.username, user.id);
    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// Get a user and their roles.
#[utoipa::path(
    get,
    path = "/api/v1/manage/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserDetailResponse),
        (status = 404, description = "User not found")
    ),
    security(("api_key" = []))
)]
#[get("/users/{id}")]
pub async fn get_user(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    let id = path.into_inner();
    let user = users::get(pool.connection(), id).await?;
    let user_roles = roles::roles_for_user(pool.connection(), id).await?;

    Ok(HttpResponse::Ok().json(UserDetailResponse {
        user: user.into(),
        roles: user_roles,
    }))
}

/// Delete a user who never recorded results.
#[utoipa::path(
    delete,
    path = "/api/v1/manage/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "User has results; deactivate instead"),
        (status = 404, description = "User not found")
    ),
    security(("api_key" = []))
)]
#[delete("/users/{id}")]
pub async fn delete_user(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    let id = path.into_inner();
    users::delete(pool.connection(), id).await?;

    info!("Deleted user {}", id);
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/manage/users/{id}/activate",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "User activated", body = UserResponse)),
    security(("api_key" = []))
)]
#[post("/users/{id}/activate")]
pub async fn activate_user(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    let user = users::set_active(pool.connection(), path.into_inner(), true).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[utoipa::path(
    post,
    path = "/api/v1/manage/users/{id}/deactivate",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "User deactivated", body = UserResponse)),
    security(("api_key" = []))
)]
#[post("/users/{id}/deactivate")]
pub async fn deactivate_user(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    let user = users::set_active(pool.connection(), path.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Issue an API key for a user.
///
/// The full key is only returned here; store it securely.
#[utoipa::path(
    post,
    path = "/api/v1/manage/users/{user_id}/apikeys",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User the key authenticates as")),
    responses(
        (status = 201, description = "API key created", body = ApiKeyCreateResponse),
        (status = 403, description = "Permission denied"),
        (status = 404, description = "User not found")
    ),
    security(("api_key" = []))
)]
#[post("/users/{user_id}/apikeys")]
pub async fn create_apikey(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let owner_id = path.into_inner();
    require_self_or_manager(&caller, owner_id)?;

    let (full_key, key) = api_key::create_key(&pool, owner_id, caller.user_id()).await?;

    Ok(HttpResponse::Created().json(ApiKeyCreateResponse {
        id: key.id,
        key: full_key,
        key_prefix: key.key_prefix,
        owner_id,
        created_at: key.created_at,
        redirect: user_manage_url(owner_id),
    }))
}

/// List a user's API keys (prefixes only).
#[utoipa::path(
    get,
    path = "/api/v1/manage/users/{user_id}/apikeys",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "Key owner")),
    responses((status = 200, description = "Keys", body = Vec<ApiKeyListItem>)),
    security(("api_key" = []))
)]
#[get("/users/{user_id}/apikeys")]
pub async fn list_apikeys(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let owner_id = path.into_inner();
    require_self_or_manager(&caller, owner_id)?;

    let keys = api_key::list_keys_for(&pool, owner_id).await?;
    let items: Vec<ApiKeyListItem> = keys.into_iter().map(ApiKeyListItem::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// Revoke an API key.
#[utoipa::path(
    delete,
    path = "/api/v1/manage/apikeys/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "API key ID")),
    responses(
        (status = 204, description = "Key revoked"),
        (status = 404, description = "Key not found")
    ),
    security(("api_key" = []))
)]
#[delete("/apikeys/{id}")]
pub async fn revoke_apikey(
    caller: Caller,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let key = api_key::get_key(&pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("API key".to_string()))?;
    require_self_or_manager(&caller, key.owner_id)?;

    api_key::revoke_key(&pool, id).await?;
    info!("Revoked API key {} ({})", key.key_prefix, id);
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/roles",
    tag = "Users",
    responses((status = 200, description = "Roles ordered by name", body = Vec<Role>)),
    security(("api_key" = []))
)]
#[get("/roles")]
pub async fn list_roles(caller: Caller, pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    Ok(HttpResponse::Ok().json(roles::list(pool.connection()).await?))
}

/// Create a role from known permission codenames.
#[utoipa::path(
    post,
    path = "/api/v1/manage/roles",
    tag = "Users",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Unknown permission or duplicate name")
    ),
    security(("api_key" = []))
)]
#[post("/roles")]
pub async fn create_role(
    caller: Caller,
    body: web::Json<CreateRoleRequest>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    let body = body.into_inner();

    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Role name is required".to_string()));
    }
    if let Some(unknown) = body.permissions.iter().find(|p| !perms::is_known(p)) {
        return Err(AppError::InvalidInput(format!(
            "Unknown permission '{}'",
            unknown
        )));
    }
    if roles::find_by_name(pool.connection(), name).await?.is_some() {
        return Err(AppError::InvalidInput(format!(
            "A role named '{}' already exists",
            name
        )));
    }

    let role = roles::create(pool.connection(), name, &body.permissions).await?;
    info!("Created role {} with {} permissions", role.name, role.permissions.len());
    Ok(HttpResponse::Created().json(role))
}

#[utoipa::path(
    get,
    path = "/api/v1/manage/preferences",
    tag = "Users",
    responses((status = 200, description = "Site preferences", body = CorePreferences)),
    security(("api_key" = []))
)]
#[get("/preferences")]
pub async fn get_preferences(caller: Caller, pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    Ok(HttpResponse::Ok().json(preferences::get(pool.connection()).await?))
}

/// Set the role new users are added to; `null` clears it.
#[utoipa::path(
    put,
    path = "/api/v1/manage/preferences",
    tag = "Users",
    request_body = CorePreferences,
    responses(
        (status = 200, description = "Preferences saved", body = CorePreferences),
        (status = 404, description = "Role not found")
    ),
    security(("api_key" = []))
)]
#[put("/preferences")]
pub async fn update_preferences(
    caller: Caller,
    body: web::Json<CorePreferences>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    caller.require_perm(perms::MANAGE_USERS)?;
    let role_id = body.into_inner().default_new_user_role;
    if let Some(id) = role_id {
        roles::find_by_id(pool.connection(), id)
            .await?
            .ok_or_else(|| AppError::NotFound("Role".to_string()))?;
    }

    let saved = preferences::set_default_new_user_role(pool.connection(), role_id).await?;
    Ok(HttpResponse::Ok().json(saved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_manage_url() {
        let id = Uuid::nil();
        assert_eq!(
            user_manage_url(id),
            "/manage/user/00000000-0000-0000-0000-000000000000/"
        );
    }
}
