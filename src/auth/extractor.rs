//! Actix-web extractors for session, API key and admin key authentication.
//!
//! # Security
//! - Secret header values (API keys, admin keys) are wrapped in `SecretString`
//! - Secret values are never logged or exposed in debug output
//! - Constant-time comparison is used for the admin key

use std::collections::BTreeSet;

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest, web};
use futures_util::future::LocalBoxFuture;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use super::AdminKey;
use super::session::{SESSION_COOKIE, verify_session_token};
use crate::config::{ADMIN_KEY_HEADER, API_KEY_HEADER, Config};
use crate::db::{DbPool, roles, users};
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::models::user::perms;
use crate::services::api_key;

/// Extract a secret header value, wrapping it in SecretString.
/// Returns None if the header is missing or invalid UTF-8.
fn extract_secret_header(req: &HttpRequest, header_name: &str) -> Option<SecretString> {
    req.headers()
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(|s| SecretString::from(s.to_string()))
}

/// How a user proved who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Session,
    ApiKey,
}

/// A signed-in user and the permissions granted through their roles.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub permissions: BTreeSet<String>,
    pub method: AuthMethod,
}

impl AuthUser {
    /// Superusers hold every permission.
    pub fn has_perm(&self, codename: &str) -> bool {
        self.user.is_superuser || self.permissions.contains(codename)
    }

    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

/// Anyone allowed past authentication: the bootstrap admin or a user.
#[derive(Debug, Clone)]
pub enum Caller {
    /// Authenticated with `X-Admin-Key`; passes every permission check
    Admin,
    User(AuthUser),
}

impl Caller {
    pub fn require_perm(&self, codename: &str) -> AppResult<()> {
        match self {
            Caller::Admin => Ok(()),
            Caller::User(u) if u.has_perm(codename) => Ok(()),
            Caller::User(_) => Err(AppError::Forbidden(format!(
                "The '{}' permission is required",
                codename
            ))),
        }
    }

    /// The acting user, if the caller is not the bootstrap admin.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Caller::Admin => None,
            Caller::User(u) => Some(u.id()),
        }
    }

    /// Permission codenames held by the caller.
    pub fn permissions(&self) -> Vec<String> {
        match self {
            Caller::Admin => perms::ALL.iter().map(|p| p.to_string()).collect(),
            Caller::User(u) if u.user.is_superuser => {
                perms::ALL.iter().map(|p| p.to_string()).collect()
            }
            Caller::User(u) => u.permissions.iter().cloned().collect(),
        }
    }
}

/// Resolve the caller of a request.
///
/// An admin key or API key that is present but wrong is an error; a stale
/// or tampered session cookie is treated as anonymous.
async fn authenticate(req: &HttpRequest) -> AppResult<Option<Caller>> {
    let pool = req
        .app_data::<web::Data<DbPool>>()
        .ok_or_else(|| AppError::Database("Internal configuration error".to_string()))?;
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::Database("Internal configuration error".to_string()))?;

    if let Some(provided) = extract_secret_header(req, ADMIN_KEY_HEADER) {
        let valid = req
            .app_data::<web::Data<AdminKey>>()
            .map(|key| key.verify(provided.expose_secret()))
            .unwrap_or(false);
        if valid {
            return Ok(Some(Caller::Admin));
        }
        return Err(AppError::Unauthorized("Invalid admin key".to_string()));
    }

    if let Some(provided) = extract_secret_header(req, API_KEY_HEADER) {
        let (_, owner) = api_key::verify_key(pool.get_ref(), provided.expose_secret()).await?;
        let auth = with_permissions(pool.get_ref(), owner, AuthMethod::ApiKey).await?;
        return Ok(Some(Caller::User(auth)));
    }

    let Some(cookie) = req.cookie(SESSION_COOKIE) else {
        return Ok(None);
    };
    let user_id = match verify_session_token(cookie.value(), &config.session.secret) {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!("Ignoring session cookie: {}", e);
            return Ok(None);
        }
    };

    match users::find_by_id(pool.connection(), user_id).await? {
        Some(user) if user.is_active => {
            let auth = with_permissions(pool.get_ref(), user, AuthMethod::Session).await?;
            Ok(Some(Caller::User(auth)))
        }
        _ => Ok(None),
    }
}

async fn with_permissions(pool: &DbPool, user: User, method: AuthMethod) -> AppResult<AuthUser> {
    let permissions = roles::permissions_for_user(pool.connection(), user.id).await?;
    Ok(AuthUser {
        user,
        permissions,
        method,
    })
}

impl FromRequest for Caller {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            authenticate(&req).await?.ok_or_else(|| {
                AppError::Unauthorized(
                    "Login required. Sign in, or provide X-API-Key header.".to_string(),
                )
            })
        })
    }
}

/// Extractor that requires a signed-in user; the admin key is not enough.
pub struct CurrentUser(pub AuthUser);

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            match authenticate(&req).await? {
                Some(Caller::User(u)) => Ok(CurrentUser(u)),
                Some(Caller::Admin) => Err(AppError::Forbidden(
                    "This action needs a user account, not the admin key".to_string(),
                )),
                None => Err(AppError::Unauthorized("Login required".to_string())),
            }
        })
    }
}

/// Extractor for views open to anonymous visitors.
pub struct MaybeUser(pub Option<AuthUser>);

impl FromRequest for MaybeUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            match authenticate(&req).await {
                Ok(Some(Caller::User(u))) => Ok(MaybeUser(Some(u))),
                Ok(_) => Ok(MaybeUser(None)),
                Err(AppError::Unauthorized(_)) => Ok(MaybeUser(None)),
                Err(e) => Err(e),
            }
        })
    }
}
