//! Account endpoints: login and logout, password change and reset,
//! registration and activation, federated sign-in and usernames.

use actix_web::{HttpResponse, get, post, web};
use chrono::Utc;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::backends::{BrowserIdBackend, OpenIdBackend};
use crate::auth::password::{
    PASSWORD_RESET_TIMEOUT_DAYS, generate_reset_token, hash_token, is_activation_key,
};
use crate::auth::session::{login_cookie, logout_cookie};
use crate::auth::throttle::LoginThrottle;
use crate::auth::{CurrentUser, MaybeUser};
use crate::config::Config;
use crate::db::{DbPool, registration, users};
use crate::error::{AppError, AppResult};
use crate::forms::users::{
    ChangePasswordData, ChangePasswordForm, LoginData, LoginForm, PasswordResetData,
    PasswordResetForm, RegistrationData, RegistrationForm, SetPasswordData, SetPasswordForm,
    SetUsernameData, SetUsernameForm,
};
use crate::models::{ActionResponse, User, UserResponse, safe_next};
use crate::services::mailer::password_reset_body;
use crate::services::{BrowserIdHandle, MailerHandle, OpenIdHandle};

pub const PASSWORD_CHANGED: &str = "Password changed.";
pub const RESET_EMAIL_SENT: &str = "Password reset email sent; check your email.\
If you don't receive an email, verify that you are entering the email address you signed up with, and try again.";
pub const CHECK_EMAIL: &str = "Check your email for an account activation link.";
pub const ACCOUNT_ACTIVATED: &str = "Account activated; now you can login.";
pub const ACTIVATION_FAILED: &str = "This account activation key is invalid or has expired.";
pub const BROWSERID_FAILED: &str =
    "Unable to sign in with that email address; have you registered an account?";
pub const TOO_MANY_ATTEMPTS: &str = "Too many login attempts; wait a minute and try again.";

/// Configure account routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .service(login_info)
        .service(login)
        .service(logout)
        .service(password_change)
        .service(password_reset)
        .service(password_reset_confirm)
        .service(register)
        .service(activate)
        .service(set_username)
        .service(browserid_verify)
        .service(openid_complete)
        .service(me);
}

/// Which login form the site offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoginFlavour {
    Password,
    Browserid,
}

impl LoginFlavour {
    fn from_config(config: &Config) -> Self {
        if config.browserid.enabled {
            Self::Browserid
        } else {
            Self::Password
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginInfo {
    pub flavour: LoginFlavour,
    pub openid: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub action: ActionResponse,
    pub flavour: LoginFlavour,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BrowserIdVerifyRequest {
    pub assertion: String,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OpenIdCompleteRequest {
    /// Id token returned by the provider
    pub id_token: String,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct NextParam {
    pub next: Option<String>,
}

/// Log a user in: cookie, last-login stamp and the redirect.
async fn complete_login(
    pool: &DbPool,
    config: &Config,
    user: User,
    next: Option<&str>,
) -> AppResult<HttpResponse> {
    users::touch_last_login(pool.connection(), user.id).await?;
    let cookie = login_cookie(config, user.id, &user.username)?;
    info!("User {} logged in", user.username);

    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        action: ActionResponse::redirect(safe_next(next)),
        flavour: LoginFlavour::from_config(config),
        user: user.into(),
    }))
}

/// Login page details.
#[utoipa::path(
    get,
    path = "/api/v1/users/login",
    tag = "Accounts",
    responses((status = 200, description = "Login flavour", body = LoginInfo))
)]
#[get("/login")]
pub async fn login_info(config: web::Data<Config>) -> HttpResponse {
    HttpResponse::Ok().json(LoginInfo {
        flavour: LoginFlavour::from_config(&config),
        openid: config.openid.enabled,
    })
}

/// Log in with username (or email) and password.
///
/// Attempts are limited per submitted username.
#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    tag = "Accounts",
    request_body = LoginData,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = LoginResponse),
        (status = 400, description = "Invalid credentials or inactive account"),
        (status = 429, description = "Too many attempts")
    )
)]
#[post("/login")]
pub async fn login(
    body: web::Json<LoginData>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    throttle: web::Data<LoginThrottle>,
) -> AppResult<HttpResponse> {
    let data = body.into_inner();
    let attempted = data.username.as_deref().unwrap_or("").trim().to_string();
    if !throttle.check(&attempted) {
        warn!("Login throttled for username '{}'", attempted);
        return Err(AppError::RateLimited(TOO_MANY_ATTEMPTS.to_string()));
    }

    let next = data.next.clone();
    let user = LoginForm(data).authenticate(pool.connection()).await?;
    complete_login(&pool, &config, user, next.as_deref()).await
}

/// Log out and go back to the login page.
#[utoipa::path(
    post,
    path = "/api/v1/users/logout",
    tag = "Accounts",
    responses((status = 200, description = "Session cleared", body = ActionResponse))
)]
#[post("/logout")]
pub async fn logout(config: web::Data<Config>) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(logout_cookie(&config))
        .json(ActionResponse::redirect(config.login_url.clone()))
}

/// Change the signed-in user's password.
#[utoipa::path(
    post,
    path = "/api/v1/users/password/change",
    tag = "Accounts",
    request_body = ChangePasswordData,
    responses(
        (status = 200, description = "Password changed", body = ActionResponse),
        (status = 400, description = "Form errors"),
        (status = 401, description = "Login required")
    )
)]
#[post("/password/change")]
pub async fn password_change(
    current: CurrentUser,
    body: web::Json<ChangePasswordData>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let user = current.0.user;
    ChangePasswordForm {
        data: body.into_inner(),
        user: &user,
    }
    .save(pool.connection(), config.password_hash_cost)
    .await?;

    info!("User {} changed their password", user.username);
    Ok(HttpResponse::Ok().json(ActionResponse::redirect("/").success(PASSWORD_CHANGED)))
}

/// Mail a password reset link.
#[utoipa::path(
    post,
    path = "/api/v1/users/password/reset",
    tag = "Accounts",
    request_body = PasswordResetData,
    responses(
        (status = 200, description = "Reset mail sent", body = ActionResponse),
        (status = 400, description = "Unknown email")
    )
)]
#[post("/password/reset")]
pub async fn password_reset(
    body: web::Json<PasswordResetData>,
    pool: web::Data<DbPool>,
    mailer: web::Data<MailerHandle>,
) -> AppResult<HttpResponse> {
    let matching = PasswordResetForm(body.into_inner())
        .clean(pool.connection())
        .await?;

    for user in matching {
        let token = generate_reset_token();
        users::set_password_reset(pool.connection(), user.id, hash_token(&token), Utc::now())
            .await?;
        mailer
            .0
            .send(
                &user.email,
                "Password reset on MozTrap",
                &password_reset_body(&user.username, &user.id.to_string(), &token),
            )
            .await?;
        info!("Password reset mailed for user {}", user.id);
    }

    Ok(HttpResponse::Ok().json(ActionResponse::redirect("/").success(RESET_EMAIL_SENT)))
}

/// Set a new password from a reset link.
#[utoipa::path(
    post,
    path = "/api/v1/users/password/reset/{user_id}/{token}",
    tag = "Accounts",
    params(
        ("user_id" = String, Path, description = "User UUID"),
        ("token" = String, Path, description = "Reset token from the mail")
    ),
    request_body = SetPasswordData,
    responses(
        (status = 200, description = "Password changed", body = ActionResponse),
        (status = 400, description = "Invalid link or form errors")
    )
)]
#[post("/password/reset/{user_id}/{token}")]
pub async fn password_reset_confirm(
    path: web::Path<(String, String)>,
    body: web::Json<SetPasswordData>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let (user_id, token) = path.into_inner();
    let user_id = uuid::Uuid::parse_str(&user_id).map_err(|_| {
        AppError::Validation(crate::forms::FormErrors::non_field(
            crate::forms::users::INVALID_RESET_LINK,
        ))
    })?;

    let user = SetPasswordForm(body.into_inner())
        .save(pool.connection(), user_id, &token, config.password_hash_cost)
        .await?;

    info!(
        "User {} reset their password (links valid {} days)",
        user.username, PASSWORD_RESET_TIMEOUT_DAYS
    );
    Ok(HttpResponse::Ok().json(ActionResponse::redirect("/").success(PASSWORD_CHANGED)))
}

/// Register a new, inactive account and mail its activation key.
#[utoipa::path(
    post,
    path = "/api/v1/users/register",
    tag = "Accounts",
    request_body = RegistrationData,
    responses(
        (status = 201, description = "Account created", body = ActionResponse),
        (status = 400, description = "Form errors")
    )
)]
#[post("/register")]
pub async fn register(
    body: web::Json<RegistrationData>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    mailer: web::Data<MailerHandle>,
) -> AppResult<HttpResponse> {
    let user = RegistrationForm(body.into_inner())
        .save(
            pool.connection(),
            config.password_hash_cost,
            &mailer,
            config.account_activation_days,
        )
        .await?;

    info!("Registered user {} ({})", user.username, user.id);
    Ok(HttpResponse::Created().json(ActionResponse::redirect("/").success(CHECK_EMAIL)))
}

/// Activate an account with the key from the registration mail.
#[utoipa::path(
    get,
    path = "/api/v1/users/activate/{activation_key}",
    tag = "Accounts",
    params(("activation_key" = String, Path, description = "Key from the activation mail")),
    responses(
        (status = 200, description = "Account activated", body = ActionResponse),
        (status = 400, description = "Invalid or expired key")
    )
)]
#[get("/activate/{activation_key}")]
pub async fn activate(
    path: web::Path<String>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let key = path.into_inner();
    let failed = || AppError::InvalidInput(ACTIVATION_FAILED.to_string());

    if !is_activation_key(&key) {
        return Err(failed());
    }
    let profile = registration::find_by_key(pool.connection(), &key)
        .await?
        .ok_or_else(failed)?;
    let user = users::get(pool.connection(), profile.user_id).await?;

    let expires = user.date_joined + chrono::Duration::days(config.account_activation_days);
    if Utc::now() >= expires {
        return Err(failed());
    }

    pool.connection()
        .transaction::<_, (), AppError>(|txn| {
            Box::pin(async move {
                users::set_active(txn, profile.user_id, true).await?;
                registration::mark_activated(txn, profile).await
            })
        })
        .await?;

    info!("Activated user {}", user.username);
    Ok(HttpResponse::Ok().json(ActionResponse::redirect("/").success(ACCOUNT_ACTIVATED)))
}

/// Pick a username, typically replacing a generated one.
#[utoipa::path(
    post,
    path = "/api/v1/users/set_username",
    tag = "Accounts",
    request_body = SetUsernameData,
    responses(
        (status = 200, description = "Username set", body = ActionResponse),
        (status = 400, description = "Form errors"),
        (status = 401, description = "Login required")
    )
)]
#[post("/set_username")]
pub async fn set_username(
    current: CurrentUser,
    body: web::Json<SetUsernameData>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let data = body.into_inner();
    let next = safe_next(data.next.as_deref());
    let user = current.0.user;
    let updated = SetUsernameForm { data, user: &user }
        .save(pool.connection())
        .await?;

    info!("User {} is now {}", user.username, updated.username);
    Ok(HttpResponse::Ok().json(ActionResponse::redirect(next)))
}

/// Sign in with a BrowserID assertion.
///
/// An email shared by several accounts cannot sign in. An unknown email
/// gets a new account when the site allows it.
#[utoipa::path(
    post,
    path = "/api/v1/users/browserid/verify",
    tag = "Accounts",
    request_body = BrowserIdVerifyRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Sign-in failed", body = ActionResponse)
    )
)]
#[post("/browserid/verify")]
pub async fn browserid_verify(
    body: web::Json<BrowserIdVerifyRequest>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    verifier: web::Data<BrowserIdHandle>,
) -> AppResult<HttpResponse> {
    if !config.browserid.enabled {
        return Err(AppError::NotFound("BrowserID login".to_string()));
    }
    let body = body.into_inner();
    let next = safe_next(body.next.as_deref());

    let email = verifier
        .0
        .verify(&body.assertion, &config.browserid.audience)
        .await?;

    let user = match email {
        Some(email) => {
            let mut found = BrowserIdBackend::filter_users_by_email(pool.connection(), &email)
                .await?;
            match found.len() {
                1 => found.pop(),
                0 if config.browserid.create_user => {
                    Some(BrowserIdBackend::create_user(pool.connection(), &email).await?)
                }
                0 => None,
                n => {
                    warn!("{} users share a BrowserID email; refusing to pick one", n);
                    None
                }
            }
        }
        None => None,
    };

    match user.filter(|u| u.is_active) {
        Some(user) => complete_login(&pool, &config, user, Some(&next)).await,
        None => Ok(HttpResponse::Unauthorized().json(
            ActionResponse::redirect(format!("{}?next={}", config.login_url, next))
                .error(BROWSERID_FAILED),
        )),
    }
}

/// Complete an OpenID Connect sign-in with the provider's id token.
#[utoipa::path(
    post,
    path = "/api/v1/users/openid/complete",
    tag = "Accounts",
    request_body = OpenIdCompleteRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Token rejected or required attributes missing")
    )
)]
#[post("/openid/complete")]
pub async fn openid_complete(
    body: web::Json<OpenIdCompleteRequest>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    verifier: web::Data<OpenIdHandle>,
) -> AppResult<HttpResponse> {
    if !config.openid.enabled {
        return Err(AppError::NotFound("OpenID login".to_string()));
    }
    let body = body.into_inner();
    let response = verifier.0.verify(&body.id_token).await?;

    let backend = OpenIdBackend {
        required_fields: config.openid.required_fields.clone(),
        strict_usernames: config.openid.strict_usernames,
    };
    let user = backend.authenticate(pool.connection(), &response).await?;
    if !user.is_active {
        return Err(AppError::Unauthorized(
            crate::forms::users::INACTIVE_ACCOUNT.to_string(),
        ));
    }

    complete_login(&pool, &config, user, body.next.as_deref()).await
}

/// The signed-in user, or null.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "Accounts",
    responses((status = 200, description = "Current user or null", body = Option<UserResponse>))
)]
#[get("/me")]
pub async fn me(current: MaybeUser) -> HttpResponse {
    let user: Option<UserResponse> = current.0.map(|u| u.user.into());
    HttpResponse::Ok().json(user)
}
