//! Session cookie carrying an HS256 JWT.

use actix_web::cookie::{Cookie, SameSite};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::user::SessionClaims;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "mt_session";

const SESSION_ISSUER: &str = "moztrap";

pub fn create_session_token(
    user_id: Uuid,
    username: &str,
    secret: &SecretString,
    ttl_secs: u64,
) -> AppResult<String> {
    let now = chrono::Utc::now();
    let exp = now + chrono::Duration::seconds(ttl_secs as i64);

    let claims = SessionClaims {
        sub: user_id.to_string(),
        iss: SESSION_ISSUER.to_string(),
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
        username: username.to_string(),
    };

    let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
    encode(&Header::default(), &claims, &key)
        .map_err(|e| AppError::InvalidInput(format!("Failed to create session token: {}", e)))
}

/// Verify a session JWT and return the user id it was issued for.
pub fn verify_session_token(token: &str, secret: &SecretString) -> Result<Uuid, String> {
    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[SESSION_ISSUER]);
    validation.validate_aud = false;

    let token_data = decode::<SessionClaims>(token, &key, &validation)
        .map_err(|e| format!("Invalid session token: {}", e))?;

    Uuid::parse_str(&token_data.claims.sub).map_err(|e| format!("Invalid session subject: {}", e))
}

/// Cookie that logs the user in.
pub fn login_cookie(
    config: &Config,
    user_id: Uuid,
    username: &str,
) -> AppResult<Cookie<'static>> {
    let token = create_session_token(
        user_id,
        username,
        &config.session.secret,
        config.session.ttl_secs,
    )?;

    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(config.environment.is_production());
    cookie.set_max_age(actix_web::cookie::time::Duration::seconds(
        config.session.ttl_secs as i64,
    ));
    Ok(cookie)
}

/// Cookie that clears the session.
pub fn logout_cookie(config: &Config) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(config.environment.is_production());
    cookie.make_removal();
    cookie
}
