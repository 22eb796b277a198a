//! Password hashing and one-time tokens (password reset, activation).

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

/// How long a password reset link stays valid.
pub const PASSWORD_RESET_TIMEOUT_DAYS: i64 = 3;

/// Hash a password with bcrypt off the async executor.
pub async fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Database(format!("Password hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

/// Check a password against a stored hash. An unusable password never matches.
pub async fn check_password(password: &str, hash: Option<&str>) -> bool {
    let Some(hash) = hash else {
        return false;
    };
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// Random URL-safe token for password reset links.
pub fn generate_reset_token() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Whether a reset token issued at `issued_at` is still usable.
pub fn reset_token_valid(issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now < issued_at + Duration::days(PASSWORD_RESET_TIMEOUT_DAYS)
}

/// Activation key: SHA-1 hex of a short random salt and the username.
pub fn generate_activation_key(username: &str) -> String {
    let salt_source: [u8; 16] = rand::rng().random();
    let salt = &hex::encode(Sha1::digest(salt_source))[..5];
    hex::encode(Sha1::digest(format!("{}{}", salt, username).as_bytes()))
}

/// Activation keys are exactly 40 lowercase hex characters.
pub fn is_activation_key(key: &str) -> bool {
    key.len() == 40 && key.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}
