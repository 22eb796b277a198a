//! API Key service for generation, verification, and management.
//!
//! A key authenticates as the user who owns it, with that user's
//! permissions.

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::{DbPool, api_keys as db, users};
use crate::error::{AppError, AppResult};
use crate::models::{ApiKey, User};

/// API key prefix.
const KEY_PREFIX: &str = "mt_";
/// Length of random part of the key.
const KEY_RANDOM_LENGTH: usize = 32;
/// Length of the key prefix stored for identification.
pub const KEY_PREFIX_LENGTH: usize = 8;

/// Generate a new random API key for `owner_id`.
///
/// Returns the full key (to be shown to user once) and the key data for storage.
pub fn generate_key(owner_id: Uuid, created_by: Option<Uuid>) -> (String, ApiKey) {
    let random_part: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(KEY_RANDOM_LENGTH)
        .map(char::from)
        .collect();

    let full_key = format!("{}{}", KEY_PREFIX, random_part);

    // Hash the key for storage
    let key_hash = hash_key(&full_key);

    // Extract prefix for identification (first 8 chars of full key)
    let key_prefix = full_key.chars().take(KEY_PREFIX_LENGTH).collect::<String>();

    let api_key = ApiKey {
        id: Uuid::now_v7(),
        owner_id,
        key_hash,
        key_prefix,
        active: true,
        created_by,
        last_used_at: None,
        created_at: Utc::now(),
        revoked_at: None,
    };

    (full_key, api_key)
}

/// Hash an API key using SHA-256.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key and return the key with the user it belongs to.
pub async fn verify_key(pool: &DbPool, key: &str) -> AppResult<(ApiKey, User)> {
    let key_hash = hash_key(key);
    let conn = pool.connection();

    // Look up by hash
    let api_key = db::find_by_hash(conn, &key_hash)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid API key".to_string()))?;

    if api_key.is_revoked() {
        return Err(AppError::Unauthorized(
            "API key has been revoked".to_string(),
        ));
    }

    let owner = users::find_by_id(conn, api_key.owner_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid API key".to_string()))?;

    if !owner.is_active {
        return Err(AppError::Unauthorized(
            "API key owner is inactive".to_string(),
        ));
    }

    // Update last used timestamp (fire and forget)
    if let Err(e) = db::update_last_used(conn, api_key.id).await {
        tracing::warn!("Failed to record API key use: {}", e);
    }

    Ok((api_key, owner))
}

/// Create a new API key for a user and store it in the database.
pub async fn create_key(
    pool: &DbPool,
    owner_id: Uuid,
    created_by: Option<Uuid>,
) -> AppResult<(String, ApiKey)> {
    let conn = pool.connection();
    users::get(conn, owner_id).await?;

    let (full_key, api_key) = generate_key(owner_id, created_by);
    db::insert_api_key(conn, &api_key).await?;

    tracing::info!(
        "Issued API key {} for user {}",
        api_key.key_prefix,
        owner_id
    );

    Ok((full_key, api_key))
}

/// List all API keys.
pub async fn list_keys(pool: &DbPool) -> AppResult<Vec<ApiKey>> {
    db::list_all(pool.connection()).await
}

/// List the keys owned by one user.
pub async fn list_keys_for(pool: &DbPool, owner_id: Uuid) -> AppResult<Vec<ApiKey>> {
    db::list_for_owner(pool.connection(), owner_id).await
}

/// Revoke an API key by ID.
pub async fn revoke_key(pool: &DbPool, id: Uuid) -> AppResult<bool> {
    db::revoke(pool.connection(), id).await
}

/// Get an API key by ID.
pub async fn get_key(pool: &DbPool, id: Uuid) -> AppResult<Option<ApiKey>> {
    db::find_by_id(pool.connection(), id).await
}
