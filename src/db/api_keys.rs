//! Database operations for API keys using SeaORM.

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::api_key;
use crate::error::AppResult;
use crate::models::ApiKey;

/// Insert a new API key.
pub async fn insert_api_key<C: ConnectionTrait>(db: &C, key: &ApiKey) -> AppResult<()> {
    let model = api_key::ActiveModel {
        id: Set(key.id),
        owner_id: Set(key.owner_id),
        key_hash: Set(key.key_hash.clone()),
        key_prefix: Set(key.key_prefix.clone()),
        active: Set(key.active),
        created_by: Set(key.created_by),
        last_used_at: Set(key.last_used_at),
        created_at: Set(key.created_at),
        revoked_at: Set(key.revoked_at),
    };

    api_key::Entity::insert(model).exec(db).await?;

    Ok(())
}

/// Find an API key by its hash.
pub async fn find_by_hash<C: ConnectionTrait>(db: &C, key_hash: &str) -> AppResult<Option<ApiKey>> {
    let result = api_key::Entity::find()
        .filter(api_key::Column::KeyHash.eq(key_hash))
        .one(db)
        .await?;

    Ok(result.map(model_to_api_key))
}

/// Find an API key by ID.
pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<ApiKey>> {
    let result = api_key::Entity::find_by_id(id).one(db).await?;
    Ok(result.map(model_to_api_key))
}

/// Update last used timestamp.
pub async fn update_last_used<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<()> {
    api_key::Entity::update_many()
        .col_expr(
            api_key::Column::LastUsedAt,
            sea_orm::sea_query::Expr::value(Some(Utc::now())),
        )
        .filter(api_key::Column::Id.eq(id))
        .exec(db)
        .await?;

    Ok(())
}

/// Keys owned by a user, newest first (including revoked).
pub async fn list_for_owner<C: ConnectionTrait>(db: &C, owner_id: Uuid) -> AppResult<Vec<ApiKey>> {
    let results = api_key::Entity::find()
        .filter(api_key::Column::OwnerId.eq(owner_id))
        .order_by_desc(api_key::Column::CreatedAt)
        .all(db)
        .await?;

    Ok(results.into_iter().map(model_to_api_key).collect())
}

/// List all API keys (including revoked).
pub async fn list_all<C: ConnectionTrait>(db: &C) -> AppResult<Vec<ApiKey>> {
    let results = api_key::Entity::find()
        .order_by_desc(api_key::Column::CreatedAt)
        .all(db)
        .await?;

    Ok(results.into_iter().map(model_to_api_key).collect())
}

/// Revoke an API key. Returns false when unknown or already revoked.
pub async fn revoke<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<bool> {
    let model = api_key::Entity::find_by_id(id).one(db).await?;

    match model {
        Some(m) if m.active => {
            let mut active: api_key::ActiveModel = m.into();
            active.active = Set(false);
            active.revoked_at = Set(Some(Utc::now()));
            active.update(db).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn model_to_api_key(m: api_key::Model) -> ApiKey {
    ApiKey {
        id: m.id,
        owner_id: m.owner_id,
        key_hash: m.key_hash,
        key_prefix: m.key_prefix,
        active: m.active,
        created_by: m.created_by,
        last_used_at: m.last_used_at,
        created_at: m.created_at,
        revoked_at: m.revoked_at,
    }
}
