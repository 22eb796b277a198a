//! Registration profiles holding account activation keys.

use chrono::{DateTime, Utc};
use sea_orm::*;
use uuid::Uuid;

use crate::entity::{registration_profile, user};
use crate::error::AppResult;

/// Marker stored in place of a key that has been used.
pub const ACTIVATED: &str = "ALREADY_ACTIVATED";

pub async fn create<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    activation_key: &str,
) -> AppResult<registration_profile::Model> {
    let model = registration_profile::ActiveModel {
        id: Set(Uuid::now_v7()),
        user_id: Set(user_id),
        activation_key: Set(activation_key.to_string()),
    }
    .insert(db)
    .await?;
    Ok(model)
}

pub async fn find_by_key<C: ConnectionTrait>(
    db: &C,
    activation_key: &str,
) -> AppResult<Option<registration_profile::Model>> {
    Ok(registration_profile::Entity::find()
        .filter(registration_profile::Column::ActivationKey.eq(activation_key))
        .one(db)
        .await?)
}

/// Burn the activation key so it cannot be used twice.
pub async fn mark_activated<C: ConnectionTrait>(
    db: &C,
    profile: registration_profile::Model,
) -> AppResult<()> {
    let mut active: registration_profile::ActiveModel = profile.into();
    active.activation_key = Set(ACTIVATED.to_string());
    active.update(db).await?;
    Ok(())
}

/// Inactive users who registered before `cutoff` and never activated.
pub async fn expired_user_ids<C: ConnectionTrait>(
    db: &C,
    cutoff: DateTime<Utc>,
) -> AppResult<Vec<Uuid>> {
    let pending: Vec<Uuid> = registration_profile::Entity::find()
        .filter(registration_profile::Column::ActivationKey.ne(ACTIVATED))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.user_id)
        .collect();

    if pending.is_empty() {
        return Ok(Vec::new());
    }

    Ok(user::Entity::find()
        .filter(user::Column::Id.is_in(pending))
        .filter(user::Column::IsActive.eq(false))
        .filter(user::Column::DateJoined.lt(cutoff))
        .all(db)
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect())
}
