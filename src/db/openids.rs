//! OpenID identities associated with user accounts.

use sea_orm::*;
use uuid::Uuid;

use crate::entity::user_openid;
use crate::error::AppResult;

/// User id associated with a claimed identity, if any.
pub async fn user_for_claimed_id<C: ConnectionTrait>(
    db: &C,
    claimed_id: &str,
) -> AppResult<Option<Uuid>> {
    Ok(user_openid::Entity::find()
        .filter(user_openid::Column::ClaimedId.eq(claimed_id))
        .one(db)
        .await?
        .map(|m| m.user_id))
}

/// Associate an identity with a user.
pub async fn associate<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    claimed_id: &str,
    display_id: &str,
) -> AppResult<()> {
    user_openid::ActiveModel {
        id: Set(Uuid::now_v7()),
        user_id: Set(user_id),
        claimed_id: Set(claimed_id.to_string()),
        display_id: Set(display_id.to_string()),
    }
    .insert(db)
    .await?;
    Ok(())
}
