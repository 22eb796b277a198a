//! Site-wide preferences, stored as a single row.

use sea_orm::*;
use uuid::Uuid;

use crate::entity::core_preferences;
use crate::error::AppResult;
use crate::models::user::CorePreferences;

const PREFERENCES_ROW: i32 = 1;

/// Current preferences; defaults when the row was never written.
pub async fn get<C: ConnectionTrait>(db: &C) -> AppResult<CorePreferences> {
    let row = core_preferences::Entity::find_by_id(PREFERENCES_ROW)
        .one(db)
        .await?;
    Ok(CorePreferences {
        default_new_user_role: row.and_then(|r| r.default_new_user_role_id),
    })
}

/// Set (or clear) the role every new user is added to.
pub async fn set_default_new_user_role<C: ConnectionTrait>(
    db: &C,
    role_id: Option<Uuid>,
) -> AppResult<CorePreferences> {
    let existing = core_preferences::Entity::find_by_id(PREFERENCES_ROW)
        .one(db)
        .await?;

    match existing {
        Some(row) => {
            let mut active: core_preferences::ActiveModel = row.into();
            active.default_new_user_role_id = Set(role_id);
            active.update(db).await?;
        }
        None => {
            core_preferences::ActiveModel {
                id: Set(PREFERENCES_ROW),
                default_new_user_role_id: Set(role_id),
            }
            .insert(db)
            .await?;
        }
    }

    Ok(CorePreferences {
        default_new_user_role: role_id,
    })
}
