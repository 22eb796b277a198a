//! Database operations for users.

use chrono::{DateTime, Utc};
use sea_orm::*;
use uuid::Uuid;

use crate::entity::{api_key, registration_profile, result, user, user_openid, user_role};
use crate::error::{AppError, AppResult};
use crate::models::user::{NewUser, User};

/// Insert a new user.
pub async fn create<C: ConnectionTrait>(db: &C, new: NewUser) -> AppResult<User> {
    let model = user::ActiveModel {
        id: Set(Uuid::now_v7()),
        username: Set(new.username),
        email: Set(new.email),
        password_hash: Set(new.password_hash),
        first_name: Set(new.first_name),
        last_name: Set(new.last_name),
        is_active: Set(new.is_active),
        is_superuser: Set(new.is_superuser),
        date_joined: Set(Utc::now()),
        last_login: Set(None),
        password_reset_hash: Set(None),
        password_reset_at: Set(None),
    };

    let inserted = model.insert(db).await?;
    Ok(model_to_user(inserted))
}

/// Find a user by ID.
pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<User>> {
    let result = user::Entity::find_by_id(id).one(db).await?;
    Ok(result.map(model_to_user))
}

/// Find a user by ID or fail with NotFound.
pub async fn get<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<User> {
    find_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
}

pub async fn find_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> AppResult<Option<User>> {
    let result = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;
    Ok(result.map(model_to_user))
}

/// Users whose username or email equals `identifier`, oldest first.
pub async fn find_by_username_or_email<C: ConnectionTrait>(
    db: &C,
    identifier: &str,
) -> AppResult<Vec<User>> {
    let results = user::Entity::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(identifier))
                .add(user::Column::Email.eq(identifier)),
        )
        .order_by_asc(user::Column::DateJoined)
        .all(db)
        .await?;
    Ok(results.into_iter().map(model_to_user).collect())
}

/// All users with this email. Email is not unique for legacy accounts.
pub async fn filter_by_email<C: ConnectionTrait>(db: &C, email: &str) -> AppResult<Vec<User>> {
    let results = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .order_by_asc(user::Column::DateJoined)
        .all(db)
        .await?;
    Ok(results.into_iter().map(model_to_user).collect())
}

pub async fn username_exists<C: ConnectionTrait>(db: &C, username: &str) -> AppResult<bool> {
    let count = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .count(db)
        .await?;
    Ok(count > 0)
}

pub async fn email_exists<C: ConnectionTrait>(db: &C, email: &str) -> AppResult<bool> {
    let count = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// Whether an account other than `id` already holds `email`.
pub async fn email_taken_by_other<C: ConnectionTrait>(
    db: &C,
    email: &str,
    id: Uuid,
) -> AppResult<bool> {
    let count = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .filter(user::Column::Id.ne(id))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// List users ordered by username, with the total count.
pub async fn list<C: ConnectionTrait>(
    db: &C,
    offset: u64,
    limit: u64,
) -> AppResult<(Vec<User>, u64)> {
    let total = user::Entity::find().count(db).await?;
    let results = user::Entity::find()
        .order_by_asc(user::Column::Username)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;
    Ok((results.into_iter().map(model_to_user).collect(), total))
}

async fn find_model<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<user::Model> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
}

/// Replace the password hash; `None` makes the password unusable.
pub async fn set_password<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    password_hash: Option<String>,
) -> AppResult<()> {
    let mut active: user::ActiveModel = find_model(db, id).await?.into();
    active.password_hash = Set(password_hash);
    // Any outstanding reset token dies with the old password.
    active.password_reset_hash = Set(None);
    active.password_reset_at = Set(None);
    active.update(db).await?;
    Ok(())
}

/// Store a password reset token hash.
pub async fn set_password_reset<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    token_hash: String,
    at: DateTime<Utc>,
) -> AppResult<()> {
    let mut active: user::ActiveModel = find_model(db, id).await?.into();
    active.password_reset_hash = Set(Some(token_hash));
    active.password_reset_at = Set(Some(at));
    active.update(db).await?;
    Ok(())
}

/// Activate or deactivate a user. Returns the updated user.
pub async fn set_active<C: ConnectionTrait>(db: &C, id: Uuid, is_active: bool) -> AppResult<User> {
    let mut active: user::ActiveModel = find_model(db, id).await?.into();
    active.is_active = Set(is_active);
    let updated = active.update(db).await?;
    Ok(model_to_user(updated))
}

pub async fn set_username<C: ConnectionTrait>(db: &C, id: Uuid, username: &str) -> AppResult<User> {
    let mut active: user::ActiveModel = find_model(db, id).await?.into();
    active.username = Set(username.to_string());
    let updated = active.update(db).await?;
    Ok(model_to_user(updated))
}

/// Update profile details reported by an identity provider. Empty values
/// leave the stored ones alone, and so does an email another account holds.
pub async fn update_details<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    email: &str,
    first_name: &str,
    last_name: &str,
) -> AppResult<User> {
    let model = find_model(db, id).await?;
    let mut active: user::ActiveModel = model.into();
    if !email.is_empty() && !email_taken_by_other(db, email, id).await? {
        active.email = Set(email.to_string());
    }
    if !first_name.is_empty() {
        active.first_name = Set(truncate(first_name, 30));
    }
    if !last_name.is_empty() {
        active.last_name = Set(truncate(last_name, 30));
    }
    let updated = active.update(db).await?;
    Ok(model_to_user(updated))
}

/// Update last login timestamp.
pub async fn touch_last_login<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<()> {
    let mut active: user::ActiveModel = find_model(db, id).await?.into();
    active.last_login = Set(Some(Utc::now()));
    active.update(db).await?;
    Ok(())
}

/// Whether the user has recorded any result as a tester.
pub async fn has_results<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<bool> {
    let count = result::Entity::find()
        .filter(result::Column::TesterId.eq(id))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// Delete a user and the rows that only exist for them.
///
/// Users who recorded results are kept for history; deactivate them instead.
pub async fn delete(db: &DatabaseConnection, id: Uuid) -> AppResult<()> {
    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move { delete_in(txn, id).await })
    })
    .await?;
    Ok(())
}

/// Delete a user inside an open transaction.
pub async fn delete_in<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<()> {
    find_model(db, id).await?;

    if has_results(db, id).await? {
        return Err(AppError::InvalidInput(
            "User has recorded test results and cannot be deleted; deactivate the account instead"
                .to_string(),
        ));
    }

    registration_profile::Entity::delete_many()
        .filter(registration_profile::Column::UserId.eq(id))
        .exec(db)
        .await?;
    user_role::Entity::delete_many()
        .filter(user_role::Column::UserId.eq(id))
        .exec(db)
        .await?;
    user_openid::Entity::delete_many()
        .filter(user_openid::Column::UserId.eq(id))
        .exec(db)
        .await?;
    api_key::Entity::delete_many()
        .filter(api_key::Column::OwnerId.eq(id))
        .exec(db)
        .await?;
    user::Entity::delete_by_id(id).exec(db).await?;

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub(crate) fn model_to_user(m: user::Model) -> User {
    User {
        id: m.id,
        username: m.username,
        email: m.email,
        password_hash: m.password_hash,
        first_name: m.first_name,
        last_name: m.last_name,
        is_active: m.is_active,
        is_superuser: m.is_superuser,
        date_joined: m.date_joined,
        last_login: m.last_login,
        password_reset_hash: m.password_reset_hash,
        password_reset_at: m.password_reset_at,
    }
}
