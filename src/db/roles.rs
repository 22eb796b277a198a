//! Database operations for roles, permissions and role membership.

use std::collections::{BTreeMap, BTreeSet};

use sea_orm::*;
use uuid::Uuid;

use crate::entity::{role, role_permission, user_role};
use crate::error::{AppError, AppResult};
use crate::models::Role;

/// Create a role with the given permission codenames.
pub async fn create<C: ConnectionTrait>(
    db: &C,
    name: &str,
    permissions: &[String],
) -> AppResult<Role> {
    let id = Uuid::now_v7();
    role::ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await?;

    let codenames: BTreeSet<&String> = permissions.iter().collect();
    for codename in &codenames {
        role_permission::ActiveModel {
            id: Set(Uuid::now_v7()),
            role_id: Set(id),
            codename: Set(codename.to_string()),
        }
        .insert(db)
        .await?;
    }

    Ok(Role {
        id,
        name: name.to_string(),
        permissions: codenames.into_iter().cloned().collect(),
    })
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<Role>> {
    let Some(model) = role::Entity::find_by_id(id).one(db).await? else {
        return Ok(None);
    };
    let mut roles = with_permissions(db, vec![model]).await?;
    Ok(roles.pop())
}

pub async fn find_by_name<C: ConnectionTrait>(db: &C, name: &str) -> AppResult<Option<Role>> {
    let Some(model) = role::Entity::find()
        .filter(role::Column::Name.eq(name))
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    let mut roles = with_permissions(db, vec![model]).await?;
    Ok(roles.pop())
}

/// All roles ordered by name.
pub async fn list<C: ConnectionTrait>(db: &C) -> AppResult<Vec<Role>> {
    let models = role::Entity::find()
        .order_by_asc(role::Column::Name)
        .all(db)
        .await?;
    with_permissions(db, models).await
}

/// Roles the user belongs to.
pub async fn roles_for_user<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<Vec<Role>> {
    let role_ids: Vec<Uuid> = user_role::Entity::find()
        .filter(user_role::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.role_id)
        .collect();

    if role_ids.is_empty() {
        return Ok(Vec::new());
    }

    let models = role::Entity::find()
        .filter(role::Column::Id.is_in(role_ids))
        .order_by_asc(role::Column::Name)
        .all(db)
        .await?;
    with_permissions(db, models).await
}

/// Union of the permission codenames of the user's roles.
pub async fn permissions_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
) -> AppResult<BTreeSet<String>> {
    Ok(roles_for_user(db, user_id)
        .await?
        .into_iter()
        .flat_map(|r| r.permissions)
        .collect())
}

/// Add the user to a role. Adding an existing member is a no-op.
pub async fn add_user<C: ConnectionTrait>(db: &C, user_id: Uuid, role_id: Uuid) -> AppResult<()> {
    if role::Entity::find_by_id(role_id).one(db).await?.is_none() {
        return Err(AppError::NotFound("Role".to_string()));
    }

    let existing = user_role::Entity::find()
        .filter(user_role::Column::UserId.eq(user_id))
        .filter(user_role::Column::RoleId.eq(role_id))
        .count(db)
        .await?;
    if existing > 0 {
        return Ok(());
    }

    user_role::ActiveModel {
        id: Set(Uuid::now_v7()),
        user_id: Set(user_id),
        role_id: Set(role_id),
    }
    .insert(db)
    .await?;
    Ok(())
}

async fn with_permissions<C: ConnectionTrait>(
    db: &C,
    models: Vec<role::Model>,
) -> AppResult<Vec<Role>> {
    let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
    let mut by_role: BTreeMap<Uuid, Vec<String>> = BTreeMap::new();
    if !ids.is_empty() {
        let perms = role_permission::Entity::find()
            .filter(role_permission::Column::RoleId.is_in(ids))
            .order_by_asc(role_permission::Column::Codename)
            .all(db)
            .await?;
        for p in perms {
            by_role.entry(p.role_id).or_default().push(p.codename);
        }
    }

    Ok(models
        .into_iter()
        .map(|m| Role {
            permissions: by_role.remove(&m.id).unwrap_or_default(),
            id: m.id,
            name: m.name,
        })
        .collect())
}
