//! User and role models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Longest username the user table accepts.
pub const USERNAME_MAX_LENGTH: usize = 30;

/// Permission codenames checked by the views.
pub mod perms {
    pub const MANAGE_USERS: &str = "core.manage_users";
    pub const MANAGE_PRODUCTS: &str = "core.manage_products";
    pub const MANAGE_ENVIRONMENTS: &str = "environments.manage_environments";
    pub const MANAGE_CASES: &str = "library.manage_cases";
    pub const MANAGE_SUITES: &str = "library.manage_suites";
    pub const MANAGE_RUNS: &str = "execution.manage_runs";
    pub const EXECUTE: &str = "execution.execute";

    pub const ALL: [&str; 7] = [
        MANAGE_USERS,
        MANAGE_PRODUCTS,
        MANAGE_ENVIRONMENTS,
        MANAGE_CASES,
        MANAGE_SUITES,
        MANAGE_RUNS,
        EXECUTE,
    ];

    pub fn is_known(codename: &str) -> bool {
        ALL.contains(&codename)
    }
}

/// User stored in database.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub password_reset_hash: Option<String>,
    pub password_reset_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn has_usable_password(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Fields for a new user row.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

/// User info response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub has_usable_password: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            has_usable_password: u.has_usable_password(),
            username: u.username,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            is_active: u.is_active,
            is_superuser: u.is_superuser,
            date_joined: u.date_joined,
            last_login: u.last_login,
        }
    }
}

/// Named group of permissions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<String>,
}

/// Session JWT claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iss: String,
    pub exp: usize,
    pub iat: usize,
    pub username: String,
}

/// Request to create a user from the management API.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_superuser: bool,
    /// Role ids to add the user to, on top of the default new-user role
    #[serde(default)]
    pub roles: Vec<Uuid>,
}

/// Request to create a role.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Site preferences as exposed by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CorePreferences {
    pub default_new_user_role: Option<Uuid>,
}
