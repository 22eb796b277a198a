//! Account forms: login, registration, password change and reset, and
//! picking a username.

use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use super::{FormErrors, REQUIRED, check_password_strength, required_text};
use crate::auth::backends::{ModelBackend, add_new_user_role};
use crate::auth::password::{
    check_password, generate_activation_key, hash_password, hash_token, reset_token_valid,
};
use crate::db::{registration, roles, users};
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::models::user::{CreateUserRequest, NewUser, USERNAME_MAX_LENGTH};
use crate::services::mailer::{ACTIVATION_SUBJECT, MailerHandle, activation_body};

pub const INVALID_LOGIN: &str = "Please enter a correct username and password. \
Note that both fields are case-sensitive.";
pub const INACTIVE_ACCOUNT: &str = "This account is inactive.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";
pub const WRONG_OLD_PASSWORD: &str =
    "Your old password was entered incorrectly. Please enter it again.";
pub const UNKNOWN_EMAIL: &str = "That e-mail address doesn't have an associated user account. \
Are you sure you've registered?";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const EMAIL_TAKEN: &str =
    "This email address is already in use. Please supply a different email address.";
pub const INVALID_USERNAME: &str =
    "This value may contain only letters, numbers and @/./+/-/_ characters.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const INVALID_RESET_LINK: &str =
    "The password reset link was invalid, possibly because it has already been used.";

/// Letters, digits and `@.+-_`, at most 30 characters.
fn clean_username(errors: &mut FormErrors, field: &str, value: Option<&str>) -> Option<String> {
    let username = required_text(errors, field, value)?;
    if username.chars().count() > USERNAME_MAX_LENGTH {
        errors.add(
            field,
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                USERNAME_MAX_LENGTH,
                username.chars().count()
            ),
        );
        return None;
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        errors.add(field, INVALID_USERNAME);
        return None;
    }
    Some(username.to_string())
}

fn clean_email(errors: &mut FormErrors, value: Option<&str>) -> Option<String> {
    let email = required_text(errors, "email", value)?;
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        errors.add("email", INVALID_EMAIL);
        return None;
    }
    Some(email.to_string())
}

/// Two matching password fields that pass the strength check.
fn clean_new_password(
    errors: &mut FormErrors,
    first_field: &str,
    second_field: &str,
    first: Option<&str>,
    second: Option<&str>,
) -> Option<String> {
    let first = match first {
        Some(p) if !p.is_empty() => p,
        _ => {
            errors.add(first_field, REQUIRED);
            return None;
        }
    };
    let second = match second {
        Some(p) if !p.is_empty() => p,
        _ => {
            errors.add(second_field, REQUIRED);
            return None;
        }
    };
    if first != second {
        errors.add(second_field, PASSWORD_MISMATCH);
        return None;
    }
    if let Some(problem) = check_password_strength(first) {
        errors.add(first_field, problem);
        return None;
    }
    Some(first.to_string())
}

fn fail_unless_clean<T>(errors: FormErrors, value: Option<T>) -> AppResult<T> {
    match value {
        Some(v) if errors.is_empty() => Ok(v),
        _ => Err(AppError::Validation(errors)),
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LoginData {
    pub username: Option<String>,
    pub password: Option<String>,
    pub next: Option<String>,
}

pub struct LoginForm(pub LoginData);

impl LoginForm {
    /// The account the credentials belong to.
    pub async fn authenticate<C: ConnectionTrait>(&self, db: &C) -> AppResult<User> {
        let mut errors = FormErrors::new();
        let username = required_text(&mut errors, "username", self.0.username.as_deref());
        let password = match self.0.password.as_deref() {
            Some(p) if !p.is_empty() => Some(p),
            _ => {
                errors.add("password", REQUIRED);
                None
            }
        };
        let (Some(username), Some(password)) = (username, password) else {
            return Err(AppError::Validation(errors));
        };

        match ModelBackend::authenticate(db, username, password).await? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(AppError::Validation(FormErrors::non_field(INACTIVE_ACCOUNT))),
            None => Err(AppError::Validation(FormErrors::non_field(INVALID_LOGIN))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RegistrationData {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password1: Option<String>,
    pub password2: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CleanedRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub struct RegistrationForm(pub RegistrationData);

impl RegistrationForm {
    pub async fn clean<C: ConnectionTrait>(&self, db: &C) -> AppResult<CleanedRegistration> {
        let mut errors = FormErrors::new();
        let data = &self.0;

        let username = clean_username(&mut errors, "username", data.username.as_deref());
        if let Some(ref u) = username
            && users::username_exists(db, u).await?
        {
            errors.add("username", USERNAME_TAKEN);
        }

        let email = clean_email(&mut errors, data.email.as_deref());
        if let Some(ref e) = email
            && users::email_exists(db, e).await?
        {
            errors.add("email", EMAIL_TAKEN);
        }

        let password = clean_new_password(
            &mut errors,
            "password1",
            "password2",
            data.password1.as_deref(),
            data.password2.as_deref(),
        );

        let cleaned = match (username, email, password) {
            (Some(username), Some(email), Some(password)) => Some(CleanedRegistration {
                username,
                email,
                password,
            }),
            _ => None,
        };
        fail_unless_clean(errors, cleaned)
    }

    /// Create an inactive account and mail its activation key. Nothing is
    /// stored when the mail cannot be sent.
    pub async fn save(
        &self,
        db: &DatabaseConnection,
        hash_cost: u32,
        mailer: &MailerHandle,
        activation_days: i64,
    ) -> AppResult<User> {
        let cleaned = self.clean(db).await?;
        let password_hash = hash_password(&cleaned.password, hash_cost).await?;
        let key = generate_activation_key(&cleaned.username);
        let body = activation_body(&cleaned.username, &key, activation_days);
        let mailer = mailer.clone();

        let user = db
            .transaction::<_, User, AppError>(|txn| {
                Box::pin(async move {
                    let user = users::create(
                        txn,
                        NewUser {
                            username: cleaned.username,
                            email: cleaned.email,
                            password_hash: Some(password_hash),
                            is_active: false,
                            ..Default::default()
                        },
                    )
                    .await?;
                    registration::create(txn, user.id, &key).await?;
                    add_new_user_role(txn, user.id).await?;
                    mailer
                        .0
                        .send(&user.email, ACTIVATION_SUBJECT, &body)
                        .await?;
                    Ok(user)
                })
            })
            .await?;

        Ok(user)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ChangePasswordData {
    pub old_password: Option<String>,
    pub new_password1: Option<String>,
    pub new_password2: Option<String>,
}

pub struct ChangePasswordForm<'a> {
    pub data: ChangePasswordData,
    pub user: &'a User,
}

impl ChangePasswordForm<'_> {
    pub async fn clean(&self) -> AppResult<String> {
        let mut errors = FormErrors::new();

        let old_ok = match self.data.old_password.as_deref() {
            Some(old) if !old.is_empty() => {
                check_password(old, self.user.password_hash.as_deref()).await
            }
            _ => {
                errors.add("old_password", REQUIRED);
                true
            }
        };
        if !old_ok {
            errors.add("old_password", WRONG_OLD_PASSWORD);
        }

        let password = clean_new_password(
            &mut errors,
            "new_password1",
            "new_password2",
            self.data.new_password1.as_deref(),
            self.data.new_password2.as_deref(),
        );
        fail_unless_clean(errors, password)
    }

    pub async fn save<C: ConnectionTrait>(&self, db: &C, hash_cost: u32) -> AppResult<()> {
        let password = self.clean().await?;
        let hash = hash_password(&password, hash_cost).await?;
        users::set_password(db, self.user.id, Some(hash)).await
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SetPasswordData {
    pub new_password1: Option<String>,
    pub new_password2: Option<String>,
}

/// Sets a new password from a password reset link.
pub struct SetPasswordForm(pub SetPasswordData);

impl SetPasswordForm {
    pub fn clean(&self) -> AppResult<String> {
        let mut errors = FormErrors::new();
        let password = clean_new_password(
            &mut errors,
            "new_password1",
            "new_password2",
            self.0.new_password1.as_deref(),
            self.0.new_password2.as_deref(),
        );
        fail_unless_clean(errors, password)
    }

    /// Check the reset token, then set the password. Setting the password
    /// clears the token so the link cannot be reused.
    pub async fn save<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: uuid::Uuid,
        token: &str,
        hash_cost: u32,
    ) -> AppResult<User> {
        let user = users::find_by_id(db, user_id).await?;
        let valid = user.as_ref().is_some_and(|u| {
            match (&u.password_reset_hash, u.password_reset_at) {
                (Some(stored), Some(at)) => {
                    let matches: bool = stored.as_bytes().ct_eq(hash_token(token).as_bytes()).into();
                    matches && reset_token_valid(at, Utc::now())
                }
                _ => false,
            }
        });
        let Some(user) = user.filter(|_| valid) else {
            return Err(AppError::Validation(FormErrors::non_field(INVALID_RESET_LINK)));
        };

        let password = self.clean()?;
        let hash = hash_password(&password, hash_cost).await?;
        users::set_password(db, user.id, Some(hash)).await?;
        users::get(db, user.id).await
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PasswordResetData {
    pub email: Option<String>,
}

pub struct PasswordResetForm(pub PasswordResetData);

impl PasswordResetForm {
    /// Active users with a usable password registered under the email.
    pub async fn clean<C: ConnectionTrait>(&self, db: &C) -> AppResult<Vec<User>> {
        let mut errors = FormErrors::new();
        let Some(email) = clean_email(&mut errors, self.0.email.as_deref()) else {
            return Err(AppError::Validation(errors));
        };

        let matching: Vec<User> = users::filter_by_email(db, &email)
            .await?
            .into_iter()
            .filter(|u| u.is_active && u.has_usable_password())
            .collect();
        if matching.is_empty() {
            errors.add("email", UNKNOWN_EMAIL);
            return Err(AppError::Validation(errors));
        }
        Ok(matching)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SetUsernameData {
    pub username: Option<String>,
    pub next: Option<String>,
}

pub struct SetUsernameForm<'a> {
    pub data: SetUsernameData,
    pub user: &'a User,
}

impl SetUsernameForm<'_> {
    pub async fn clean<C: ConnectionTrait>(&self, db: &C) -> AppResult<String> {
        let mut errors = FormErrors::new();
        let username = clean_username(&mut errors, "username", self.data.username.as_deref());
        if let Some(ref u) = username
            && u != &self.user.username
            && users::username_exists(db, u).await?
        {
            errors.add("username", USERNAME_TAKEN);
        }
        fail_unless_clean(errors, username)
    }

    pub async fn save<C: ConnectionTrait>(&self, db: &C) -> AppResult<User> {
        let username = self.clean(db).await?;
        users::set_username(db, self.user.id, &username).await
    }
}

/// Account created by a user manager: active at once, optional password.
pub struct CreateUserForm(pub CreateUserRequest);

impl CreateUserForm {
    pub async fn clean<C: ConnectionTrait>(&self, db: &C) -> AppResult<NewUser> {
        let data = &self.0;
        let mut errors = FormErrors::new();
        let username = clean_username(&mut errors, "username", data.username.as_deref());
        let email = clean_email(&mut errors, data.email.as_deref());

        if let Some(ref u) = username
            && users::username_exists(db, u).await?
        {
            errors.add("username", USERNAME_TAKEN);
        }
        if let Some(ref e) = email
            && users::email_exists(db, e).await?
        {
            errors.add("email", EMAIL_TAKEN);
        }
        let password = data.password.as_deref().filter(|p| !p.is_empty());
        if let Some(problem) = password.and_then(check_password_strength) {
            errors.add("password", problem);
        }

        let cleaned = match (username, email) {
            (Some(username), Some(email)) => Some(NewUser {
                username,
                email,
                password_hash: None,
                first_name: data.first_name.trim().to_string(),
                last_name: data.last_name.trim().to_string(),
                is_active: true,
                is_superuser: data.is_superuser,
            }),
            _ => None,
        };
        fail_unless_clean(errors, cleaned)
    }

    /// Create the user, add the requested roles and the default role.
    pub async fn save(&self, db: &DatabaseConnection, hash_cost: u32) -> AppResult<User> {
        let mut new = self.clean(db).await?;
        if let Some(password) = self.0.password.as_deref().filter(|p| !p.is_empty()) {
            new.password_hash = Some(hash_password(password, hash_cost).await?);
        }
        let role_ids = self.0.roles.clone();

        let user = db
            .transaction::<_, User, AppError>(|txn| {
                Box::pin(async move {
                    let user = users::create(txn, new).await?;
                    for role_id in role_ids {
                        roles::add_user(txn, user.id, role_id).await?;
                    }
                    add_new_user_role(txn, user.id).await?;
                    Ok(user)
                })
            })
            .await?;
        Ok(user)
    }
}
