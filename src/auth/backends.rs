//! Login backends: username/email and password, BrowserID and OpenID.
//!
//! The backends decide which account a credential maps to and create
//! accounts for federated logins. Verifying the credential with the remote
//! provider happens in `services::browserid` and `services::openid`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use sha1::{Digest, Sha1};
use uuid::Uuid;

use super::password::check_password;
use crate::db::{openids, preferences, roles, users};
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::models::user::{NewUser, USERNAME_MAX_LENGTH};

/// Prefix of usernames generated for BrowserID sign-ups.
pub const AUTO_USERNAME_PREFIX: &str = ":auto:";

const DIGEST_LENGTH: usize = USERNAME_MAX_LENGTH - AUTO_USERNAME_PREFIX.len();

/// Fallback username when an OpenID provider sends no nickname.
const DEFAULT_OPENID_NICKNAME: &str = "openiduser";

/// Username/email and password authentication.
pub struct ModelBackend;

impl ModelBackend {
    /// Return the first user whose username or email is `username` and whose
    /// password matches.
    pub async fn authenticate<C: ConnectionTrait>(
        db: &C,
        username: &str,
        password: &str,
    ) -> AppResult<Option<User>> {
        for candidate in users::find_by_username_or_email(db, username).await? {
            if check_password(password, candidate.password_hash.as_deref()).await {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    pub async fn get_user<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<Option<User>> {
        users::find_by_id(db, user_id).await
    }
}

/// BrowserID (Persona) account lookup and creation.
pub struct BrowserIdBackend;

impl BrowserIdBackend {
    pub async fn get_user<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<Option<User>> {
        users::find_by_id(db, user_id).await
    }

    /// All users matching the verified email.
    pub async fn filter_users_by_email<C: ConnectionTrait>(
        db: &C,
        email: &str,
    ) -> AppResult<Vec<User>> {
        users::filter_by_email(db, email).await
    }

    /// Create an account for a first BrowserID sign-in.
    pub async fn create_user<C: ConnectionTrait>(db: &C, email: &str) -> AppResult<User> {
        let user = users::create(
            db,
            NewUser {
                username: browserid_username(email),
                email: email.to_string(),
                password_hash: None,
                is_active: true,
                ..Default::default()
            },
        )
        .await?;
        add_new_user_role(db, user.id).await?;
        Ok(user)
    }
}

/// `:auto:` followed by the URL-safe base64 SHA-1 digest of the email,
/// cut to fit the username column.
pub fn browserid_username(email: &str) -> String {
    let digest = URL_SAFE.encode(Sha1::digest(email.as_bytes()));
    let digest: String = digest.chars().take(DIGEST_LENGTH).collect();
    format!("{}{}", AUTO_USERNAME_PREFIX, digest)
}

/// Identity asserted by an OpenID provider.
#[derive(Debug, Clone, Default)]
pub struct OpenIdResponse {
    /// Stable identifier of the identity at the provider
    pub identity_url: String,
    /// Identifier shown to the user
    pub display_id: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub fullname: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Details extracted from an OpenID response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDetails {
    pub nickname: String,
    pub email: String,
    pub fullname: String,
    pub first_name: String,
    pub last_name: String,
}

impl UserDetails {
    fn get(&self, attr: &str) -> Option<&str> {
        let value = match attr {
            "nickname" => &self.nickname,
            "email" => &self.email,
            "fullname" => &self.fullname,
            "first_name" => &self.first_name,
            "last_name" => &self.last_name,
            _ => return None,
        };
        Some(value.as_str()).filter(|v| !v.is_empty())
    }
}

/// OpenID account lookup, association and creation.
pub struct OpenIdBackend {
    pub required_fields: Vec<String>,
    pub strict_usernames: bool,
}

impl OpenIdBackend {
    pub async fn get_user<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<Option<User>> {
        users::find_by_id(db, user_id).await
    }

    pub async fn filter_users_by_email<C: ConnectionTrait>(
        db: &C,
        email: &str,
    ) -> AppResult<Vec<User>> {
        users::filter_by_email(db, email).await
    }

    /// Fill in first and last names from the full name when the provider
    /// did not send them separately.
    pub fn extract_user_details(response: &OpenIdResponse) -> UserDetails {
        let clean = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").to_string();
        let mut details = UserDetails {
            nickname: clean(&response.nickname),
            email: clean(&response.email),
            fullname: clean(&response.fullname),
            first_name: clean(&response.first_name),
            last_name: clean(&response.last_name),
        };

        if details.first_name.is_empty()
            && details.last_name.is_empty()
            && !details.fullname.is_empty()
        {
            match details.fullname.rsplit_once(' ') {
                Some((first, last)) => {
                    details.first_name = first.trim().to_string();
                    details.last_name = last.trim().to_string();
                }
                None => details.last_name = details.fullname.clone(),
            }
        }

        details
    }

    /// Attributes that must be present to create an account.
    fn required_attrs(&self) -> Vec<String> {
        let mut attrs = self.required_fields.clone();
        if self.strict_usernames && !attrs.iter().any(|a| a == "nickname") {
            attrs.push("nickname".to_string());
        }
        attrs
    }

    /// Log in an OpenID identity: the associated user if there is one,
    /// otherwise a newly created account.
    pub async fn authenticate(
        &self,
        db: &DatabaseConnection,
        response: &OpenIdResponse,
    ) -> AppResult<User> {
        if let Some(user_id) = openids::user_for_claimed_id(db, &response.identity_url).await? {
            let details = Self::extract_user_details(response);
            return users::update_details(
                db,
                user_id,
                &details.email,
                &details.first_name,
                &details.last_name,
            )
            .await;
        }

        let response = response.clone();
        let required = self.required_attrs();
        let strict = self.strict_usernames;
        let user = db
            .transaction::<_, User, AppError>(|txn| {
                Box::pin(async move {
                    create_user_from_openid(txn, &response, &required, strict).await
                })
            })
            .await?;
        Ok(user)
    }

    /// Pick a free username for `nickname`.
    pub async fn get_available_username<C: ConnectionTrait>(
        &self,
        db: &C,
        nickname: &str,
        identity_url: &str,
    ) -> AppResult<String> {
        get_available_username(db, nickname, identity_url, self.strict_usernames).await
    }
}

async fn create_user_from_openid<C: ConnectionTrait>(
    db: &C,
    response: &OpenIdResponse,
    required_attrs: &[String],
    strict_usernames: bool,
) -> AppResult<User> {
    let details = OpenIdBackend::extract_user_details(response);

    for attr in required_attrs {
        if details.get(attr).is_none() {
            return Err(AppError::Unauthorized(format!(
                "An attribute required for logging in was not returned ({}).",
                attr
            )));
        }
    }

    if !details.email.is_empty() && users::email_exists(db, &details.email).await? {
        return Err(AppError::Unauthorized(format!(
            "The email address ({}) with which you tried to log in is already in use for a different account.",
            details.email
        )));
    }

    let username =
        get_available_username(db, &details.nickname, &response.identity_url, strict_usernames)
            .await?;

    let user = users::create(
        db,
        NewUser {
            username,
            email: details.email.clone(),
            password_hash: None,
            is_active: true,
            ..Default::default()
        },
    )
    .await?;

    add_new_user_role(db, user.id).await?;

    openids::associate(db, user.id, &response.identity_url, &response.display_id).await?;
    users::update_details(
        db,
        user.id,
        &details.email,
        &details.first_name,
        &details.last_name,
    )
    .await
}

/// The nickname itself when free; in strict mode a taken nickname is an
/// error, otherwise a numeric suffix starting at 2 is appended.
async fn get_available_username<C: ConnectionTrait>(
    db: &C,
    nickname: &str,
    identity_url: &str,
    strict_usernames: bool,
) -> AppResult<String> {
    let nickname: String = if nickname.trim().is_empty() {
        DEFAULT_OPENID_NICKNAME.to_string()
    } else {
        nickname.trim().chars().take(USERNAME_MAX_LENGTH).collect()
    };

    let Some(existing) = users::find_by_username(db, &nickname).await? else {
        return Ok(nickname);
    };

    // The identity may already own this exact username.
    if openids::user_for_claimed_id(db, identity_url).await? == Some(existing.id) {
        return Ok(nickname);
    }

    if strict_usernames {
        return Err(AppError::Unauthorized(format!(
            "The username ({}) with which you tried to log in is already in use for a different account.",
            nickname
        )));
    }

    let mut i: u32 = 2;
    loop {
        let suffix = i.to_string();
        let base: String = nickname
            .chars()
            .take(USERNAME_MAX_LENGTH - suffix.len())
            .collect();
        let candidate = format!("{}{}", base, suffix);
        if !users::username_exists(db, &candidate).await? {
            return Ok(candidate);
        }
        i += 1;
    }
}

/// Add the user to the default new-user role, when one is configured.
pub async fn add_new_user_role<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<()> {
    if let Some(role_id) = preferences::get(db).await?.default_new_user_role {
        roles::add_user(db, user_id, role_id).await?;
    }
    Ok(())
}
