//! API Key model for authentication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// API Key stored in database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Unique identifier (UUID)
    pub id: Uuid,
    /// User the key authenticates as
    pub owner_id: Uuid,
    /// SHA-256 hash of the full key
    pub key_hash: String,
    /// First 8 characters of the key for identification
    pub key_prefix: String,
    pub active: bool,
    /// User who issued the key
    pub created_by: Option<Uuid>,
    /// Last used timestamp
    pub last_used_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Check if the key is revoked.
    pub fn is_revoked(&self) -> bool {
        !self.active || self.revoked_at.is_some()
    }
}

/// Response when creating a new API key (includes the full key).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyCreateResponse {
    pub id: Uuid,
    /// Full key, only shown once
    pub key: String,
    pub key_prefix: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Where the management UI goes after issuing the key
    pub redirect: String,
}

/// Response for listing API keys (key masked).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyListItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub key_prefix: String,
    pub created_by: Option<Uuid>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_revoked: bool,
}

impl From<ApiKey> for ApiKeyListItem {
    fn from(key: ApiKey) -> Self {
        Self {
            is_revoked: key.is_revoked(),
            id: key.id,
            owner_id: key.owner_id,
            key_prefix: key.key_prefix,
            created_by: key.created_by,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}
