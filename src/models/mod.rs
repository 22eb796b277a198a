//! Domain models for MozTrap.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod api_key;
pub mod execution;
pub mod library;
pub mod product;
pub mod run;
pub mod status;
pub mod user;

// Re-export commonly used types
pub use api_key::{ApiKey, ApiKeyCreateResponse, ApiKeyListItem};
pub use status::{ObjectStatus, ResultStatus, StepResultStatus};
pub use user::{Role, User, UserResponse};

/// Pagination parameters.
#[derive(Debug, Clone, Default, serde::Deserialize, ToSchema, utoipa::IntoParams)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    100
}

impl PaginationParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(default_page()).max(1)
    }

    /// Calculate the offset for database queries.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.clamped_limit())
    }

    /// Clamp limit to maximum allowed value.
    pub fn clamped_limit(&self) -> u32 {
        self.limit.unwrap_or(default_limit()).clamp(1, 100)
    }
}

/// Pagination metadata for responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    /// Create pagination metadata.
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(limit as u64) as u32
        };

        Pagination {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Message shown to the user after an action.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

/// Outcome of a form-style action: messages to show and where to go next.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    pub messages: Vec<Message>,
    pub redirect: Option<String>,
}

impl ActionResponse {
    pub fn redirect(to: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            redirect: Some(to.into()),
        }
    }

    pub fn with_message(mut self, level: MessageLevel, text: impl Into<String>) -> Self {
        self.messages.push(Message {
            level,
            text: text.into(),
        });
        self
    }

    pub fn success(self, text: impl Into<String>) -> Self {
        self.with_message(MessageLevel::Success, text)
    }

    pub fn info(self, text: impl Into<String>) -> Self {
        self.with_message(MessageLevel::Info, text)
    }

    pub fn error(self, text: impl Into<String>) -> Self {
        self.with_message(MessageLevel::Error, text)
    }
}

/// Only follow `next` targets that stay on this site.
pub fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n.to_string(),
        _ => "/".to_string(),
    }
}
