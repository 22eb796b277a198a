//! Test runs and the run-management forms' data.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::ObjectStatus;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Run {
    pub id: Uuid,
    pub productversion_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: ObjectStatus,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub build: Option<String>,
    pub is_series: bool,
    pub series_id: Option<Uuid>,
    /// Bumped on every save; clients echo it back to detect concurrent edits
    pub cc_version: i32,
    pub created_by: Option<Uuid>,
    pub modified_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A run together with its suites and environments.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: Run,
    pub product_id: Uuid,
    /// Suite ids in run order
    pub suites: Vec<Uuid>,
    pub environments: Vec<Uuid>,
}

/// Submitted add/edit run form.
///
/// Values arrive as strings the way an HTML form posts them; parsing and
/// validation happen in the form, not in deserialization.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RunFormData {
    pub productversion: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default)]
    pub suites: Vec<String>,
    #[serde(default)]
    pub is_series: bool,
    pub build: Option<String>,
    pub cc_version: Option<i32>,
}

/// One option of a choice field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Choice {
    pub id: Uuid,
    pub label: String,
}

/// What a client needs to render the add or edit run form.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunFormChoices {
    pub productversion: Vec<Choice>,
    pub suites: Vec<Choice>,
    /// Fields the client must render read-only
    pub readonly: Vec<String>,
}

/// Request to clone a series run for a build.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CloneSeriesRequest {
    pub build: String,
}

/// Query filter for listing runs.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct RunFilter {
    pub productversion: Option<Uuid>,
    pub status: Option<ObjectStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}
