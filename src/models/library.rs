//! Test cases and suites.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::ObjectStatus;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CaseStep {
    pub id: Uuid,
    pub number: i32,
    pub instruction: String,
    pub expected: String,
}

/// A case as written for one product version.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CaseVersion {
    pub id: Uuid,
    pub case_id: Uuid,
    pub productversion_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: ObjectStatus,
    pub steps: Vec<CaseStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Suite {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: ObjectStatus,
    /// Case ids in suite order
    pub cases: Vec<Uuid>,
}

/// Suite reference shown next to an executing case.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuiteRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewStep {
    pub instruction: String,
    #[serde(default)]
    pub expected: String,
}

/// Create a case together with its first version.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCaseRequest {
    pub productversion: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ObjectStatus,
    #[serde(default)]
    pub steps: Vec<NewStep>,
}

/// Add a version of an existing case for another product version.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCaseVersionRequest {
    pub productversion: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ObjectStatus,
    #[serde(default)]
    pub steps: Vec<NewStep>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSuiteRequest {
    pub product: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ObjectStatus,
    #[serde(default)]
    pub cases: Vec<Uuid>,
}

/// Query filter for listing suites.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SuiteFilter {
    pub product: Option<Uuid>,
}
