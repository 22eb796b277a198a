//! Status vocabularies for library objects, runs and results.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of runs, suites and case versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    #[default]
    Draft,
    Active,
    Disabled,
}

impl ObjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// Default for a tester who has not touched the case yet
    #[default]
    Assigned,
    Started,
    Passed,
    Failed,
    Invalidated,
    Blocked,
    Skipped,
}

impl ResultStatus {
    /// Statuses that count toward run completion.
    pub const COMPLETED_STATES: [ResultStatus; 4] = [
        ResultStatus::Passed,
        ResultStatus::Failed,
        ResultStatus::Invalidated,
        ResultStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Started => "started",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Invalidated => "invalidated",
            Self::Blocked => "blocked",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assigned" => Some(Self::Assigned),
            "started" => Some(Self::Started),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "invalidated" => Some(Self::Invalidated),
            "blocked" => Some(Self::Blocked),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        Self::COMPLETED_STATES.contains(self)
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single step within a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StepResultStatus {
    #[default]
    Passed,
    Failed,
    Invalidated,
    Blocked,
}

impl StepResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Invalidated => "invalidated",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "invalidated" => Some(Self::Invalidated),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}
