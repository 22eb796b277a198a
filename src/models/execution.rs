//! Run-execution views: results, step results and the run-tests page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::library::{CaseStep, CaseVersion, SuiteRef};
use super::{Pagination, ResultStatus, StepResultStatus};

/// A tester's result for one case in one environment.
///
/// `id` is `None` for the default result of a tester who has not acted on
/// the case yet; such a result is never persisted by a read.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TestResult {
    pub id: Option<Uuid>,
    pub tester_id: Uuid,
    pub runcaseversion_id: Uuid,
    pub environment_id: Uuid,
    pub status: ResultStatus,
    pub comment: String,
    pub is_latest: bool,
    pub modified_at: Option<DateTime<Utc>>,
}

impl TestResult {
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

/// Another tester's completed result, trimmed to what the page shows.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OtherResult {
    pub id: Uuid,
    pub status: ResultStatus,
    pub tester_id: Uuid,
    pub tester_username: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StepResult {
    pub id: Option<Uuid>,
    pub result_id: Option<Uuid>,
    pub step_id: Uuid,
    pub status: StepResultStatus,
    pub bug_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StepWithResult {
    pub step: CaseStep,
    pub stepresult: StepResult,
}

/// Everything the run-tests page shows for one case.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunTestsItem {
    pub runcaseversion_id: Uuid,
    pub order: i32,
    pub caseversion: CaseVersion,
    pub result: TestResult,
    pub other_result: Option<OtherResult>,
    pub steps: Vec<StepWithResult>,
    pub suites: Vec<SuiteRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunTestsPage {
    pub run_id: Uuid,
    pub environment_id: Uuid,
    /// Fraction of applicable cases with a completed result, 0.0 to 1.0
    pub completion: f64,
    pub items: Vec<RunTestsItem>,
    pub pagination: Pagination,
}

/// Actions a tester can take on a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResultAction {
    Start,
    Pass,
    Fail,
    Invalidate,
    Block,
    Skip,
}

impl ResultAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "invalidate" => Some(Self::Invalidate),
            "block" => Some(Self::Block),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }

    /// Status the new result row gets.
    pub fn status(&self) -> ResultStatus {
        match self {
            Self::Start => ResultStatus::Started,
            Self::Pass => ResultStatus::Passed,
            Self::Fail => ResultStatus::Failed,
            Self::Invalidate => ResultStatus::Invalidated,
            Self::Block => ResultStatus::Blocked,
            Self::Skip => ResultStatus::Skipped,
        }
    }

    /// Status recorded against a step, for actions that can blame one.
    pub fn step_status(&self) -> Option<StepResultStatus> {
        match self {
            Self::Fail => Some(StepResultStatus::Failed),
            Self::Block => Some(StepResultStatus::Blocked),
            _ => None,
        }
    }
}

/// Optional details submitted with a result action.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ResultActionRequest {
    #[serde(default)]
    pub comment: String,
    /// Step number the failure or block applies to
    pub stepnumber: Option<i32>,
    /// Bug tracker URL
    pub bug: Option<String>,
}
