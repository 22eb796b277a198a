//! Run execution: the per-case lookups behind the run-tests page and the
//! result actions testers take.

use std::collections::{BTreeMap, BTreeSet};

use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{library, results, runs, users};
use crate::entity::{result, run_case_version, step_result};
use crate::error::{AppError, AppResult};
use crate::forms::FormErrors;
use crate::models::execution::{
    OtherResult, ResultAction, ResultActionRequest, RunTestsItem, RunTestsPage, StepResult,
    StepWithResult, TestResult,
};
use crate::models::library::{CaseStep, SuiteRef};
use crate::models::run::Run;
use crate::models::{ObjectStatus, Pagination, PaginationParams, ResultStatus, StepResultStatus};

/// Shown when a tester acts on a run, environment or case that went away.
pub const UNAVAILABLE: &str =
    "This test or test run is no longer available.  Please see your test manager.";

/// The tester's latest result for a case in an environment.
///
/// With no saved result an unsaved `assigned` default is returned. Legacy
/// data with several latest rows is repaired: the most recently modified
/// row stays latest and the rest are demoted.
pub async fn result_for<C: ConnectionTrait>(
    db: &C,
    runcaseversion_id: Uuid,
    tester_id: Uuid,
    environment_id: Uuid,
) -> AppResult<TestResult> {
    let mut latest = results::latest_for(db, runcaseversion_id, tester_id, environment_id).await?;

    if latest.is_empty() {
        return Ok(TestResult {
            id: None,
            tester_id,
            runcaseversion_id,
            environment_id,
            status: ResultStatus::default(),
            comment: String::new(),
            is_latest: true,
            modified_at: None,
        });
    }

    let keep = latest.swap_remove(0);
    if !latest.is_empty() {
        let demoted = results::set_latest(db, &keep).await?;
        info!(
            "Repaired latest flag for runcaseversion {} (demoted {} results)",
            runcaseversion_id, demoted
        );
    }

    Ok(model_to_result(keep))
}

/// Another tester's most recent completed or skipped result on the same
/// case and environment.
pub async fn other_result_for<C: ConnectionTrait>(
    db: &C,
    runcaseversion_id: Uuid,
    tester_id: Uuid,
    environment_id: Uuid,
) -> AppResult<Option<OtherResult>> {
    let mut statuses = ResultStatus::COMPLETED_STATES.to_vec();
    statuses.push(ResultStatus::Skipped);

    let Some(model) =
        results::other_latest(db, runcaseversion_id, environment_id, tester_id, &statuses).await?
    else {
        return Ok(None);
    };

    let tester_username = users::find_by_id(db, model.tester_id)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();

    Ok(Some(OtherResult {
        id: model.id,
        status: ResultStatus::parse(&model.status).unwrap_or_default(),
        tester_id: model.tester_id,
        tester_username,
        comment: model.comment,
    }))
}

/// The step result recorded against `step`, or an unsaved default.
pub async fn stepresult_for<C: ConnectionTrait>(
    db: &C,
    result: &TestResult,
    step: &CaseStep,
) -> AppResult<StepResult> {
    let found = match result.id {
        Some(result_id) => results::find_step_result(db, result_id, step.id).await?,
        None => None,
    };

    Ok(match found {
        Some(m) => model_to_step_result(m),
        None => StepResult {
            id: None,
            result_id: result.id,
            step_id: step.id,
            status: StepResultStatus::default(),
            bug_url: String::new(),
        },
    })
}

/// Share of the run's cases with a completed latest result in the
/// environment. Cases whose latest result there is skipped do not count
/// toward the total.
pub async fn completion_for<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    environment_id: Uuid,
) -> AppResult<f64> {
    let rcv_ids: Vec<Uuid> = runs::case_versions(db, run_id)
        .await?
        .into_iter()
        .map(|m| m.id)
        .collect();
    let latest = results::latest_in_environment(db, rcv_ids.clone(), environment_id).await?;
    Ok(completion(&rcv_ids, &latest))
}

fn completion(rcv_ids: &[Uuid], latest: &[result::Model]) -> f64 {
    let mut completed = BTreeSet::new();
    let mut skipped = BTreeSet::new();
    for r in latest {
        match ResultStatus::parse(&r.status) {
            Some(s) if s.is_completed() => {
                completed.insert(r.runcaseversion_id);
            }
            Some(ResultStatus::Skipped) => {
                skipped.insert(r.runcaseversion_id);
            }
            _ => {}
        }
    }

    let skipped = skipped.difference(&completed).count();
    let total = rcv_ids.len().saturating_sub(skipped);
    if total == 0 {
        return 0.0;
    }
    completed.len() as f64 / total as f64
}

/// Suites of the run that contain the case, in run order.
pub async fn suites_for<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    case_id: Uuid,
) -> AppResult<Vec<SuiteRef>> {
    let containing: BTreeSet<Uuid> = library::suite_ids_containing_case(db, case_id)
        .await?
        .into_iter()
        .collect();
    let in_run: Vec<Uuid> = runs::suite_ids(db, run_id)
        .await?
        .into_iter()
        .filter(|id| containing.contains(id))
        .collect();

    let mut suites = library::suites_by_id(db, in_run.clone()).await?;
    Ok(in_run
        .into_iter()
        .filter_map(|id| suites.remove(&id))
        .map(|s| SuiteRef {
            id: s.id,
            name: s.name,
        })
        .collect())
}

/// The run, provided the environment and case are still part of it and the
/// run is active.
async fn available_run<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    environment_id: Uuid,
) -> AppResult<Run> {
    let run = runs::find(db, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Run".to_string()))?;
    if run.status != ObjectStatus::Active {
        return Err(AppError::InvalidInput(UNAVAILABLE.to_string()));
    }
    if !runs::environment_ids(db, run_id)
        .await?
        .contains(&environment_id)
    {
        return Err(AppError::InvalidInput(UNAVAILABLE.to_string()));
    }
    Ok(run)
}

async fn available_case<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    runcaseversion_id: Uuid,
) -> AppResult<run_case_version::Model> {
    match runs::find_case_version(db, runcaseversion_id).await? {
        Some(rcv) if rcv.run_id == run_id => Ok(rcv),
        _ => Err(AppError::InvalidInput(UNAVAILABLE.to_string())),
    }
}

async fn build_item<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    rcv: &run_case_version::Model,
    caseversion: crate::models::library::CaseVersion,
    tester_id: Uuid,
    environment_id: Uuid,
) -> AppResult<RunTestsItem> {
    let result = result_for(db, rcv.id, tester_id, environment_id).await?;
    let other_result = other_result_for(db, rcv.id, tester_id, environment_id).await?;

    let mut steps = Vec::with_capacity(caseversion.steps.len());
    for step in &caseversion.steps {
        let stepresult = stepresult_for(db, &result, step).await?;
        steps.push(StepWithResult {
            step: step.clone(),
            stepresult,
        });
    }

    let suites = suites_for(db, run_id, caseversion.case_id).await?;

    Ok(RunTestsItem {
        runcaseversion_id: rcv.id,
        order: rcv.order,
        caseversion,
        result,
        other_result,
        steps,
        suites,
    })
}

/// One page of the run-tests view for a tester in an environment.
pub async fn run_tests_page<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    environment_id: Uuid,
    tester_id: Uuid,
    params: &PaginationParams,
) -> AppResult<RunTestsPage> {
    available_run(db, run_id, environment_id).await?;

    let page = params.page();
    let limit = params.clamped_limit();
    let total = runs::count_case_versions(db, run_id).await?;
    let rcvs =
        runs::case_versions_page(db, run_id, params.offset(), limit as u64).await?;

    let mut caseversions: BTreeMap<Uuid, _> =
        library::case_versions_by_id(db, rcvs.iter().map(|r| r.caseversion_id).collect()).await?;

    let mut items = Vec::with_capacity(rcvs.len());
    for rcv in &rcvs {
        let Some(cv) = caseversions.remove(&rcv.caseversion_id) else {
            continue;
        };
        items.push(build_item(db, run_id, rcv, cv, tester_id, environment_id).await?);
    }

    Ok(RunTestsPage {
        run_id,
        environment_id,
        completion: completion_for(db, run_id, environment_id).await?,
        items,
        pagination: Pagination::new(page, limit, total),
    })
}

/// A single case of the run-tests view.
pub async fn run_tests_item<C: ConnectionTrait>(
    db: &C,
    run_id: Uuid,
    environment_id: Uuid,
    runcaseversion_id: Uuid,
    tester_id: Uuid,
) -> AppResult<RunTestsItem> {
    available_run(db, run_id, environment_id).await?;
    let rcv = available_case(db, run_id, runcaseversion_id).await?;
    let cv = library::find_case_version(db, rcv.caseversion_id)
        .await?
        .ok_or_else(|| AppError::InvalidInput(UNAVAILABLE.to_string()))?;
    build_item(db, run_id, &rcv, cv, tester_id, environment_id).await
}

/// Only http and https bug links are accepted.
fn validate_bug_url(bug: Option<&str>) -> Result<String, FormErrors> {
    let Some(bug) = bug.map(str::trim).filter(|b| !b.is_empty()) else {
        return Ok(String::new());
    };
    match reqwest::Url::parse(bug) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(bug.to_string()),
        _ => {
            let mut errors = FormErrors::new();
            errors.add("bug", "Enter a valid URL.");
            Err(errors)
        }
    }
}

/// Record a tester's action on a case and return the refreshed item.
///
/// Every action inserts a new result row that becomes the tester's latest
/// one. Failing or blocking with a step number also records a step result
/// against that step; an unknown step number is ignored.
pub async fn record_action(
    db: &DatabaseConnection,
    run_id: Uuid,
    environment_id: Uuid,
    runcaseversion_id: Uuid,
    tester_id: Uuid,
    action: ResultAction,
    request: ResultActionRequest,
) -> AppResult<RunTestsItem> {
    let bug_url = match action.step_status() {
        Some(_) => validate_bug_url(request.bug.as_deref())?,
        None => String::new(),
    };

    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            available_run(txn, run_id, environment_id).await?;
            let rcv = available_case(txn, run_id, runcaseversion_id).await?;

            let comment = match action {
                ResultAction::Start | ResultAction::Pass => String::new(),
                _ => request.comment.trim().to_string(),
            };

            let saved = results::insert_latest(
                txn,
                results::NewResult {
                    tester_id,
                    runcaseversion_id,
                    environment_id,
                    status: action.status(),
                    comment,
                    user_id: tester_id,
                },
            )
            .await?;

            if let (Some(step_status), Some(number)) = (action.step_status(), request.stepnumber) {
                match library::step_by_number(txn, rcv.caseversion_id, number).await? {
                    Some(step) => {
                        results::insert_step_result(txn, saved.id, step.id, step_status, &bug_url)
                            .await?;
                    }
                    None => debug!(
                        "Ignoring unknown step {} on caseversion {}",
                        number, rcv.caseversion_id
                    ),
                }
            }

            info!(
                "Tester {} marked runcaseversion {} {} in environment {}",
                tester_id,
                runcaseversion_id,
                action.status(),
                environment_id
            );
            Ok(())
        })
    })
    .await?;

    run_tests_item(db, run_id, environment_id, runcaseversion_id, tester_id).await
}

fn model_to_result(m: result::Model) -> TestResult {
    TestResult {
        id: Some(m.id),
        tester_id: m.tester_id,
        runcaseversion_id: m.runcaseversion_id,
        environment_id: m.environment_id,
        status: ResultStatus::parse(&m.status).unwrap_or_default(),
        comment: m.comment,
        is_latest: m.is_latest,
        modified_at: Some(m.modified_at),
    }
}

fn model_to_step_result(m: step_result::Model) -> StepResult {
    StepResult {
        id: Some(m.id),
        result_id: Some(m.result_id),
        step_id: m.step_id,
        status: StepResultStatus::parse(&m.status).unwrap_or_default(),
        bug_url: m.bug_url,
    }
}
