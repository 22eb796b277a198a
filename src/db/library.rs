//! Database operations for test cases, case versions, steps and suites.

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::{case, case_step, case_version, product, product_version, suite, suite_case};
use crate::error::{AppError, AppResult};
use crate::models::ObjectStatus;
use crate::models::library::{CaseStep, CaseVersion, NewStep, Suite};

/// Create a case for a product; versions are added separately.
pub async fn create_case<C: ConnectionTrait>(db: &C, product_id: Uuid) -> AppResult<Uuid> {
    if product::Entity::find_by_id(product_id).one(db).await?.is_none() {
        return Err(AppError::NotFound("Product".to_string()));
    }
    let id = Uuid::now_v7();
    case::ActiveModel {
        id: Set(id),
        product_id: Set(product_id),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;
    Ok(id)
}

/// Add the version of a case for one product version, with numbered steps.
pub async fn create_case_version<C: ConnectionTrait>(
    db: &C,
    case_id: Uuid,
    productversion_id: Uuid,
    name: &str,
    description: &str,
    status: ObjectStatus,
    steps: &[NewStep],
) -> AppResult<CaseVersion> {
    let case = case::Entity::find_by_id(case_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Case".to_string()))?;
    let version = product_version::Entity::find_by_id(productversion_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product version".to_string()))?;
    if version.product_id != case.product_id {
        return Err(AppError::InvalidInput(
            "Product version belongs to a different product than the case".to_string(),
        ));
    }

    let existing = case_version::Entity::find()
        .filter(case_version::Column::CaseId.eq(case_id))
        .filter(case_version::Column::ProductversionId.eq(productversion_id))
        .count(db)
        .await?;
    if existing > 0 {
        return Err(AppError::InvalidInput(
            "This case already has a version for that product version".to_string(),
        ));
    }

    let now = Utc::now();
    let id = Uuid::now_v7();
    case_version::ActiveModel {
        id: Set(id),
        case_id: Set(case_id),
        productversion_id: Set(productversion_id),
        name: Set(name.to_string()),
        description: Set(description.to_string()),
        status: Set(status.as_str().to_string()),
        created_at: Set(now),
        modified_at: Set(now),
    }
    .insert(db)
    .await?;

    for (index, step) in steps.iter().enumerate() {
        case_step::ActiveModel {
            id: Set(Uuid::now_v7()),
            caseversion_id: Set(id),
            number: Set(index as i32 + 1),
            instruction: Set(step.instruction.clone()),
            expected: Set(step.expected.clone()),
        }
        .insert(db)
        .await?;
    }

    find_case_version(db, id)
        .await?
        .ok_or_else(|| AppError::Database("Failed to fetch newly inserted case version".to_string()))
}

pub async fn find_case_version<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> AppResult<Option<CaseVersion>> {
    let mut found = case_versions_by_id(db, vec![id]).await?;
    Ok(found.remove(&id))
}

/// Case versions with their steps, keyed by id.
pub async fn case_versions_by_id<C: ConnectionTrait>(
    db: &C,
    ids: Vec<Uuid>,
) -> AppResult<BTreeMap<Uuid, CaseVersion>> {
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let models = case_version::Entity::find()
        .filter(case_version::Column::Id.is_in(ids.clone()))
        .all(db)
        .await?;

    let mut steps: BTreeMap<Uuid, Vec<CaseStep>> = BTreeMap::new();
    for s in case_step::Entity::find()
        .filter(case_step::Column::CaseversionId.is_in(ids))
        .order_by_asc(case_step::Column::Number)
        .all(db)
        .await?
    {
        steps.entry(s.caseversion_id).or_default().push(model_to_step(s));
    }

    Ok(models
        .into_iter()
        .map(|m| {
            let cv_steps = steps.remove(&m.id).unwrap_or_default();
            (m.id, model_to_case_version(m, cv_steps))
        })
        .collect())
}

/// Step of a case version by its number.
pub async fn step_by_number<C: ConnectionTrait>(
    db: &C,
    caseversion_id: Uuid,
    number: i32,
) -> AppResult<Option<CaseStep>> {
    Ok(case_step::Entity::find()
        .filter(case_step::Column::CaseversionId.eq(caseversion_id))
        .filter(case_step::Column::Number.eq(number))
        .one(db)
        .await?
        .map(model_to_step))
}

/// The active version of a case for a product version.
pub async fn active_case_version<C: ConnectionTrait>(
    db: &C,
    case_id: Uuid,
    productversion_id: Uuid,
) -> AppResult<Option<Uuid>> {
    Ok(case_version::Entity::find()
        .filter(case_version::Column::CaseId.eq(case_id))
        .filter(case_version::Column::ProductversionId.eq(productversion_id))
        .filter(case_version::Column::Status.eq(ObjectStatus::Active.as_str()))
        .one(db)
        .await?
        .map(|m| m.id))
}

/// Create a suite holding the given cases in order.
pub async fn create_suite<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    name: &str,
    description: &str,
    status: ObjectStatus,
    case_ids: &[Uuid],
) -> AppResult<Suite> {
    if product::Entity::find_by_id(product_id).one(db).await?.is_none() {
        return Err(AppError::NotFound("Product".to_string()));
    }
    for case_id in case_ids {
        match case::Entity::find_by_id(*case_id).one(db).await? {
            Some(c) if c.product_id == product_id => {}
            Some(_) => {
                return Err(AppError::InvalidInput(format!(
                    "Case {} belongs to a different product",
                    case_id
                )));
            }
            None => return Err(AppError::NotFound("Case".to_string())),
        }
    }

    let id = Uuid::now_v7();
    suite::ActiveModel {
        id: Set(id),
        product_id: Set(product_id),
        name: Set(name.to_string()),
        description: Set(description.to_string()),
        status: Set(status.as_str().to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;

    for (index, case_id) in case_ids.iter().enumerate() {
        suite_case::ActiveModel {
            id: Set(Uuid::now_v7()),
            suite_id: Set(id),
            case_id: Set(*case_id),
            order: Set(index as i32 + 1),
        }
        .insert(db)
        .await?;
    }

    find_suite(db, id)
        .await?
        .ok_or_else(|| AppError::Database("Failed to fetch newly inserted suite".to_string()))
}

pub async fn find_suite<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<Suite>> {
    let Some(model) = suite::Entity::find_by_id(id).one(db).await? else {
        return Ok(None);
    };
    let cases = suite_case_ids(db, id).await?;
    Ok(Some(model_to_suite(model, cases)))
}

/// Suites ordered by name, optionally for one product.
pub async fn list_suites<C: ConnectionTrait>(
    db: &C,
    product_id: Option<Uuid>,
) -> AppResult<Vec<Suite>> {
    let mut query = suite::Entity::find();
    if let Some(pid) = product_id {
        query = query.filter(suite::Column::ProductId.eq(pid));
    }
    let models = query.order_by_asc(suite::Column::Name).all(db).await?;

    let mut out = Vec::with_capacity(models.len());
    for m in models {
        let cases = suite_case_ids(db, m.id).await?;
        out.push(model_to_suite(m, cases));
    }
    Ok(out)
}

/// Suite models by id, without their cases.
pub async fn suites_by_id<C: ConnectionTrait>(
    db: &C,
    ids: Vec<Uuid>,
) -> AppResult<BTreeMap<Uuid, suite::Model>> {
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(suite::Entity::find()
        .filter(suite::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect())
}

/// Case ids of a suite, in suite order.
pub async fn suite_case_ids<C: ConnectionTrait>(db: &C, suite_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(suite_case::Entity::find()
        .filter(suite_case::Column::SuiteId.eq(suite_id))
        .order_by_asc(suite_case::Column::Order)
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.case_id)
        .collect())
}

/// Ids of the suites that include a case.
pub async fn suite_ids_containing_case<C: ConnectionTrait>(
    db: &C,
    case_id: Uuid,
) -> AppResult<Vec<Uuid>> {
    Ok(suite_case::Entity::find()
        .filter(suite_case::Column::CaseId.eq(case_id))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.suite_id)
        .collect())
}

fn model_to_step(m: case_step::Model) -> CaseStep {
    CaseStep {
        id: m.id,
        number: m.number,
        instruction: m.instruction,
        expected: m.expected,
    }
}

fn model_to_case_version(m: case_version::Model, steps: Vec<CaseStep>) -> CaseVersion {
    CaseVersion {
        id: m.id,
        case_id: m.case_id,
        productversion_id: m.productversion_id,
        name: m.name,
        description: m.description,
        status: ObjectStatus::parse(&m.status).unwrap_or_default(),
        steps,
    }
}

fn model_to_suite(m: suite::Model, cases: Vec<Uuid>) -> Suite {
    Suite {
        id: m.id,
        product_id: m.product_id,
        name: m.name,
        description: m.description,
        status: ObjectStatus::parse(&m.status).unwrap_or_default(),
        cases,
    }
}
