//! Add and edit forms for test runs.

use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use tracing::info;
use uuid::Uuid;

use super::{FormErrors, INVALID_CHOICE, INVALID_DATE, NON_FIELD_ERRORS, REQUIRED, required_text};
use crate::db::{library, products, runs};
use crate::error::{AppError, AppResult};
use crate::models::ObjectStatus;
use crate::models::product::ProductVersion;
use crate::models::run::{Choice, Run, RunDetail, RunFormChoices, RunFormData};

pub const INVALID_SUITE: &str = "Not a valid suite for this run.";
pub const CONCURRENT_EDIT: &str = "Another user saved changes to this object in the meantime. \
Please review their changes and save yours again if they are still applicable.";
pub const END_BEFORE_START: &str = "Start date must be prior to end date.";

/// The error a save gets when the run changed since the form was loaded.
pub fn concurrent_edit() -> AppError {
    AppError::Validation(FormErrors::non_field(CONCURRENT_EDIT))
}

const DATE_FORMATS: [&str; 2] = ["%m/%d/%Y", "%Y-%m-%d"];

/// Parse a date as typed into the form; month and day may be unpadded.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// What to do with the run's suites on save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiteChange {
    /// Submitted values were not ids; leave the suites alone
    Keep,
    Replace(Vec<Uuid>),
}

/// Validated form values.
#[derive(Debug, Clone)]
pub struct CleanedRun {
    pub productversion_id: Uuid,
    pub name: String,
    pub description: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub build: Option<String>,
    pub is_series: bool,
    pub suites: SuiteChange,
}

/// Fields shared by both forms. `versions` are the allowed product
/// version choices.
async fn clean_common<C: ConnectionTrait>(
    db: &C,
    data: &RunFormData,
    versions: &[ProductVersion],
    errors: &mut FormErrors,
) -> AppResult<Option<CleanedRun>> {
    let productversion = match data.productversion.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("productversion", REQUIRED);
            None
        }
        Some(raw) => {
            let found = Uuid::parse_str(raw)
                .ok()
                .and_then(|id| versions.iter().find(|v| v.id == id));
            if found.is_none() {
                errors.add("productversion", INVALID_CHOICE);
            }
            found
        }
    };

    let name = required_text(errors, "name", data.name.as_deref()).map(str::to_string);
    let description = data
        .description
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .to_string();

    let start = match data.start.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("start", REQUIRED);
            None
        }
        Some(raw) => {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                errors.add("start", INVALID_DATE);
            }
            parsed
        }
    };

    let end = match data.end.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => match parse_date(raw) {
            Some(d) => Ok(Some(d)),
            None => {
                errors.add("end", INVALID_DATE);
                Err(())
            }
        },
    };

    if let (Some(start), Ok(Some(end))) = (start, end)
        && end < start
    {
        errors.add(NON_FIELD_ERRORS, END_BEFORE_START);
    }

    let suites = match productversion {
        Some(pv) => clean_suites(db, &data.suites, pv.product_id, errors).await?,
        None => SuiteChange::Keep,
    };

    let build = if data.is_series {
        None
    } else {
        data.build
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
    };

    match (productversion, name, start, end) {
        (Some(pv), Some(name), Some(start), Ok(end)) if errors.is_empty() => {
            Ok(Some(CleanedRun {
                productversion_id: pv.id,
                name,
                description,
                start,
                end,
                build,
                is_series: data.is_series,
                suites,
            }))
        }
        _ => Ok(None),
    }
}

/// Suite ids must belong to the run's product. Values that are not ids
/// come back from read-only rendering and keep the current suites.
async fn clean_suites<C: ConnectionTrait>(
    db: &C,
    values: &[String],
    product_id: Uuid,
    errors: &mut FormErrors,
) -> AppResult<SuiteChange> {
    let mut ids = Vec::with_capacity(values.len());
    for value in values {
        match Uuid::parse_str(value.trim()) {
            Ok(id) => ids.push(id),
            Err(_) => return Ok(SuiteChange::Keep),
        }
    }

    let found = library::suites_by_id(db, ids.clone()).await?;
    let valid = ids
        .iter()
        .all(|id| found.get(id).is_some_and(|s| s.product_id == product_id));
    if !valid {
        errors.add("suites", INVALID_SUITE);
    }

    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    Ok(SuiteChange::Replace(unique))
}

async fn version_choices<C: ConnectionTrait>(
    db: &C,
    versions: &[ProductVersion],
) -> AppResult<Vec<Choice>> {
    let product_names: std::collections::BTreeMap<Uuid, String> = products::list_products(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    Ok(versions
        .iter()
        .map(|v| Choice {
            id: v.id,
            label: match product_names.get(&v.product_id) {
                Some(name) => format!("{} {}", name, v.version),
                None => v.version.clone(),
            },
        })
        .collect())
}

async fn suite_choices<C: ConnectionTrait>(
    db: &C,
    product_id: Option<Uuid>,
) -> AppResult<Vec<Choice>> {
    Ok(library::list_suites(db, product_id)
        .await?
        .into_iter()
        .map(|s| Choice {
            id: s.id,
            label: s.name,
        })
        .collect())
}

/// Form creating a new run.
pub struct AddRunForm {
    data: RunFormData,
    user_id: Option<Uuid>,
}

impl AddRunForm {
    pub fn new(data: RunFormData, user_id: Option<Uuid>) -> Self {
        Self { data, user_id }
    }

    /// Every product version and suite is offered.
    pub async fn choices<C: ConnectionTrait>(db: &C) -> AppResult<RunFormChoices> {
        let versions = products::list_versions(db, None).await?;
        Ok(RunFormChoices {
            productversion: version_choices(db, &versions).await?,
            suites: suite_choices(db, None).await?,
            readonly: Vec::new(),
        })
    }

    pub async fn clean<C: ConnectionTrait>(&self, db: &C) -> AppResult<CleanedRun> {
        let versions = products::list_versions(db, None).await?;
        let mut errors = FormErrors::new();
        let cleaned = clean_common(db, &self.data, &versions, &mut errors).await?;
        match cleaned {
            Some(c) => Ok(c),
            None => Err(AppError::Validation(errors)),
        }
    }

    /// Create the run as a draft with the product version's environments.
    pub async fn save(self, db: &DatabaseConnection) -> AppResult<RunDetail> {
        let cleaned = self.clean(db).await?;
        let user_id = self.user_id;

        db.transaction::<_, RunDetail, AppError>(|txn| {
            Box::pin(async move {
                let run = runs::insert(
                    txn,
                    runs::NewRun {
                        productversion_id: cleaned.productversion_id,
                        name: cleaned.name,
                        description: cleaned.description,
                        status: ObjectStatus::Draft,
                        start: cleaned.start,
                        end: cleaned.end,
                        build: cleaned.build,
                        is_series: cleaned.is_series,
                        series_id: None,
                        created_by: user_id,
                    },
                )
                .await?;

                if let SuiteChange::Replace(suites) = &cleaned.suites {
                    runs::replace_suites(txn, run.id, suites).await?;
                }
                let envs = products::version_environment_ids(txn, run.productversion_id).await?;
                runs::set_environments(txn, run.id, &envs).await?;

                info!("Created run {} ('{}')", run.id, run.name);
                runs::detail(txn, run.id).await
            })
        })
        .await
        .map_err(AppError::from)
    }
}

/// Form editing an existing run.
pub struct EditRunForm {
    data: RunFormData,
    instance: Run,
    user_id: Option<Uuid>,
}

impl EditRunForm {
    pub fn new(data: RunFormData, instance: Run, user_id: Option<Uuid>) -> Self {
        Self {
            data,
            instance,
            user_id,
        }
    }

    /// Versions of the run's product; an active run is pinned to its own.
    async fn allowed_versions<C: ConnectionTrait>(
        db: &C,
        instance: &Run,
    ) -> AppResult<Vec<ProductVersion>> {
        let product_id = runs::product_id_for_version(db, instance.productversion_id).await?;
        let versions = products::list_versions(db, Some(product_id)).await?;
        if instance.status == ObjectStatus::Active {
            return Ok(versions
                .into_iter()
                .filter(|v| v.id == instance.productversion_id)
                .collect());
        }
        Ok(versions)
    }

    /// Fields an active run's form renders read-only.
    pub fn readonly_fields(instance: &Run) -> Vec<String> {
        if instance.status == ObjectStatus::Active {
            vec!["productversion".to_string(), "suites".to_string()]
        } else {
            Vec::new()
        }
    }

    pub async fn choices<C: ConnectionTrait>(db: &C, instance: &Run) -> AppResult<RunFormChoices> {
        let versions = Self::allowed_versions(db, instance).await?;
        let product_id = runs::product_id_for_version(db, instance.productversion_id).await?;
        Ok(RunFormChoices {
            productversion: version_choices(db, &versions).await?,
            suites: suite_choices(db, Some(product_id)).await?,
            readonly: Self::readonly_fields(instance),
        })
    }

    pub async fn clean<C: ConnectionTrait>(&self, db: &C) -> AppResult<CleanedRun> {
        let versions = Self::allowed_versions(db, &self.instance).await?;
        let mut errors = FormErrors::new();

        if self.data.cc_version != Some(self.instance.cc_version) {
            errors.add(NON_FIELD_ERRORS, CONCURRENT_EDIT);
        }

        let cleaned = clean_common(db, &self.data, &versions, &mut errors).await?;
        match cleaned {
            Some(mut c) if errors.is_empty() => {
                if self.instance.status == ObjectStatus::Active {
                    c.suites = SuiteChange::Keep;
                }
                Ok(c)
            }
            _ => Err(AppError::Validation(errors)),
        }
    }

    pub async fn save(self, db: &DatabaseConnection) -> AppResult<RunDetail> {
        let cleaned = self.clean(db).await?;
        let run_id = self.instance.id;
        let expected_cc = self.instance.cc_version;
        let user_id = self.user_id;

        db.transaction::<_, RunDetail, AppError>(|txn| {
            Box::pin(async move {
                runs::update(
                    txn,
                    run_id,
                    expected_cc,
                    runs::RunChanges {
                        productversion_id: cleaned.productversion_id,
                        name: cleaned.name,
                        description: cleaned.description,
                        start: cleaned.start,
                        end: cleaned.end,
                        build: cleaned.build,
                        is_series: cleaned.is_series,
                        modified_by: user_id,
                    },
                )
                .await?
                .ok_or_else(concurrent_edit)?;

                if let SuiteChange::Replace(suites) = &cleaned.suites {
                    runs::replace_suites(txn, run_id, suites).await?;
                }

                info!("Updated run {}", run_id);
                runs::detail(txn, run_id).await
            })
        })
        .await
        .map_err(AppError::from)
    }
}
