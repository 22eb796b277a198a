//! Database operations for products, product versions and environments.

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::{environment, product, product_version, product_version_environment};
use crate::error::{AppError, AppResult};
use crate::models::product::{Environment, Product, ProductVersion};

pub async fn create_product<C: ConnectionTrait>(
    db: &C,
    name: &str,
    description: &str,
) -> AppResult<Product> {
    let now = Utc::now();
    let model = product::ActiveModel {
        id: Set(Uuid::now_v7()),
        name: Set(name.to_string()),
        description: Set(description.to_string()),
        cc_version: Set(0),
        created_at: Set(now),
        modified_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(model_to_product(model))
}

pub async fn list_products<C: ConnectionTrait>(db: &C) -> AppResult<Vec<Product>> {
    Ok(product::Entity::find()
        .order_by_asc(product::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(model_to_product)
        .collect())
}

pub async fn find_product<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<Product>> {
    Ok(product::Entity::find_by_id(id)
        .one(db)
        .await?
        .map(model_to_product))
}

/// Add a version to a product. It sorts after the existing versions.
pub async fn create_version<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    version: &str,
    codename: &str,
    environment_ids: &[Uuid],
) -> AppResult<ProductVersion> {
    if find_product(db, product_id).await?.is_none() {
        return Err(AppError::NotFound("Product".to_string()));
    }
    for env_id in environment_ids {
        if environment::Entity::find_by_id(*env_id).one(db).await?.is_none() {
            return Err(AppError::InvalidInput(format!(
                "Unknown environment {}",
                env_id
            )));
        }
    }

    let order = product_version::Entity::find()
        .filter(product_version::Column::ProductId.eq(product_id))
        .count(db)
        .await? as i32;

    let id = Uuid::now_v7();
    product_version::ActiveModel {
        id: Set(id),
        product_id: Set(product_id),
        version: Set(version.to_string()),
        codename: Set(codename.to_string()),
        order: Set(order + 1),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;

    for env_id in environment_ids {
        product_version_environment::ActiveModel {
            id: Set(Uuid::now_v7()),
            productversion_id: Set(id),
            environment_id: Set(*env_id),
        }
        .insert(db)
        .await?;
    }

    find_version(db, id)
        .await?
        .ok_or_else(|| AppError::Database("Failed to fetch newly inserted version".to_string()))
}

/// Product versions, optionally limited to one product, in product then
/// version order.
pub async fn list_versions<C: ConnectionTrait>(
    db: &C,
    product_id: Option<Uuid>,
) -> AppResult<Vec<ProductVersion>> {
    let mut query = product_version::Entity::find();
    if let Some(pid) = product_id {
        query = query.filter(product_version::Column::ProductId.eq(pid));
    }
    let models = query
        .order_by_asc(product_version::Column::ProductId)
        .order_by_asc(product_version::Column::Order)
        .all(db)
        .await?;

    let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
    let mut envs = environments_by_version(db, ids).await?;

    Ok(models
        .into_iter()
        .map(|m| {
            let environments = envs.remove(&m.id).unwrap_or_default();
            model_to_version(m, environments)
        })
        .collect())
}

pub async fn find_version<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> AppResult<Option<ProductVersion>> {
    let Some(model) = product_version::Entity::find_by_id(id).one(db).await? else {
        return Ok(None);
    };
    let environments = version_environment_ids(db, id).await?;
    Ok(Some(model_to_version(model, environments)))
}

/// Human-readable "<product> <version>" label.
pub async fn version_label<C: ConnectionTrait>(db: &C, version: &ProductVersion) -> AppResult<String> {
    let product = find_product(db, version.product_id).await?;
    Ok(match product {
        Some(p) => format!("{} {}", p.name, version.version),
        None => version.version.clone(),
    })
}

pub async fn version_environment_ids<C: ConnectionTrait>(
    db: &C,
    productversion_id: Uuid,
) -> AppResult<Vec<Uuid>> {
    Ok(product_version_environment::Entity::find()
        .filter(product_version_environment::Column::ProductversionId.eq(productversion_id))
        .order_by_asc(product_version_environment::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.environment_id)
        .collect())
}

async fn environments_by_version<C: ConnectionTrait>(
    db: &C,
    version_ids: Vec<Uuid>,
) -> AppResult<BTreeMap<Uuid, Vec<Uuid>>> {
    let mut map: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    if version_ids.is_empty() {
        return Ok(map);
    }
    let rows = product_version_environment::Entity::find()
        .filter(product_version_environment::Column::ProductversionId.is_in(version_ids))
        .order_by_asc(product_version_environment::Column::Id)
        .all(db)
        .await?;
    for row in rows {
        map.entry(row.productversion_id)
            .or_default()
            .push(row.environment_id);
    }
    Ok(map)
}

pub async fn create_environment<C: ConnectionTrait>(db: &C, name: &str) -> AppResult<Environment> {
    let model = environment::ActiveModel {
        id: Set(Uuid::now_v7()),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await?;
    Ok(Environment {
        id: model.id,
        name: model.name,
    })
}

pub async fn list_environments<C: ConnectionTrait>(db: &C) -> AppResult<Vec<Environment>> {
    Ok(environment::Entity::find()
        .order_by_asc(environment::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(|m| Environment {
            id: m.id,
            name: m.name,
        })
        .collect())
}

pub async fn find_environment<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> AppResult<Option<Environment>> {
    Ok(environment::Entity::find_by_id(id)
        .one(db)
        .await?
        .map(|m| Environment {
            id: m.id,
            name: m.name,
        }))
}

fn model_to_product(m: product::Model) -> Product {
    Product {
        id: m.id,
        name: m.name,
        description: m.description,
        created_at: m.created_at,
    }
}

fn model_to_version(m: product_version::Model, environments: Vec<Uuid>) -> ProductVersion {
    ProductVersion {
        id: m.id,
        product_id: m.product_id,
        version: m.version,
        codename: m.codename,
        order: m.order,
        environments,
    }
}
