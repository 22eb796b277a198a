//! Test run entity.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub productversion_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: String,
    pub start: Date,
    pub end: Option<Date>,
    pub build: Option<String>,
    pub is_series: bool,
    /// Parent series run, for runs cloned from a series
    pub series_id: Option<Uuid>,
    pub cc_version: i32,
    pub created_by: Option<Uuid>,
    pub modified_by: Option<Uuid>,
    pub created_at: DateTimeUtc,
    pub modified_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
