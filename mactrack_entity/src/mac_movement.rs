//! Append-only history of port moves.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "mac_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub mac: String,
    pub from_device: String,
    pub from_if: String,
    pub to_device: String,
    pub to_if: String,
    pub moved_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
