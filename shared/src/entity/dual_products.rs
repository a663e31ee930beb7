//! `SeaORM` Entity for synced dual-investment product listings.

use crate::enums::{DualDirection, ProductStatus};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "dual_products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: u64,
    pub symbol: String,
    pub direction: DualDirection,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub strike_price: Decimal,
    /// Annualized yield in percent.
    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub apy: Decimal,
    pub duration_days: i32,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub min_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub max_amount: Decimal,
    pub settlement_time: DateTimeUtc,
    pub status: ProductStatus,
    pub created_at: Option<DateTimeUtc>,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::dual_orders::Entity")]
    DualOrders,
}

impl Related<super::dual_orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DualOrders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
