//! `SeaORM` Entity for spot trigger strategies.

use crate::enums::{Decomposition, OrderSide};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "strategies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: u64,
    pub user_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    /// Trigger price: SELL fires at price >= this, BUY at price <= this.
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub total_quantity: Decimal,
    pub decomposition: Decomposition,
    /// JSON array of per-layer quantity fractions, e.g. `[0.5,0.5]`.
    #[sea_orm(column_type = "Text", nullable)]
    pub layer_fractions: Option<String>,
    /// JSON array of per-layer gaps in basis points from the trigger price.
    #[sea_orm(column_type = "Text", nullable)]
    pub layer_gaps_bps: Option<String>,
    /// JSON array of 1-based order book depth indices (custom decomposition).
    #[sea_orm(column_type = "Text", nullable)]
    pub depth_anchors: Option<String>,
    pub enabled: bool,
    /// Single-flight guard: true while an order batch is in flight.
    pub pending_batch: bool,
    pub deleted_at: Option<DateTimeUtc>,
    pub created_at: Option<DateTimeUtc>,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::orders::Entity")]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
