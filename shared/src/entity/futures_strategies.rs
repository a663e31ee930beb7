//! `SeaORM` Entity for leveraged directional strategies.

use crate::enums::{Decomposition, FuturesStatus, MarginMode, PositionSide};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "futures_strategies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: u64,
    pub user_id: i64,
    pub symbol: String,
    pub side: PositionSide,
    /// Trigger price: LONG fires at price <= this, SHORT at price >= this.
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub base_price: Decimal,
    /// Optional offset applied to the depth-derived entry price, in bps.
    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub entry_offset_bps: Decimal,
    pub leverage: i32,
    /// Notional quantity in quote units; per-order size is notional / price.
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub take_profit_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub stop_loss_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))", nullable)]
    pub take_profit_price: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))", nullable)]
    pub stop_loss_price: Option<Decimal>,
    pub margin_mode: MarginMode,
    pub decomposition: Decomposition,
    #[sea_orm(column_type = "Text", nullable)]
    pub layer_fractions: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub layer_gaps_bps: Option<String>,
    pub auto_restart: bool,
    pub status: FuturesStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub fail_reason: Option<String>,
    pub enabled: bool,
    pub deleted_at: Option<DateTimeUtc>,
    pub triggered_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub created_at: Option<DateTimeUtc>,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::futures_orders::Entity")]
    FuturesOrders,
    #[sea_orm(has_many = "super::futures_positions::Entity")]
    FuturesPositions,
}

impl Related<super::futures_orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FuturesOrders.def()
    }
}

impl Related<super::futures_positions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FuturesPositions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
