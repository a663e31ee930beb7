//! `SeaORM` Entity for materialized futures positions.

use crate::enums::{PositionSide, PositionStatus};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "futures_positions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: u64,
    pub strategy_id: u64,
    pub symbol: String,
    pub side: PositionSide,
    /// Quantity-weighted average across filled entry layers.
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub entry_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub realized_pnl: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub unrealized_pnl: Decimal,
    pub status: PositionStatus,
    pub opened_at: Option<DateTimeUtc>,
    pub closed_at: Option<DateTimeUtc>,
    pub created_at: Option<DateTimeUtc>,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::futures_strategies::Entity",
        from = "Column::StrategyId",
        to = "super::futures_strategies::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    FuturesStrategies,
}

impl Related<super::futures_strategies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FuturesStrategies.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
