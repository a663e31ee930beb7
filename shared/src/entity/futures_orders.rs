//! `SeaORM` Entity for exchange orders owned by a futures strategy.

use crate::enums::{OrderPurpose, OrderSide, VenueOrderStatus};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "futures_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: u64,
    pub strategy_id: u64,
    pub purpose: OrderPurpose,
    pub symbol: String,
    pub side: OrderSide,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub executed_qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub avg_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub commission: Decimal,
    pub exchange_order_id: String,
    pub status: VenueOrderStatus,
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
