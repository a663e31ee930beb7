//! `SeaORM` Entity for matched dual-investment orders.

use crate::enums::{DualDirection, DualOrderStatus};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "dual_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: u64,
    pub strategy_id: u64,
    pub product_id: u64,
    pub user_id: i64,
    pub symbol: String,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub strike_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub apy: Decimal,
    pub direction: DualDirection,
    pub duration_days: i32,
    pub settlement_time: DateTimeUtc,
    pub status: DualOrderStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub settle_asset: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))", nullable)]
    pub settle_amount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))", nullable)]
    pub pnl: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((10, 4)))", nullable)]
    pub pnl_pct: Option<Decimal>,
    /// Set once an auto-reinvest strategy has rolled this settlement over.
    pub reinvested: bool,
    pub settled_at: Option<DateTimeUtc>,
    pub created_at: Option<DateTimeUtc>,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::dual_strategies::Entity",
        from = "Column::StrategyId",
        to = "super::dual_strategies::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    DualStrategies,
    #[sea_orm(
        belongs_to = "super::dual_products::Entity",
        from = "Column::ProductId",
        to = "super::dual_products::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    DualProducts,
}

impl Related<super::dual_strategies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DualStrategies.def()
    }
}

impl Related<super::dual_products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DualProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
