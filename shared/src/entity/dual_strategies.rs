//! `SeaORM` Entity for dual-investment matcher strategies.

use crate::enums::{
    DirectionPreference, DualStrategyKind, DualStrategyStatus, TriggerKind,
};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "dual_strategies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: u64,
    pub user_id: i64,
    pub symbol: String,
    pub kind: DualStrategyKind,
    pub direction: DirectionPreference,
    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub min_apy: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub max_apy: Decimal,
    pub min_duration_days: i32,
    pub max_duration_days: i32,
    /// Maximum strike distance from the market price, in percent.
    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub max_strike_offset_pct: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub per_order_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub total_investment_limit: Decimal,
    /// Invariant: never exceeds total_investment_limit; updated in the same
    /// transaction as order creation and settlement.
    #[sea_orm(column_type = "Decimal(Some((20, 8)))")]
    pub current_invested: Decimal,
    pub ladder_steps: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))", nullable)]
    pub ladder_base_price: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((10, 4)))", nullable)]
    pub ladder_step_pct: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))", nullable)]
    pub trigger_price: Option<Decimal>,
    pub trigger_kind: Option<TriggerKind>,
    pub status: DualStrategyStatus,
    pub enabled: bool,
    pub deleted_at: Option<DateTimeUtc>,
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
