//! Dual-investment strategy CRUD. The scheduler loops pick strategies up
//! directly from the database, so there is no feed registration here.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};

use crate::state::AppState;
use shared::entity::{dual_orders, dual_strategies};
use shared::num::to_decimal;
use shared::{DirectionPreference, DualStrategyKind, DualStrategyStatus, TriggerKind};

pub struct NewDualStrategy {
    pub user_id: i64,
    pub symbol: String,
    pub kind: DualStrategyKind,
    pub direction: DirectionPreference,
    pub min_apy: f64,
    pub max_apy: f64,
    pub min_duration_days: i32,
    pub max_duration_days: i32,
    pub max_strike_offset_pct: f64,
    pub per_order_amount: f64,
    pub total_investment_limit: f64,
    pub ladder_steps: Option<i32>,
    pub ladder_base_price: Option<f64>,
    pub ladder_step_pct: Option<f64>,
    pub trigger_price: Option<f64>,
    pub trigger_kind: Option<TriggerKind>,
}

pub async fn create_strategy(
    app: &Arc<AppState>,
    new: NewDualStrategy,
) -> Result<dual_strategies::Model> {
    if new.per_order_amount <= 0.0 || new.total_investment_limit <= 0.0 {
        return Err(anyhow!("investment amounts must be positive"));
    }
    if new.min_apy > new.max_apy || new.min_duration_days > new.max_duration_days {
        return Err(anyhow!("inverted APY or duration range"));
    }
    if new.kind == DualStrategyKind::PriceTrigger
        && (new.trigger_price.is_none() || new.trigger_kind.is_none())
    {
        return Err(anyhow!("price-trigger strategy needs a trigger price and kind"));
    }

    let row = dual_strategies::ActiveModel {
        user_id: Set(new.user_id),
        symbol: Set(new.symbol.to_uppercase()),
        kind: Set(new.kind),
        direction: Set(new.direction),
        min_apy: Set(to_decimal(new.min_apy)),
        max_apy: Set(to_decimal(new.max_apy)),
        min_duration_days: Set(new.min_duration_days),
        max_duration_days: Set(new.max_duration_days),
        max_strike_offset_pct: Set(to_decimal(new.max_strike_offset_pct)),
        per_order_amount: Set(to_decimal(new.per_order_amount)),
        total_investment_limit: Set(to_decimal(new.total_investment_limit)),
        current_invested: Set(to_decimal(0.0)),
        ladder_steps: Set(new.ladder_steps),
        ladder_base_price: Set(new.ladder_base_price.map(to_decimal)),
        ladder_step_pct: Set(new.ladder_step_pct.map(to_decimal)),
        trigger_price: Set(new.trigger_price.map(to_decimal)),
        trigger_kind: Set(new.trigger_kind),
        status: Set(DualStrategyStatus::Active),
        enabled: Set(true),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
        ..Default::default()
    };
    row.insert(&app.db).await.context("create dual strategy")
}

pub async fn set_enabled(app: &Arc<AppState>, strategy_id: u64, enabled: bool) -> Result<()> {
    let strategy = dual_strategies::Entity::find_by_id(strategy_id)
        .one(&app.db)
        .await?
        .ok_or_else(|| anyhow!("dual strategy {strategy_id} not found"))?;
    if strategy.deleted_at.is_some() {
        return Err(anyhow!("dual strategy {strategy_id} is deleted"));
    }

    let mut active: dual_strategies::ActiveModel = strategy.into();
    active.enabled = Set(enabled);
    active.updated_at = Set(Some(Utc::now()));
    active.update(&app.db).await?;
    Ok(())
}

pub async fn delete_strategy(app: &Arc<AppState>, strategy_id: u64) -> Result<()> {
    let strategy = dual_strategies::Entity::find_by_id(strategy_id)
        .one(&app.db)
        .await?
        .ok_or_else(|| anyhow!("dual strategy {strategy_id} not found"))?;

    let mut active: dual_strategies::ActiveModel = strategy.into();
    active.enabled = Set(false);
    active.deleted_at = Set(Some(Utc::now()));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&app.db).await?;
    Ok(())
}

pub async fn list_strategies(
    app: &Arc<AppState>,
    user_id: i64,
) -> Result<Vec<dual_strategies::Model>> {
    Ok(dual_strategies::Entity::find()
        .filter(dual_strategies::Column::UserId.eq(user_id))
        .filter(dual_strategies::Column::DeletedAt.is_null())
        .order_by_desc(dual_strategies::Column::Id)
        .all(&app.db)
        .await?)
}

pub async fn list_orders(app: &Arc<AppState>, user_id: i64) -> Result<Vec<dual_orders::Model>> {
    Ok(dual_orders::Entity::find()
        .filter(dual_orders::Column::UserId.eq(user_id))
        .order_by_desc(dual_orders::Column::Id)
        .all(&app.db)
        .await?)
}
