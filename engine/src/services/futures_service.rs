//! Futures strategy CRUD, including the best-effort position close on
//! deletion. Close failures never block the delete; they come back to the
//! caller as warnings.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::info;

use crate::exchange::{Market, StreamKind};
use crate::futures::entry::cancel_open_orders;
use crate::spot::placement::validate_fractions;
use crate::state::AppState;
use shared::entity::{futures_orders, futures_positions, futures_strategies};
use shared::num::{to_decimal, to_f64};
use shared::{
    Decomposition, FuturesStatus, MarginMode, PositionSide, PositionStatus,
};

pub struct NewFuturesStrategy {
    pub user_id: i64,
    pub symbol: String,
    pub side: PositionSide,
    pub base_price: f64,
    pub entry_offset_bps: f64,
    pub leverage: i32,
    pub quantity: f64,
    pub take_profit_rate: f64,
    pub stop_loss_rate: f64,
    pub margin_mode: MarginMode,
    pub decomposition: Decomposition,
    pub layer_fractions: Option<Vec<f64>>,
    pub layer_gaps_bps: Option<Vec<f64>>,
    pub auto_restart: bool,
}

pub async fn create_strategy(
    app: &Arc<AppState>,
    new: NewFuturesStrategy,
) -> Result<futures_strategies::Model> {
    if new.base_price <= 0.0 || new.quantity <= 0.0 {
        return Err(anyhow!("base price and quantity must be positive"));
    }
    if new.leverage < 1 {
        return Err(anyhow!("leverage must be at least 1"));
    }
    if new.take_profit_rate <= 0.0 {
        return Err(anyhow!("take-profit rate must be positive"));
    }
    if let Some(fractions) = &new.layer_fractions {
        validate_fractions(fractions)?;
    }

    let symbol = new.symbol.to_uppercase();
    let row = futures_strategies::ActiveModel {
        user_id: Set(new.user_id),
        symbol: Set(symbol.clone()),
        side: Set(new.side),
        base_price: Set(to_decimal(new.base_price)),
        entry_offset_bps: Set(to_decimal(new.entry_offset_bps)),
        leverage: Set(new.leverage),
        quantity: Set(to_decimal(new.quantity)),
        take_profit_rate: Set(to_decimal(new.take_profit_rate)),
        stop_loss_rate: Set(to_decimal(new.stop_loss_rate)),
        margin_mode: Set(new.margin_mode),
        decomposition: Set(new.decomposition),
        layer_fractions: Set(encode_json(new.layer_fractions)?),
        layer_gaps_bps: Set(encode_json(new.layer_gaps_bps)?),
        auto_restart: Set(new.auto_restart),
        status: Set(FuturesStatus::Waiting),
        enabled: Set(true),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
        ..Default::default()
    };
    let created = row.insert(&app.db).await.context("create futures strategy")?;

    app.feed.subscribe(StreamKind::MarkPrice, &symbol, created.id);
    Ok(created)
}

pub async fn set_enabled(app: &Arc<AppState>, strategy_id: u64, enabled: bool) -> Result<()> {
    let strategy = futures_strategies::Entity::find_by_id(strategy_id)
        .one(&app.db)
        .await?
        .ok_or_else(|| anyhow!("futures strategy {strategy_id} not found"))?;
    if strategy.deleted_at.is_some() {
        return Err(anyhow!("futures strategy {strategy_id} is deleted"));
    }

    let symbol = strategy.symbol.clone();
    let mut active: futures_strategies::ActiveModel = strategy.into();
    active.enabled = Set(enabled);
    active.updated_at = Set(Some(Utc::now()));
    active.update(&app.db).await?;

    if enabled {
        app.feed.subscribe(StreamKind::MarkPrice, &symbol, strategy_id);
    } else {
        app.feed.unsubscribe(StreamKind::MarkPrice, &symbol, strategy_id);
    }
    Ok(())
}

/// Soft-delete a strategy, cancelling its open orders and attempting to
/// close any open position. Returns the warnings collected along the way.
pub async fn delete_strategy(app: &Arc<AppState>, strategy_id: u64) -> Result<Vec<String>> {
    let strategy = futures_strategies::Entity::find_by_id(strategy_id)
        .one(&app.db)
        .await?
        .ok_or_else(|| anyhow!("futures strategy {strategy_id} not found"))?;

    let mut warnings = Vec::new();
    cancel_open_orders(app, strategy_id).await;

    if let Err(e) = close_open_position(app, &strategy).await {
        warnings.push(format!("position close failed: {e}"));
    }

    let symbol = strategy.symbol.clone();
    let status = strategy.status;
    let mut active: futures_strategies::ActiveModel = strategy.into();
    if !status.is_terminal() {
        active.status = Set(FuturesStatus::Cancelled);
        active.fail_reason = Set(Some("deleted by user".to_string()));
        active.completed_at = Set(Some(Utc::now()));
    }
    active.enabled = Set(false);
    active.deleted_at = Set(Some(Utc::now()));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&app.db).await?;

    app.feed.unsubscribe(StreamKind::MarkPrice, &symbol, strategy_id);
    Ok(warnings)
}

/// Close the open position with a marketable limit order at the current
/// price and record the row as closed.
async fn close_open_position(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
) -> Result<()> {
    let Some(position) = futures_positions::Entity::find()
        .filter(futures_positions::Column::StrategyId.eq(strategy.id))
        .filter(futures_positions::Column::Status.eq(PositionStatus::Open))
        .one(&app.db)
        .await?
    else {
        return Ok(());
    };

    let price = app
        .exchange
        .get_price(Market::Futures, &strategy.symbol)
        .await?;
    app.exchange
        .place_limit_order(
            Market::Futures,
            &strategy.symbol,
            strategy.side.exit_order_side(),
            price,
            to_f64(&position.quantity),
        )
        .await?;
    info!(
        strategy_id = strategy.id,
        price, "close order placed for deleted strategy"
    );

    let mut active: futures_positions::ActiveModel = position.into();
    active.status = Set(PositionStatus::Closed);
    active.closed_at = Set(Some(Utc::now()));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&app.db).await?;
    Ok(())
}

pub async fn list_strategies(
    app: &Arc<AppState>,
    user_id: i64,
) -> Result<Vec<futures_strategies::Model>> {
    Ok(futures_strategies::Entity::find()
        .filter(futures_strategies::Column::UserId.eq(user_id))
        .filter(futures_strategies::Column::DeletedAt.is_null())
        .order_by_desc(futures_strategies::Column::Id)
        .all(&app.db)
        .await?)
}

pub async fn list_positions(
    app: &Arc<AppState>,
    user_id: i64,
) -> Result<Vec<futures_positions::Model>> {
    let strategy_ids: Vec<u64> = futures_strategies::Entity::find()
        .filter(futures_strategies::Column::UserId.eq(user_id))
        .all(&app.db)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    Ok(futures_positions::Entity::find()
        .filter(futures_positions::Column::StrategyId.is_in(strategy_ids))
        .order_by_desc(futures_positions::Column::Id)
        .all(&app.db)
        .await?)
}

pub async fn list_orders(
    app: &Arc<AppState>,
    strategy_id: u64,
) -> Result<Vec<futures_orders::Model>> {
    Ok(futures_orders::Entity::find()
        .filter(futures_orders::Column::StrategyId.eq(strategy_id))
        .order_by_desc(futures_orders::Column::Id)
        .all(&app.db)
        .await?)
}

fn encode_json<T: serde::Serialize>(value: Option<T>) -> Result<Option<String>> {
    value
        .map(|v| serde_json::to_string(&v).context("encode layer configuration"))
        .transpose()
}
