//! Futures entry execution: venue setup, layered entry placement, and the
//! cancellation path for setup failures.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{error, info, warn};

use crate::exchange::{Market, SymbolRules};
use crate::futures::{math, monitor};
use crate::spot::placement::{parse_json_list, OrderLevel};
use crate::state::AppState;
use shared::entity::{futures_orders, futures_strategies};
use shared::num::{to_decimal, to_f64};
use shared::{Decomposition, FuturesEvent, FuturesStatus, OrderPurpose, PositionSide, VenueOrderStatus};

/// Drive one triggered strategy through entry placement and monitoring.
///
/// Business failures (venue rejection, empty book, nothing placed) cancel
/// the strategy with a recorded reason and return `Ok`; only unexpected
/// persistence errors propagate.
pub async fn execute_entry(app: &Arc<AppState>, strategy_id: u64) -> Result<()> {
    let strategy = futures_strategies::Entity::find_by_id(strategy_id)
        .one(&app.db)
        .await?
        .ok_or_else(|| anyhow!("strategy {strategy_id} disappeared after trigger"))?;
    if strategy.status != FuturesStatus::Triggered {
        return Ok(());
    }

    match place_entry_orders(app, &strategy).await {
        Ok(placed) if placed > 0 => {
            info!(
                strategy_id,
                symbol = %strategy.symbol,
                orders = placed,
                "entry orders placed, monitoring fills"
            );
            monitor::monitor_entry(app, strategy_id).await
        }
        Ok(_) => {
            cancel_strategy(app, strategy_id, "no entry order could be placed").await;
            Ok(())
        }
        Err(e) => {
            cancel_strategy(app, strategy_id, &e.to_string()).await;
            Ok(())
        }
    }
}

async fn place_entry_orders(app: &Arc<AppState>, strategy: &futures_strategies::Model) -> Result<usize> {
    app.exchange
        .set_leverage(&strategy.symbol, strategy.leverage as u32)
        .await
        .context("set leverage")?;
    app.exchange
        .set_margin_mode(&strategy.symbol, strategy.margin_mode)
        .await
        .context("set margin mode")?;

    let rules = app
        .exchange
        .get_symbol_rules(Market::Futures, &strategy.symbol)
        .await
        .context("fetch symbol rules")?;
    let depth = app
        .exchange
        .get_depth(Market::Futures, &strategy.symbol, 20)
        .await
        .context("fetch order book depth")?;

    let anchor = math::entry_price_from_depth(
        &depth,
        strategy.side,
        to_f64(&strategy.entry_offset_bps),
    )
    .ok_or_else(|| anyhow!("order book is empty"))?;

    let layers = entry_layers_for(app, strategy, anchor, rules)?;
    let order_side = strategy.side.entry_order_side();

    let mut placed = 0usize;
    for (index, layer) in layers.iter().enumerate() {
        let result = app
            .exchange
            .place_limit_order(
                Market::Futures,
                &strategy.symbol,
                order_side,
                layer.price,
                layer.quantity,
            )
            .await;
        match result {
            Ok(exchange_order_id) => {
                persist_entry_order(app, strategy, layer, exchange_order_id).await?;
                placed += 1;
            }
            // First layer failing abandons the whole attempt; a later layer
            // failing keeps the partial ladder.
            Err(e) if index == 0 => return Err(anyhow!("first entry layer rejected: {e}")),
            Err(e) => {
                warn!(
                    strategy_id = strategy.id,
                    layer = index,
                    error = %e,
                    "entry layer rejected, continuing with remainder"
                );
            }
        }
    }
    Ok(placed)
}

fn entry_layers_for(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
    anchor: f64,
    rules: SymbolRules,
) -> Result<Vec<OrderLevel>> {
    let notional = to_f64(&strategy.quantity);
    match strategy.decomposition {
        Decomposition::Iceberg => {
            let fractions = parse_json_list(strategy.layer_fractions.as_ref())?
                .unwrap_or_else(|| app.config.iceberg_fractions.clone());
            let gaps = parse_json_list(strategy.layer_gaps_bps.as_ref())?
                .unwrap_or_else(|| default_gaps(app, strategy.side));
            math::entry_layers(anchor, notional, strategy.side, &fractions, &gaps, rules)
        }
        _ => math::entry_layers(anchor, notional, strategy.side, &[1.0], &[0.0], rules),
    }
}

fn default_gaps(app: &Arc<AppState>, side: PositionSide) -> Vec<f64> {
    match side {
        PositionSide::Long => app.config.long_entry_gaps_bps.clone(),
        PositionSide::Short => app.config.short_entry_gaps_bps.clone(),
    }
}

async fn persist_entry_order(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
    layer: &OrderLevel,
    exchange_order_id: String,
) -> Result<()> {
    let row = futures_orders::ActiveModel {
        strategy_id: Set(strategy.id),
        purpose: Set(OrderPurpose::Entry),
        symbol: Set(strategy.symbol.clone()),
        side: Set(strategy.side.entry_order_side()),
        price: Set(to_decimal(layer.price)),
        quantity: Set(to_decimal(layer.quantity)),
        executed_qty: Set(to_decimal(0.0)),
        avg_price: Set(to_decimal(0.0)),
        commission: Set(to_decimal(0.0)),
        exchange_order_id: Set(exchange_order_id.clone()),
        status: Set(VenueOrderStatus::New),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
        ..Default::default()
    };
    if let Err(e) = row.insert(&app.db).await {
        // Order exists on the venue but not locally: compensate by cancel.
        if let Err(cancel_err) = app
            .exchange
            .cancel_order(Market::Futures, &strategy.symbol, &exchange_order_id)
            .await
        {
            error!(
                strategy_id = strategy.id,
                order_id = %exchange_order_id,
                error = %cancel_err,
                "failed to cancel unpersisted entry order"
            );
        }
        return Err(e).context("persist entry order");
    }
    Ok(())
}

/// Cancel a strategy through the state machine with a recorded reason.
/// Invalid transitions (already terminal) are silently skipped.
pub async fn cancel_strategy(app: &Arc<AppState>, strategy_id: u64, reason: &str) {
    if let Err(e) = try_cancel(app, strategy_id, reason).await {
        error!(strategy_id, error = %e, "failed to cancel strategy");
    }
}

async fn try_cancel(app: &Arc<AppState>, strategy_id: u64, reason: &str) -> Result<()> {
    let txn = app.db.begin().await?;
    let Some(current) = futures_strategies::Entity::find_by_id(strategy_id)
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        return Ok(());
    };
    let Some(next) = current.status.next(FuturesEvent::Cancel) else {
        txn.rollback().await?;
        return Ok(());
    };

    warn!(strategy_id, reason, "cancelling futures strategy");
    let mut active: futures_strategies::ActiveModel = current.into();
    active.status = Set(next);
    active.fail_reason = Set(Some(reason.to_string()));
    active.completed_at = Set(Some(Utc::now()));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&txn).await?;
    txn.commit().await?;
    Ok(())
}

/// Cancel every non-terminal exchange order belonging to a strategy.
/// Best effort; failures are logged and the reconciliation loop retries.
pub async fn cancel_open_orders(app: &Arc<AppState>, strategy_id: u64) {
    let open = futures_orders::Entity::find()
        .filter(futures_orders::Column::StrategyId.eq(strategy_id))
        .filter(futures_orders::Column::Status.is_in([
            VenueOrderStatus::New,
            VenueOrderStatus::PartiallyFilled,
        ]))
        .all(&app.db)
        .await;

    let open = match open {
        Ok(rows) => rows,
        Err(e) => {
            error!(strategy_id, error = %e, "failed to load open orders for cancel");
            return;
        }
    };

    for order in open {
        if let Err(e) = app
            .exchange
            .cancel_order(Market::Futures, &order.symbol, &order.exchange_order_id)
            .await
        {
            warn!(
                strategy_id,
                order_id = %order.exchange_order_id,
                error = %e,
                "failed to cancel open order"
            );
            continue;
        }
        let mut active: futures_orders::ActiveModel = order.into();
        active.status = Set(VenueOrderStatus::Cancelled);
        active.updated_at = Set(Some(Utc::now()));
        if let Err(e) = active.update(&app.db).await {
            error!(strategy_id, error = %e, "failed to record order cancellation");
        }
    }
}
