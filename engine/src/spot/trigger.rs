//! Spot trigger evaluation and order batch execution.
//!
//! Ticks arrive from the price feed; matching strategies are executed on
//! spawned tasks so the feed never waits on exchange I/O. Two guards keep a
//! strategy to one batch: a flight permit held for the whole execution, and
//! the `pending_batch` flag claimed with a guarded UPDATE so only one
//! claimant ever sees a row change.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tracing::{debug, error, info, warn};

use crate::exchange::{Market, PriceTick};
use crate::spot::placement::{
    cancel_batch, compute_levels, parse_json_list, place_batch, PlacedOrder,
};
use crate::state::AppState;
use shared::entity::{orders, strategies};
use shared::num::{to_decimal, to_f64};
use shared::{Decomposition, OrderSide, SpotOrderStatus};

/// SELL fires at or above the trigger price, BUY at or below it.
pub fn should_fire(side: OrderSide, trigger_price: f64, price: f64) -> bool {
    match side {
        OrderSide::Sell => price >= trigger_price,
        OrderSide::Buy => price <= trigger_price,
    }
}

/// Scan a symbol's armed strategies against one tick and dispatch executions.
pub async fn handle_tick(app: &Arc<AppState>, tick: &PriceTick) {
    let armed = strategies::Entity::find()
        .filter(strategies::Column::Symbol.eq(tick.symbol.clone()))
        .filter(strategies::Column::Enabled.eq(true))
        .filter(strategies::Column::PendingBatch.eq(false))
        .filter(strategies::Column::DeletedAt.is_null())
        .all(&app.db)
        .await;

    let armed = match armed {
        Ok(rows) => rows,
        Err(e) => {
            warn!(symbol = %tick.symbol, error = %e, "failed to load spot strategies");
            return;
        }
    };

    for strategy in armed {
        app.prices
            .update(&tick.symbol, strategy.user_id, tick.price, tick.timestamp)
            .await;
        if !should_fire(strategy.side, to_f64(&strategy.price), tick.price) {
            continue;
        }
        let Some(permit) = app.flights.try_acquire(strategy.id) else {
            debug!(strategy_id = strategy.id, "execution already in flight, skipping tick");
            continue;
        };
        let app = app.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let id = strategy.id;
            if let Err(e) = execute_strategy(&app, strategy).await {
                error!(strategy_id = id, error = %e, "spot strategy execution failed");
            }
        });
    }
}

/// Claim the strategy and place its order batch.
///
/// The claim flips `pending_batch` with a guarded UPDATE; losing the race is
/// a silent no-op. Any failure after the claim resets the flag so the
/// strategy can retrigger.
pub async fn execute_strategy(app: &Arc<AppState>, strategy: strategies::Model) -> Result<()> {
    if !claim_strategy(app, strategy.id).await? {
        debug!(strategy_id = strategy.id, "lost trigger race, skipping");
        return Ok(());
    }

    match place_and_persist(app, &strategy).await {
        Ok(count) => {
            info!(
                strategy_id = strategy.id,
                symbol = %strategy.symbol,
                orders = count,
                "spot order batch placed"
            );
            Ok(())
        }
        Err(e) => {
            // Leave the strategy retriggerable.
            release_strategy(app, strategy.id).await;
            Err(e)
        }
    }
}

/// Atomically set `pending_batch`. The filter carries the arming conditions,
/// so exactly one of any number of concurrent claimants changes the row;
/// everyone else sees zero rows affected and backs off.
async fn claim_strategy(app: &Arc<AppState>, strategy_id: u64) -> Result<bool> {
    let claimed = strategies::Entity::update_many()
        .col_expr(strategies::Column::PendingBatch, Expr::value(true))
        .col_expr(strategies::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(strategies::Column::Id.eq(strategy_id))
        .filter(strategies::Column::Enabled.eq(true))
        .filter(strategies::Column::PendingBatch.eq(false))
        .filter(strategies::Column::DeletedAt.is_null())
        .exec(&app.db)
        .await
        .context("claim strategy for execution")?;
    Ok(claimed.rows_affected == 1)
}

async fn release_strategy(app: &Arc<AppState>, strategy_id: u64) {
    let result = strategies::Entity::update_many()
        .col_expr(strategies::Column::PendingBatch, Expr::value(false))
        .col_expr(strategies::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(strategies::Column::Id.eq(strategy_id))
        .exec(&app.db)
        .await;
    if let Err(e) = result {
        error!(strategy_id, error = %e, "failed to clear pending batch flag");
    }
}

async fn place_and_persist(app: &Arc<AppState>, strategy: &strategies::Model) -> Result<usize> {
    let rules = app
        .exchange
        .get_symbol_rules(Market::Spot, &strategy.symbol)
        .await
        .context("fetch symbol rules")?;

    let depth = if strategy.decomposition == Decomposition::Custom {
        Some(
            app.exchange
                .get_depth(Market::Spot, &strategy.symbol, 20)
                .await
                .context("fetch order book depth")?,
        )
    } else {
        None
    };

    let levels = compute_levels(
        strategy.side,
        strategy.decomposition,
        to_f64(&strategy.price),
        to_f64(&strategy.total_quantity),
        parse_json_list(strategy.layer_fractions.as_ref())?,
        parse_json_list(strategy.layer_gaps_bps.as_ref())?,
        parse_json_list(strategy.depth_anchors.as_ref())?,
        depth.as_ref(),
        rules,
        &app.config.iceberg_fractions,
        &app.config.spot_iceberg_gaps_bps,
    )?;

    let placed = place_batch(
        app.exchange.as_ref(),
        Market::Spot,
        &strategy.symbol,
        strategy.side,
        &levels,
    )
    .await?;

    if let Err(e) = persist_batch(app, strategy, &placed).await {
        // Orders exist on the exchange but not locally. Compensate by
        // cancelling the whole batch, then report the failure.
        cancel_batch(app.exchange.as_ref(), Market::Spot, &strategy.symbol, &placed).await;
        mark_batch_cancelled(app, strategy.id, &placed).await;
        return Err(e.context("persist order batch"));
    }

    Ok(placed.len())
}

async fn persist_batch(
    app: &Arc<AppState>,
    strategy: &strategies::Model,
    placed: &[PlacedOrder],
) -> Result<()> {
    let cancel_after =
        Utc::now() + ChronoDuration::seconds(app.config.spot_order_ttl_secs as i64);

    for order in placed {
        let row = orders::ActiveModel {
            strategy_id: Set(strategy.id),
            user_id: Set(strategy.user_id),
            symbol: Set(strategy.symbol.clone()),
            side: Set(strategy.side),
            price: Set(to_decimal(order.level.price)),
            quantity: Set(to_decimal(order.level.quantity)),
            exchange_order_id: Set(order.exchange_order_id.clone()),
            status: Set(SpotOrderStatus::Pending),
            cancel_after: Set(Some(cancel_after)),
            created_at: Set(Some(Utc::now())),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        row.insert(&app.db).await?;
    }
    Ok(())
}

/// Mark any rows persisted before a mid-batch failure as cancelled so the
/// local books match the compensating exchange cancels.
async fn mark_batch_cancelled(app: &Arc<AppState>, strategy_id: u64, placed: &[PlacedOrder]) {
    let ids: Vec<String> = placed
        .iter()
        .map(|p| p.exchange_order_id.clone())
        .collect();
    let result = orders::Entity::update_many()
        .col_expr(orders::Column::Status, Expr::value(SpotOrderStatus::Cancelled))
        .col_expr(orders::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(orders::Column::StrategyId.eq(strategy_id))
        .filter(orders::Column::ExchangeOrderId.is_in(ids))
        .exec(&app.db)
        .await;
    if let Err(e) = result {
        error!(strategy_id, error = %e, "failed to mark rolled-back orders cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sell_fires_at_or_above_trigger() {
        assert!(should_fire(OrderSide::Sell, 50_000.0, 50_001.0));
        assert!(should_fire(OrderSide::Sell, 50_000.0, 50_000.0));
        assert!(!should_fire(OrderSide::Sell, 50_000.0, 49_999.0));
    }

    #[test]
    fn buy_fires_at_or_below_trigger() {
        assert!(should_fire(OrderSide::Buy, 50_000.0, 49_999.0));
        assert!(should_fire(OrderSide::Buy, 50_000.0, 50_000.0));
        assert!(!should_fire(OrderSide::Buy, 50_000.0, 50_001.0));
    }
}
