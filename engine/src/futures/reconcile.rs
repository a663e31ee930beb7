//! Futures exit reconciliation: poll take-profit and stop-loss orders,
//! realize P&L, close positions, complete strategies, re-place exit orders
//! a position is missing, and handle auto-restart.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::exchange::{Market, StreamKind};
use crate::futures::{entry, math, monitor};
use crate::state::AppState;
use shared::entity::{futures_orders, futures_positions, futures_strategies};
use shared::num::{to_decimal, to_f64};
use shared::{FuturesEvent, FuturesStatus, OrderPurpose, PositionStatus, VenueOrderStatus};

pub fn spawn_futures_reconcile_loop(app: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(app.config.futures_reconcile_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = reconcile_once(&app).await {
                warn!(error = %e, "futures reconciliation pass failed");
            }
        }
    })
}

pub async fn reconcile_once(app: &Arc<AppState>) -> Result<()> {
    refresh_exit_orders(app).await?;

    let opened = futures_strategies::Entity::find()
        .filter(futures_strategies::Column::Status.eq(FuturesStatus::PositionOpened))
        .filter(futures_strategies::Column::DeletedAt.is_null())
        .all(&app.db)
        .await?;

    for strategy in opened {
        if let Err(e) = settle_exits(app, &strategy).await {
            warn!(strategy_id = strategy.id, error = %e, "failed to settle exits");
        }
        if let Err(e) = restore_missing_exits(app, &strategy).await {
            warn!(strategy_id = strategy.id, error = %e, "failed to restore exit orders");
        }
    }
    Ok(())
}

/// Which exit legs an open position is missing. A leg is covered while it
/// has a live order, or once it has fills for the settle pass to act on.
fn missing_exit_legs(
    exits: &[(OrderPurpose, VenueOrderStatus, f64)],
    needs_stop: bool,
) -> (bool, bool) {
    let covered = |purpose: OrderPurpose| {
        exits
            .iter()
            .any(|(p, status, filled)| *p == purpose && (!status.is_terminal() || *filled > 0.0))
    };
    let need_tp = !covered(OrderPurpose::TakeProfit);
    let need_sl = needs_stop && !covered(OrderPurpose::StopLoss);
    (need_tp, need_sl)
}

/// Re-place exit orders for a position left unprotected, either because
/// placement failed after the position opened or because the process died in
/// between.
async fn restore_missing_exits(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
) -> Result<()> {
    // The entry monitor may still be placing exits under its flight permit.
    if app.flights.is_inflight(strategy.id) {
        return Ok(());
    }
    let Some(current) = futures_strategies::Entity::find_by_id(strategy.id)
        .one(&app.db)
        .await?
    else {
        return Ok(());
    };
    if current.status != FuturesStatus::PositionOpened {
        return Ok(());
    }

    let exits = futures_orders::Entity::find()
        .filter(futures_orders::Column::StrategyId.eq(current.id))
        .filter(futures_orders::Column::Purpose.is_in([
            OrderPurpose::TakeProfit,
            OrderPurpose::StopLoss,
        ]))
        .all(&app.db)
        .await?;
    let legs: Vec<(OrderPurpose, VenueOrderStatus, f64)> = exits
        .iter()
        .map(|o| (o.purpose, o.status, to_f64(&o.executed_qty)))
        .collect();

    let needs_stop = to_f64(&current.stop_loss_rate) > 0.0;
    let (need_tp, need_sl) = missing_exit_legs(&legs, needs_stop);
    if !need_tp && !need_sl {
        return Ok(());
    }

    let Some(position) = futures_positions::Entity::find()
        .filter(futures_positions::Column::StrategyId.eq(current.id))
        .filter(futures_positions::Column::Status.eq(PositionStatus::Open))
        .one(&app.db)
        .await?
    else {
        return Ok(());
    };
    let quantity = to_f64(&position.quantity);

    if need_tp {
        if let Some(take_profit) = current.take_profit_price.as_ref().map(to_f64) {
            warn!(
                strategy_id = current.id,
                "open position has no take-profit orders, re-placing"
            );
            monitor::place_take_profit_orders(app, &current, quantity, take_profit).await;
        }
    }
    if need_sl {
        if let Some(stop_price) = current.stop_loss_price.as_ref().map(to_f64) {
            warn!(
                strategy_id = current.id,
                "open position has no stop-loss order, re-placing"
            );
            monitor::place_stop_loss_order(app, &current, quantity, stop_price).await;
        }
    }
    Ok(())
}

/// Pull the venue status for every live exit order.
async fn refresh_exit_orders(app: &Arc<AppState>) -> Result<()> {
    let live = futures_orders::Entity::find()
        .filter(futures_orders::Column::Purpose.is_in([
            OrderPurpose::TakeProfit,
            OrderPurpose::StopLoss,
        ]))
        .filter(futures_orders::Column::Status.is_in([
            VenueOrderStatus::New,
            VenueOrderStatus::PartiallyFilled,
        ]))
        .all(&app.db)
        .await?;

    for order in live {
        let snapshot = match app
            .exchange
            .get_order(Market::Futures, &order.symbol, &order.exchange_order_id)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(order_id = order.id, error = %e, "exit order poll failed");
                continue;
            }
        };
        let commission = if snapshot.commission > 0.0 {
            snapshot.commission
        } else {
            snapshot.executed_qty * snapshot.avg_price * app.config.taker_fee_rate
        };
        let mut active: futures_orders::ActiveModel = order.into();
        active.status = Set(snapshot.status);
        active.executed_qty = Set(to_decimal(snapshot.executed_qty));
        active.avg_price = Set(to_decimal(snapshot.avg_price));
        active.commission = Set(to_decimal(commission));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&app.db).await?;
    }
    Ok(())
}

/// Decide whether a strategy's position has fully exited.
///
/// A stop-loss fill closes the whole position; the remaining take-profit
/// ladder is cancelled. Otherwise the position closes once every
/// take-profit order is terminal with something filled.
async fn settle_exits(app: &Arc<AppState>, strategy: &futures_strategies::Model) -> Result<()> {
    let exits = futures_orders::Entity::find()
        .filter(futures_orders::Column::StrategyId.eq(strategy.id))
        .filter(futures_orders::Column::Purpose.is_in([
            OrderPurpose::TakeProfit,
            OrderPurpose::StopLoss,
        ]))
        .all(&app.db)
        .await?;
    if exits.is_empty() {
        return Ok(());
    }

    let stop_filled = exits
        .iter()
        .any(|o| o.purpose == OrderPurpose::StopLoss && o.status == VenueOrderStatus::Filled);
    let tp_orders: Vec<_> = exits
        .iter()
        .filter(|o| o.purpose == OrderPurpose::TakeProfit)
        .collect();
    let tp_settled = !tp_orders.is_empty() && tp_orders.iter().all(|o| o.status.is_terminal());

    let fills: Vec<(f64, f64)> = exits
        .iter()
        .map(|o| (to_f64(&o.avg_price), to_f64(&o.executed_qty)))
        .filter(|(_, qty)| *qty > 0.0)
        .collect();

    let done = stop_filled || (tp_settled && !fills.is_empty());
    if !done {
        return Ok(());
    }

    // Clear whichever exit orders are still resting.
    entry::cancel_open_orders(app, strategy.id).await;

    let exit_price = math::weighted_average(&fills)
        .context("position settled with no recorded fills")?;
    let exit_qty: f64 = fills.iter().map(|(_, qty)| qty).sum();
    complete_strategy(app, strategy, exit_price, exit_qty).await
}

async fn complete_strategy(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
    exit_price: f64,
    exit_qty: f64,
) -> Result<()> {
    let txn = app.db.begin().await?;
    let Some(current) = futures_strategies::Entity::find_by_id(strategy.id)
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        return Ok(());
    };
    let Some(next) = current.status.next(FuturesEvent::Complete) else {
        txn.rollback().await?;
        return Ok(());
    };

    let position = futures_positions::Entity::find()
        .filter(futures_positions::Column::StrategyId.eq(strategy.id))
        .filter(futures_positions::Column::Status.eq(PositionStatus::Open))
        .one(&txn)
        .await?;

    let mut pnl = 0.0;
    if let Some(position) = position {
        let entry_price = to_f64(&position.entry_price);
        pnl = math::realized_pnl(entry_price, exit_price, exit_qty, strategy.side);
        let mut active: futures_positions::ActiveModel = position.into();
        active.realized_pnl = Set(to_decimal(pnl));
        active.unrealized_pnl = Set(to_decimal(0.0));
        active.status = Set(PositionStatus::Closed);
        active.closed_at = Set(Some(Utc::now()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;
    }

    let auto_restart = current.auto_restart;
    let mut active: futures_strategies::ActiveModel = current.into();
    active.status = Set(next);
    active.completed_at = Set(Some(Utc::now()));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&txn).await?;
    txn.commit().await?;

    info!(
        strategy_id = strategy.id,
        exit_price, exit_qty, pnl, "futures strategy completed"
    );

    if auto_restart {
        restart_strategy(app, strategy).await?;
    }
    Ok(())
}

/// Auto-restart spawns a fresh `waiting` row with the same parameters; the
/// completed row keeps its history.
async fn restart_strategy(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
) -> Result<()> {
    let fresh = futures_strategies::ActiveModel {
        user_id: Set(strategy.user_id),
        symbol: Set(strategy.symbol.clone()),
        side: Set(strategy.side),
        base_price: Set(strategy.base_price),
        entry_offset_bps: Set(strategy.entry_offset_bps),
        leverage: Set(strategy.leverage),
        quantity: Set(strategy.quantity),
        take_profit_rate: Set(strategy.take_profit_rate),
        stop_loss_rate: Set(strategy.stop_loss_rate),
        take_profit_price: Set(None),
        stop_loss_price: Set(None),
        margin_mode: Set(strategy.margin_mode),
        decomposition: Set(strategy.decomposition),
        layer_fractions: Set(strategy.layer_fractions.clone()),
        layer_gaps_bps: Set(strategy.layer_gaps_bps.clone()),
        auto_restart: Set(true),
        status: Set(FuturesStatus::Waiting),
        fail_reason: Set(None),
        enabled: Set(true),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
        ..Default::default()
    };
    let fresh = fresh.insert(&app.db).await?;
    app.feed
        .subscribe(StreamKind::MarkPrice, &strategy.symbol, fresh.id);
    info!(
        completed_id = strategy.id,
        restarted_id = fresh.id,
        "auto-restarted futures strategy"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprotected_position_needs_both_legs() {
        assert_eq!(missing_exit_legs(&[], true), (true, true));
        assert_eq!(missing_exit_legs(&[], false), (true, false));
    }

    #[test]
    fn live_exit_orders_count_as_coverage() {
        let exits = [
            (OrderPurpose::TakeProfit, VenueOrderStatus::New, 0.0),
            (OrderPurpose::StopLoss, VenueOrderStatus::New, 0.0),
        ];
        assert_eq!(missing_exit_legs(&exits, true), (false, false));
    }

    #[test]
    fn cancelled_unfilled_exits_get_replaced() {
        let exits = [(OrderPurpose::TakeProfit, VenueOrderStatus::Cancelled, 0.0)];
        assert_eq!(missing_exit_legs(&exits, true), (true, true));
    }

    #[test]
    fn filled_exits_are_left_to_settlement() {
        let exits = [
            (OrderPurpose::TakeProfit, VenueOrderStatus::Filled, 1.0),
            (OrderPurpose::StopLoss, VenueOrderStatus::Cancelled, 0.0),
        ];
        assert_eq!(missing_exit_legs(&exits, false), (false, false));
    }
}
