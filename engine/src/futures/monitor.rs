//! Entry fill monitoring: poll entry orders until they settle or the entry
//! timeout elapses, then open the position and place exit orders.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info, warn};

use crate::exchange::Market;
use crate::futures::{entry, math};
use crate::spot::placement::parse_json_list;
use crate::state::AppState;
use shared::entity::{futures_orders, futures_positions, futures_strategies};
use shared::num::{to_decimal, to_f64};
use shared::{
    Decomposition, FuturesEvent, OrderPurpose, PositionSide, PositionStatus, VenueOrderStatus,
};

/// Poll entry fills for one strategy until all orders settle or the timeout
/// elapses, then finalize.
pub async fn monitor_entry(app: &Arc<AppState>, strategy_id: u64) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(app.config.entry_timeout_secs);
    let poll = Duration::from_secs(app.config.entry_poll_secs);

    let timed_out = loop {
        sleep(poll).await;

        match poll_entry_orders(app, strategy_id).await {
            Ok(all_settled) if all_settled => break false,
            Ok(_) => {}
            // Polling errors retry on the next pass.
            Err(e) => warn!(strategy_id, error = %e, "entry fill poll failed"),
        }

        if Instant::now() >= deadline {
            info!(strategy_id, "entry window elapsed, cancelling open orders");
            entry::cancel_open_orders(app, strategy_id).await;
            break true;
        }
    };

    finalize_entry(app, strategy_id, timed_out).await
}

/// Refresh every live entry order from the exchange. Returns true when all
/// entry orders have reached a terminal status.
async fn poll_entry_orders(app: &Arc<AppState>, strategy_id: u64) -> Result<bool> {
    let entries = futures_orders::Entity::find()
        .filter(futures_orders::Column::StrategyId.eq(strategy_id))
        .filter(futures_orders::Column::Purpose.eq(OrderPurpose::Entry))
        .all(&app.db)
        .await?;

    let mut all_settled = true;
    for order in entries {
        if order.status.is_terminal() {
            continue;
        }
        let snapshot = app
            .exchange
            .get_order(Market::Futures, &order.symbol, &order.exchange_order_id)
            .await?;

        // The order endpoint does not expose commission; cost fills at the
        // configured taker rate.
        let commission = if snapshot.commission > 0.0 {
            snapshot.commission
        } else {
            snapshot.executed_qty * snapshot.avg_price * app.config.taker_fee_rate
        };

        if !snapshot.status.is_terminal() {
            all_settled = false;
        }
        let mut active: futures_orders::ActiveModel = order.into();
        active.status = Set(snapshot.status);
        active.executed_qty = Set(to_decimal(snapshot.executed_qty));
        active.avg_price = Set(to_decimal(snapshot.avg_price));
        active.commission = Set(to_decimal(commission));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&app.db).await?;
    }
    Ok(all_settled)
}

/// What an entry round amounts to once polling stops.
#[derive(Debug, PartialEq)]
enum EntryOutcome {
    Open { entry_price: f64, quantity: f64 },
    Cancel { reason: &'static str },
}

fn entry_outcome(fills: &[(f64, f64)], timed_out: bool) -> EntryOutcome {
    match math::weighted_average(fills) {
        Some(entry_price) => EntryOutcome::Open {
            entry_price,
            quantity: fills.iter().map(|(_, qty)| qty).sum(),
        },
        None => EntryOutcome::Cancel {
            reason: if timed_out { "timeout" } else { "no entry order filled" },
        },
    }
}

/// Aggregate fills; open the position when anything filled, otherwise cancel
/// the strategy (timeout is the normal no-fill path, not an error).
async fn finalize_entry(app: &Arc<AppState>, strategy_id: u64, timed_out: bool) -> Result<()> {
    let entries = futures_orders::Entity::find()
        .filter(futures_orders::Column::StrategyId.eq(strategy_id))
        .filter(futures_orders::Column::Purpose.eq(OrderPurpose::Entry))
        .all(&app.db)
        .await?;

    let fills: Vec<(f64, f64)> = entries
        .iter()
        .map(|o| (to_f64(&o.avg_price), to_f64(&o.executed_qty)))
        .filter(|(_, qty)| *qty > 0.0)
        .collect();

    match entry_outcome(&fills, timed_out) {
        EntryOutcome::Open { entry_price, quantity } => {
            open_position(app, strategy_id, entry_price, quantity).await
        }
        EntryOutcome::Cancel { reason } => {
            entry::cancel_strategy(app, strategy_id, reason).await;
            Ok(())
        }
    }
}

/// Create the position record, persist recomputed exit prices, transition to
/// `position_opened`, and place exit orders against the realized entry.
async fn open_position(
    app: &Arc<AppState>,
    strategy_id: u64,
    entry_price: f64,
    quantity: f64,
) -> Result<()> {
    let strategy = futures_strategies::Entity::find_by_id(strategy_id)
        .one(&app.db)
        .await?
        .context("strategy disappeared while opening position")?;

    let take_profit = math::take_profit_price(
        entry_price,
        strategy.side,
        to_f64(&strategy.take_profit_rate),
        app.config.taker_fee_rate,
    );
    let stop_loss_rate = to_f64(&strategy.stop_loss_rate);
    let stop_loss = (stop_loss_rate > 0.0)
        .then(|| math::stop_loss_price(entry_price, strategy.side, stop_loss_rate));

    let txn = app.db.begin().await?;
    let Some(current) = futures_strategies::Entity::find_by_id(strategy_id)
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        return Ok(());
    };
    let Some(next) = current.status.next(FuturesEvent::PositionOpen) else {
        txn.rollback().await?;
        return Ok(());
    };
    let mut active: futures_strategies::ActiveModel = current.into();
    active.status = Set(next);
    active.take_profit_price = Set(Some(to_decimal(take_profit)));
    active.stop_loss_price = Set(stop_loss.map(to_decimal));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&txn).await?;

    let position = futures_positions::ActiveModel {
        strategy_id: Set(strategy_id),
        symbol: Set(strategy.symbol.clone()),
        side: Set(strategy.side),
        entry_price: Set(to_decimal(entry_price)),
        quantity: Set(to_decimal(quantity)),
        realized_pnl: Set(to_decimal(0.0)),
        unrealized_pnl: Set(to_decimal(0.0)),
        status: Set(PositionStatus::Open),
        opened_at: Set(Some(Utc::now())),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
        ..Default::default()
    };
    position.insert(&txn).await?;
    txn.commit().await?;

    info!(
        strategy_id,
        entry_price, quantity, take_profit, "position opened, placing exit orders"
    );
    place_exit_orders(app, &strategy, quantity, take_profit, stop_loss).await;
    Ok(())
}

/// Place take-profit (laddered for iceberg entries) and stop-loss orders.
/// Placement failures here are logged, not fatal: the strategy stays in
/// `position_opened` and the reconcile loop re-places missing legs.
async fn place_exit_orders(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
    quantity: f64,
    take_profit: f64,
    stop_loss: Option<f64>,
) {
    place_take_profit_orders(app, strategy, quantity, take_profit).await;
    if let Some(stop_price) = stop_loss {
        place_stop_loss_order(app, strategy, quantity, stop_price).await;
    }
}

pub(crate) async fn place_take_profit_orders(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
    quantity: f64,
    take_profit: f64,
) {
    let exit_side = strategy.side.exit_order_side();

    let rules = match app
        .exchange
        .get_symbol_rules(Market::Futures, &strategy.symbol)
        .await
    {
        Ok(rules) => rules,
        Err(e) => {
            error!(strategy_id = strategy.id, error = %e, "failed to fetch rules for exits");
            return;
        }
    };

    let tp_layers = match tp_layers_for(app, strategy, take_profit, quantity, rules) {
        Ok(layers) => layers,
        Err(e) => {
            error!(strategy_id = strategy.id, error = %e, "bad take-profit layer configuration");
            return;
        }
    };

    for layer in &tp_layers {
        match app
            .exchange
            .place_limit_order(
                Market::Futures,
                &strategy.symbol,
                exit_side,
                layer.price,
                layer.quantity,
            )
            .await
        {
            Ok(order_id) => {
                if let Err(e) = persist_exit_order(
                    app,
                    strategy,
                    OrderPurpose::TakeProfit,
                    exit_side,
                    layer.price,
                    layer.quantity,
                    order_id,
                )
                .await
                {
                    error!(strategy_id = strategy.id, error = %e, "failed to persist take-profit order");
                }
            }
            Err(e) => {
                error!(strategy_id = strategy.id, error = %e, "failed to place take-profit order");
            }
        }
    }
}

pub(crate) async fn place_stop_loss_order(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
    quantity: f64,
    stop_price: f64,
) {
    let exit_side = strategy.side.exit_order_side();
    match app
        .exchange
        .place_stop_market_order(&strategy.symbol, exit_side, stop_price, quantity)
        .await
    {
        Ok(order_id) => {
            if let Err(e) = persist_exit_order(
                app,
                strategy,
                OrderPurpose::StopLoss,
                exit_side,
                stop_price,
                quantity,
                order_id,
            )
            .await
            {
                error!(strategy_id = strategy.id, error = %e, "failed to persist stop-loss order");
            }
        }
        Err(e) => {
            error!(strategy_id = strategy.id, error = %e, "failed to place stop-loss order");
        }
    }
}

fn tp_layers_for(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
    take_profit: f64,
    quantity: f64,
    rules: crate::exchange::SymbolRules,
) -> Result<Vec<crate::spot::placement::OrderLevel>> {
    match strategy.decomposition {
        Decomposition::Iceberg => {
            let fractions = parse_json_list(strategy.layer_fractions.as_ref())?
                .unwrap_or_else(|| app.config.iceberg_fractions.clone());
            let gaps = parse_json_list(strategy.layer_gaps_bps.as_ref())?
                .unwrap_or_else(|| match strategy.side {
                    PositionSide::Long => app.config.long_entry_gaps_bps.clone(),
                    PositionSide::Short => app.config.short_entry_gaps_bps.clone(),
                });
            math::take_profit_layers(take_profit, quantity, strategy.side, &fractions, &gaps, rules)
        }
        _ => math::take_profit_layers(take_profit, quantity, strategy.side, &[1.0], &[0.0], rules),
    }
}

async fn persist_exit_order(
    app: &Arc<AppState>,
    strategy: &futures_strategies::Model,
    purpose: OrderPurpose,
    side: shared::OrderSide,
    price: f64,
    quantity: f64,
    exchange_order_id: String,
) -> Result<()> {
    let row = futures_orders::ActiveModel {
        strategy_id: Set(strategy.id),
        purpose: Set(purpose),
        symbol: Set(strategy.symbol.clone()),
        side: Set(side),
        price: Set(to_decimal(price)),
        quantity: Set(to_decimal(quantity)),
        executed_qty: Set(to_decimal(0.0)),
        avg_price: Set(to_decimal(0.0)),
        commission: Set(to_decimal(0.0)),
        exchange_order_id: Set(exchange_order_id),
        status: Set(VenueOrderStatus::New),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
        ..Default::default()
    };
    row.insert(&app.db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_window_with_no_fills_cancels_with_timeout_reason() {
        assert_eq!(
            entry_outcome(&[], true),
            EntryOutcome::Cancel { reason: "timeout" }
        );
    }

    #[test]
    fn unfilled_entries_without_timeout_report_the_difference() {
        assert_eq!(
            entry_outcome(&[], false),
            EntryOutcome::Cancel {
                reason: "no entry order filled"
            }
        );
    }

    #[test]
    fn partial_fills_open_at_the_weighted_entry() {
        let outcome = entry_outcome(&[(100.0, 1.0), (102.0, 3.0)], true);
        assert_eq!(
            outcome,
            EntryOutcome::Open {
                entry_price: 101.5,
                quantity: 4.0
            }
        );
    }
}
