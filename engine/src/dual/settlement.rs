//! Dual-investment settlement simulation.
//!
//! Orders at maturity settle against the current market price: when the
//! strike condition holds, the principal converts at the strike; otherwise
//! the original asset is returned with accrued interest. The settlement and
//! the `current_invested` decrement commit in one transaction, and an
//! already-settled order is a no-op.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QuerySelect,
    TransactionTrait,
};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::exchange::Market;
use crate::state::AppState;
use shared::entity::{dual_orders, dual_strategies};
use shared::num::{to_decimal, to_f64};
use shared::DualDirection;
use shared::DualOrderStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub asset: String,
    pub amount: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
}

/// Quote-asset suffixes recognized when splitting a pair symbol.
const QUOTE_ASSETS: [&str; 3] = ["USDT", "USDC", "BUSD"];

pub fn split_symbol(symbol: &str) -> (String, String) {
    for quote in QUOTE_ASSETS {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return (base.to_string(), quote.to_string());
            }
        }
    }
    // Unrecognized pair: treat the whole symbol as the base.
    (symbol.to_string(), "USDT".to_string())
}

pub fn interest_factor(apy_pct: f64, duration_days: i32) -> f64 {
    1.0 + apy_pct / 100.0 / 365.0 * duration_days as f64
}

/// Resolve one order against the market price.
///
/// Principal is quote-denominated for DOWN (buy-low) products and
/// base-denominated for UP (sell-high) products. P&L is expressed in quote
/// terms at the settlement price.
pub fn settle_outcome(
    symbol: &str,
    direction: DualDirection,
    amount: f64,
    strike: f64,
    apy_pct: f64,
    duration_days: i32,
    price: f64,
) -> Settlement {
    let (base, quote) = split_symbol(symbol);
    let interest = interest_factor(apy_pct, duration_days);

    let (asset, settled, initial_value, final_value) = match direction {
        DualDirection::Up if price >= strike => {
            // Sold at the strike, paid out in quote.
            let settled = amount * strike * interest;
            (quote, settled, amount * price, settled)
        }
        DualDirection::Up => {
            let settled = amount * interest;
            (base, settled, amount * price, settled * price)
        }
        DualDirection::Down if price <= strike => {
            // Bought at the strike, paid out in base.
            let settled = amount / strike * interest;
            (base, settled, amount, settled * price)
        }
        DualDirection::Down => {
            let settled = amount * interest;
            (quote, settled, amount, settled)
        }
    };

    let pnl = final_value - initial_value;
    let pnl_pct = if initial_value > 0.0 {
        pnl / initial_value * 100.0
    } else {
        0.0
    };
    Settlement {
        asset,
        amount: settled,
        pnl,
        pnl_pct,
    }
}

pub fn spawn_settlement_loop(app: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(app.config.dual_settle_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = settle_once(&app).await {
                warn!(error = %e, "settlement pass failed");
            }
        }
    })
}

/// Settle every active order within one hour of maturity.
pub async fn settle_once(app: &Arc<AppState>) -> Result<()> {
    let horizon = Utc::now() + ChronoDuration::hours(1);
    let due = dual_orders::Entity::find()
        .filter(dual_orders::Column::Status.eq(DualOrderStatus::Active))
        .filter(dual_orders::Column::SettlementTime.lte(horizon))
        .all(&app.db)
        .await?;

    for order in due {
        let id = order.id;
        if let Err(e) = settle_order(app, order).await {
            warn!(order_id = id, error = %e, "failed to settle dual order");
        }
    }
    Ok(())
}

/// Only an active order settles; a pass that lost the race sees a terminal
/// status and leaves the row alone.
fn settleable(status: DualOrderStatus) -> bool {
    status == DualOrderStatus::Active
}

async fn settle_order(app: &Arc<AppState>, order: dual_orders::Model) -> Result<()> {
    let price = app.exchange.get_price(Market::Spot, &order.symbol).await?;

    let txn = app.db.begin().await?;
    // Lock and re-read under the transaction; a concurrent pass may have
    // settled it already.
    let Some(current) = dual_orders::Entity::find_by_id(order.id)
        .lock_exclusive()
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        return Ok(());
    };
    if !settleable(current.status) {
        txn.rollback().await?;
        return Ok(());
    }

    let outcome = settle_outcome(
        &current.symbol,
        current.direction,
        to_f64(&current.amount),
        to_f64(&current.strike_price),
        to_f64(&current.apy),
        current.duration_days,
        price,
    );

    // The executor's invest transaction locks the same row, so the decrement
    // below cannot race its increment.
    let strategy = dual_strategies::Entity::find_by_id(current.strategy_id)
        .lock_exclusive()
        .one(&txn)
        .await?;

    let order_amount = to_f64(&current.amount);
    let strategy_id = current.strategy_id;
    let mut active: dual_orders::ActiveModel = current.into();
    active.status = Set(DualOrderStatus::Settled);
    active.settle_asset = Set(Some(outcome.asset.clone()));
    active.settle_amount = Set(Some(to_decimal(outcome.amount)));
    active.pnl = Set(Some(to_decimal(outcome.pnl)));
    active.pnl_pct = Set(Some(to_decimal(outcome.pnl_pct)));
    active.settled_at = Set(Some(Utc::now()));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&txn).await?;

    if let Some(strategy) = strategy {
        let invested = (to_f64(&strategy.current_invested) - order_amount).max(0.0);
        let mut strategy: dual_strategies::ActiveModel = strategy.into();
        strategy.current_invested = Set(to_decimal(invested));
        strategy.updated_at = Set(Some(Utc::now()));
        strategy.update(&txn).await?;
    }
    txn.commit().await?;

    info!(
        order_id = order.id,
        strategy_id,
        asset = %outcome.asset,
        amount = outcome.amount,
        pnl = outcome.pnl,
        "dual-investment order settled"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_orders_settle() {
        assert!(settleable(DualOrderStatus::Active));
        assert!(!settleable(DualOrderStatus::Settled));
        assert!(!settleable(DualOrderStatus::Cancelled));
        assert!(!settleable(DualOrderStatus::Pending));
    }

    #[test]
    fn splits_known_quote_suffixes() {
        assert_eq!(split_symbol("BTCUSDT"), ("BTC".to_string(), "USDT".to_string()));
        assert_eq!(split_symbol("ETHUSDC"), ("ETH".to_string(), "USDC".to_string()));
    }

    #[test]
    fn interest_accrues_pro_rata() {
        let factor = interest_factor(36.5, 10);
        assert!((factor - 1.01).abs() < 1e-9);
    }

    #[test]
    fn up_product_converts_at_strike_when_crossed() {
        // 1 BTC, strike 105, settled at 110: paid out in USDT at the strike.
        let outcome = settle_outcome("BTCUSDT", DualDirection::Up, 1.0, 105.0, 0.0, 7, 110.0);
        assert_eq!(outcome.asset, "USDT");
        assert!((outcome.amount - 105.0).abs() < 1e-9);
        // Converted at 105 while the market sits at 110: negative vs holding.
        assert!(outcome.pnl < 0.0);
    }

    #[test]
    fn up_product_returns_base_plus_interest_otherwise() {
        let outcome = settle_outcome("BTCUSDT", DualDirection::Up, 1.0, 105.0, 36.5, 10, 100.0);
        assert_eq!(outcome.asset, "BTC");
        assert!((outcome.amount - 1.01).abs() < 1e-9);
        assert!(outcome.pnl > 0.0);
    }

    #[test]
    fn down_product_buys_base_at_strike_when_crossed() {
        // 950 USDT, strike 95, settled at 90: converted to 10 BTC.
        let outcome = settle_outcome("BTCUSDT", DualDirection::Down, 950.0, 95.0, 0.0, 7, 90.0);
        assert_eq!(outcome.asset, "BTC");
        assert!((outcome.amount - 10.0).abs() < 1e-9);
        // Bought at 95 with the market at 90: negative vs holding quote.
        assert!(outcome.pnl < 0.0);
    }

    #[test]
    fn down_product_returns_quote_plus_interest_otherwise() {
        let outcome = settle_outcome("BTCUSDT", DualDirection::Down, 1_000.0, 95.0, 36.5, 10, 100.0);
        assert_eq!(outcome.asset, "USDT");
        assert!((outcome.amount - 1_010.0).abs() < 1e-9);
        assert!((outcome.pnl - 10.0).abs() < 1e-9);
        assert!((outcome.pnl_pct - 1.0).abs() < 1e-9);
    }
}
