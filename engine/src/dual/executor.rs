//! Dual-investment strategy execution.
//!
//! One periodic pass dispatches every enabled strategy to its kind-specific
//! handler. All investment goes through [`invest`], which locks and re-reads
//! the strategy inside a transaction so `current_invested` can never exceed
//! the configured limit, no matter how passes interleave.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect, TransactionTrait,
};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::dual::products::strike_for;
use crate::exchange::Market;
use crate::state::AppState;
use shared::entity::{dual_orders, dual_products, dual_strategies};
use shared::num::{to_decimal, to_f64};
use shared::{
    DirectionPreference, DualDirection, DualOrderStatus, DualStrategyKind, DualStrategyStatus,
    ProductStatus, TriggerKind,
};

pub fn spawn_strategy_execute_loop(app: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(app.config.dual_execute_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = execute_once(&app).await {
                warn!(error = %e, "dual strategy execution pass failed");
            }
        }
    })
}

pub async fn execute_once(app: &Arc<AppState>) -> Result<()> {
    let strategies = dual_strategies::Entity::find()
        .filter(dual_strategies::Column::Enabled.eq(true))
        .filter(dual_strategies::Column::Status.eq(DualStrategyStatus::Active))
        .filter(dual_strategies::Column::DeletedAt.is_null())
        .all(&app.db)
        .await?;

    for strategy in strategies {
        let id = strategy.id;
        if let Err(e) = run_strategy(app, strategy).await {
            // Unmatched products and price lookups retry next pass.
            warn!(strategy_id = id, error = %e, "dual strategy pass failed");
        }
    }
    Ok(())
}

async fn run_strategy(app: &Arc<AppState>, strategy: dual_strategies::Model) -> Result<()> {
    let price = app.exchange.get_price(Market::Spot, &strategy.symbol).await?;
    match strategy.kind {
        DualStrategyKind::Single => run_single(app, &strategy, price).await,
        DualStrategyKind::AutoReinvest => run_auto_reinvest(app, &strategy, price).await,
        DualStrategyKind::Ladder => run_ladder(app, &strategy, price).await,
        DualStrategyKind::PriceTrigger => run_price_trigger(app, &strategy, price).await,
    }
}

/// Does a product pass a strategy's APY / duration / direction / strike
/// distance filters at the current market price?
#[allow(clippy::too_many_arguments)]
pub fn matches_filters(
    preference: DirectionPreference,
    min_apy: f64,
    max_apy: f64,
    min_duration: i32,
    max_duration: i32,
    max_strike_offset_pct: f64,
    direction: DualDirection,
    apy: f64,
    duration_days: i32,
    strike: f64,
    market_price: f64,
) -> bool {
    if !preference.accepts(direction) {
        return false;
    }
    if apy < min_apy || apy > max_apy {
        return false;
    }
    if duration_days < min_duration || duration_days > max_duration {
        return false;
    }
    if market_price <= 0.0 {
        return false;
    }
    let offset_pct = ((strike - market_price) / market_price).abs() * 100.0;
    offset_pct <= max_strike_offset_pct
}

fn product_passes(
    strategy: &dual_strategies::Model,
    product: &dual_products::Model,
    price: f64,
) -> bool {
    matches_filters(
        strategy.direction,
        to_f64(&strategy.min_apy),
        to_f64(&strategy.max_apy),
        strategy.min_duration_days,
        strategy.max_duration_days,
        to_f64(&strategy.max_strike_offset_pct),
        product.direction,
        to_f64(&product.apy),
        product.duration_days,
        to_f64(&product.strike_price),
        price,
    )
}

async fn active_products(
    app: &Arc<AppState>,
    symbol: &str,
) -> Result<Vec<dual_products::Model>> {
    Ok(dual_products::Entity::find()
        .filter(dual_products::Column::Symbol.eq(symbol))
        .filter(dual_products::Column::Status.eq(ProductStatus::Active))
        .filter(dual_products::Column::SettlementTime.gt(Utc::now()))
        .all(&app.db)
        .await?)
}

/// Best match = highest APY among products passing the filters.
async fn best_product(
    app: &Arc<AppState>,
    strategy: &dual_strategies::Model,
    price: f64,
) -> Result<Option<dual_products::Model>> {
    let mut candidates: Vec<_> = active_products(app, &strategy.symbol)
        .await?
        .into_iter()
        .filter(|p| product_passes(strategy, p, price))
        .collect();
    candidates.sort_by(|a, b| b.apy.cmp(&a.apy));
    Ok(candidates.into_iter().next())
}

/// Amount actually investable: the smallest of the request, the per-order
/// cap, the room left under the strategy limit, and the product maximum.
/// `None` when that lands at zero or below the product minimum.
pub fn clamp_investment(
    desired: f64,
    per_order: f64,
    limit: f64,
    invested: f64,
    product_min: f64,
    product_max: f64,
) -> Option<f64> {
    let amount = desired.min(per_order).min(limit - invested).min(product_max);
    if amount <= 0.0 || amount < product_min {
        None
    } else {
        Some(amount)
    }
}

/// Create an order against a product inside a transaction that locks and
/// re-reads the strategy row, so the investment cap holds against the
/// settlement loop's concurrent decrements. `reinvest_source` marks a
/// settled order as rolled over in the same transaction. Returns false when
/// the cap or the product's minimum leaves nothing to invest.
async fn invest(
    app: &Arc<AppState>,
    strategy_id: u64,
    product: &dual_products::Model,
    desired: f64,
    reinvest_source: Option<u64>,
) -> Result<bool> {
    let txn = app.db.begin().await?;
    let Some(strategy) = dual_strategies::Entity::find_by_id(strategy_id)
        .lock_exclusive()
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        return Ok(false);
    };

    let invested = to_f64(&strategy.current_invested);
    let Some(amount) = clamp_investment(
        desired,
        to_f64(&strategy.per_order_amount),
        to_f64(&strategy.total_investment_limit),
        invested,
        to_f64(&product.min_amount),
        to_f64(&product.max_amount),
    ) else {
        txn.rollback().await?;
        return Ok(false);
    };

    let order = dual_orders::ActiveModel {
        strategy_id: Set(strategy.id),
        product_id: Set(product.id),
        user_id: Set(strategy.user_id),
        symbol: Set(strategy.symbol.clone()),
        amount: Set(to_decimal(amount)),
        strike_price: Set(product.strike_price),
        apy: Set(product.apy),
        direction: Set(product.direction),
        duration_days: Set(product.duration_days),
        settlement_time: Set(product.settlement_time),
        status: Set(DualOrderStatus::Active),
        reinvested: Set(false),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
        ..Default::default()
    };
    order.insert(&txn).await?;

    if let Some(source_id) = reinvest_source {
        if let Some(source) = dual_orders::Entity::find_by_id(source_id).one(&txn).await? {
            let mut source: dual_orders::ActiveModel = source.into();
            source.reinvested = Set(true);
            source.updated_at = Set(Some(Utc::now()));
            source.update(&txn).await?;
        }
    }

    let mut active: dual_strategies::ActiveModel = strategy.into();
    active.current_invested = Set(to_decimal(invested + amount));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&txn).await?;
    txn.commit().await?;

    info!(
        strategy_id,
        product_id = product.id,
        amount,
        apy = to_f64(&product.apy),
        "dual-investment order created"
    );
    Ok(true)
}

async fn run_single(
    app: &Arc<AppState>,
    strategy: &dual_strategies::Model,
    price: f64,
) -> Result<()> {
    let Some(product) = best_product(app, strategy, price).await? else {
        debug!(strategy_id = strategy.id, "no matching product");
        return Ok(());
    };
    invest(app, strategy.id, &product, to_f64(&strategy.per_order_amount), None).await?;
    Ok(())
}

/// Roll each settlement from the last 24 hours into a fresh product, once.
async fn run_auto_reinvest(
    app: &Arc<AppState>,
    strategy: &dual_strategies::Model,
    price: f64,
) -> Result<()> {
    let since = Utc::now() - ChronoDuration::hours(24);
    let settled = dual_orders::Entity::find()
        .filter(dual_orders::Column::StrategyId.eq(strategy.id))
        .filter(dual_orders::Column::Status.eq(DualOrderStatus::Settled))
        .filter(dual_orders::Column::Reinvested.eq(false))
        .filter(dual_orders::Column::SettledAt.gte(since))
        .all(&app.db)
        .await?;

    for order in settled {
        let Some(product) = best_product(app, strategy, price).await? else {
            break;
        };
        let proceeds = order.settle_amount.as_ref().map(to_f64).unwrap_or(0.0);
        if proceeds <= 0.0 {
            continue;
        }
        invest(app, strategy.id, &product, proceeds, Some(order.id)).await?;
    }
    Ok(())
}

/// Spread rungs at increasing strike offsets from the base price, skipping
/// the pass when the last 24 hours already placed a full ladder.
async fn run_ladder(
    app: &Arc<AppState>,
    strategy: &dual_strategies::Model,
    price: f64,
) -> Result<()> {
    let steps = strategy.ladder_steps.unwrap_or(3).max(1) as u64;
    let since = Utc::now() - ChronoDuration::hours(24);
    let recent = dual_orders::Entity::find()
        .filter(dual_orders::Column::StrategyId.eq(strategy.id))
        .filter(dual_orders::Column::CreatedAt.gte(since))
        .count(&app.db)
        .await?;
    if recent >= steps {
        return Ok(());
    }

    let base = strategy
        .ladder_base_price
        .as_ref()
        .map(to_f64)
        .filter(|p| *p > 0.0)
        .unwrap_or(price);
    let step_pct = strategy
        .ladder_step_pct
        .as_ref()
        .map(to_f64)
        .filter(|p| *p > 0.0)
        .unwrap_or(1.0);

    let directions: Vec<DualDirection> = [DualDirection::Up, DualDirection::Down]
        .into_iter()
        .filter(|d| strategy.direction.accepts(*d))
        .collect();
    let products = active_products(app, &strategy.symbol).await?;

    let mut placed = recent;
    for rung in 0..steps {
        if placed >= steps {
            break;
        }
        let offset_pct = (rung + 1) as f64 * step_pct;
        for direction in &directions {
            if placed >= steps {
                break;
            }
            let target = strike_for(base, *direction, offset_pct);
            // Closest passing strike to this rung's target.
            let candidate = products
                .iter()
                .filter(|p| p.direction == *direction && product_passes(strategy, p, price))
                .min_by(|a, b| {
                    let da = (to_f64(&a.strike_price) - target).abs();
                    let db = (to_f64(&b.strike_price) - target).abs();
                    da.total_cmp(&db)
                });
            if let Some(product) = candidate {
                if invest(app, strategy.id, product, to_f64(&strategy.per_order_amount), None)
                    .await?
                {
                    placed += 1;
                }
            }
        }
    }
    Ok(())
}

/// Invest once when the market crosses the configured trigger, then retire
/// the strategy. An unmatched product leaves it armed for the next pass.
async fn run_price_trigger(
    app: &Arc<AppState>,
    strategy: &dual_strategies::Model,
    price: f64,
) -> Result<()> {
    let (Some(trigger_price), Some(trigger_kind)) =
        (strategy.trigger_price.as_ref().map(to_f64), strategy.trigger_kind)
    else {
        warn!(strategy_id = strategy.id, "price-trigger strategy missing trigger parameters");
        return Ok(());
    };

    let crossed = match trigger_kind {
        TriggerKind::Above => price >= trigger_price,
        TriggerKind::Below => price <= trigger_price,
    };
    if !crossed {
        return Ok(());
    }

    let Some(product) = best_product(app, strategy, price).await? else {
        return Ok(());
    };
    if invest(app, strategy.id, &product, to_f64(&strategy.per_order_amount), None).await? {
        let mut active: dual_strategies::ActiveModel = strategy.clone().into();
        active.status = Set(DualStrategyStatus::Completed);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&app.db).await?;
        info!(strategy_id = strategy.id, "price-trigger strategy fired and completed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_filter(direction: DualDirection, apy: f64, duration: i32, strike: f64) -> bool {
        matches_filters(
            DirectionPreference::Both,
            5.0,
            50.0,
            1,
            14,
            5.0,
            direction,
            apy,
            duration,
            strike,
            100.0,
        )
    }

    #[test]
    fn filters_accept_matching_product() {
        assert!(base_filter(DualDirection::Up, 20.0, 7, 103.0));
    }

    #[test]
    fn filters_reject_out_of_band_apy_and_duration() {
        assert!(!base_filter(DualDirection::Up, 4.0, 7, 103.0));
        assert!(!base_filter(DualDirection::Up, 60.0, 7, 103.0));
        assert!(!base_filter(DualDirection::Up, 20.0, 30, 103.0));
    }

    #[test]
    fn filters_reject_far_strikes() {
        assert!(!base_filter(DualDirection::Up, 20.0, 7, 106.0));
        assert!(base_filter(DualDirection::Down, 20.0, 7, 95.0));
    }

    #[test]
    fn investment_clamps_to_remaining_limit() {
        assert_eq!(
            clamp_investment(500.0, 500.0, 1_000.0, 800.0, 10.0, 10_000.0),
            Some(200.0)
        );
    }

    #[test]
    fn investment_rejected_at_the_limit() {
        assert_eq!(clamp_investment(500.0, 500.0, 1_000.0, 1_000.0, 10.0, 10_000.0), None);
    }

    #[test]
    fn repeated_investments_never_exceed_the_limit() {
        // Each pass sees the previous pass's increment, as the locked
        // transaction guarantees.
        let mut invested = 0.0;
        while let Some(amount) = clamp_investment(400.0, 400.0, 1_000.0, invested, 10.0, 10_000.0)
        {
            invested += amount;
        }
        assert!((invested - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn investment_respects_product_bounds() {
        assert_eq!(
            clamp_investment(500.0, 500.0, 1_000.0, 0.0, 10.0, 300.0),
            Some(300.0)
        );
        assert_eq!(clamp_investment(5.0, 500.0, 1_000.0, 0.0, 10.0, 300.0), None);
    }

    #[test]
    fn direction_preference_is_enforced() {
        let accepted = matches_filters(
            DirectionPreference::Up,
            5.0,
            50.0,
            1,
            14,
            5.0,
            DualDirection::Down,
            20.0,
            7,
            97.0,
            100.0,
        );
        assert!(!accepted);
    }
}
