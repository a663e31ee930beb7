//! Dual-investment product synchronization.
//!
//! Listings are simulated from the live price: strikes are sampled at fixed
//! percentage offsets around the mark and the APY grows with strike
//! distance. Each sync replaces the symbol's active listings and marks
//! past-maturity products expired.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

use crate::exchange::Market;
use crate::state::AppState;
use shared::entity::dual_products;
use shared::num::to_decimal;
use shared::{DualDirection, ProductStatus};

/// Strike offsets sampled around the market price, in percent.
const STRIKE_OFFSETS_PCT: [f64; 4] = [1.0, 2.0, 3.0, 5.0];
/// Product tenors offered per strike.
const DURATIONS_DAYS: [i32; 3] = [3, 7, 14];

const MIN_AMOUNT: f64 = 10.0;
const MAX_AMOUNT: f64 = 100_000.0;

/// APY grows with strike distance and decays slightly with tenor.
pub fn derive_apy(offset_pct: f64, duration_days: i32) -> f64 {
    let base = 12.0 + 6.0 * offset_pct;
    (base - 0.3 * duration_days as f64).max(1.0)
}

/// Strike at a percentage offset from the mark: above for UP, below for DOWN.
pub fn strike_for(price: f64, direction: DualDirection, offset_pct: f64) -> f64 {
    match direction {
        DualDirection::Up => price * (1.0 + offset_pct / 100.0),
        DualDirection::Down => price * (1.0 - offset_pct / 100.0),
    }
}

pub fn spawn_product_sync_loop(app: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(app.config.dual_product_sync_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = sync_once(&app).await {
                warn!(error = %e, "product sync pass failed");
            }
        }
    })
}

pub async fn sync_once(app: &Arc<AppState>) -> Result<()> {
    expire_matured(app).await?;

    for symbol in &app.config.dual_symbols {
        match app.exchange.get_price(Market::Spot, symbol).await {
            Ok(price) => refresh_symbol(app, symbol, price).await?,
            Err(e) => warn!(symbol, error = %e, "skipping product sync, no price"),
        }
    }
    Ok(())
}

async fn expire_matured(app: &Arc<AppState>) -> Result<()> {
    dual_products::Entity::update_many()
        .col_expr(dual_products::Column::Status, Expr::value(ProductStatus::Expired))
        .col_expr(dual_products::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(dual_products::Column::Status.eq(ProductStatus::Active))
        .filter(dual_products::Column::SettlementTime.lte(Utc::now()))
        .exec(&app.db)
        .await?;
    Ok(())
}

/// Retire the previous listing batch for a symbol and write a fresh one at
/// current strikes.
async fn refresh_symbol(app: &Arc<AppState>, symbol: &str, price: f64) -> Result<()> {
    dual_products::Entity::update_many()
        .col_expr(dual_products::Column::Status, Expr::value(ProductStatus::Expired))
        .col_expr(dual_products::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(dual_products::Column::Symbol.eq(symbol))
        .filter(dual_products::Column::Status.eq(ProductStatus::Active))
        .exec(&app.db)
        .await?;

    let mut created = 0usize;
    for direction in [DualDirection::Up, DualDirection::Down] {
        for offset_pct in STRIKE_OFFSETS_PCT {
            for duration_days in DURATIONS_DAYS {
                let row = dual_products::ActiveModel {
                    symbol: Set(symbol.to_string()),
                    direction: Set(direction),
                    strike_price: Set(to_decimal(strike_for(price, direction, offset_pct))),
                    apy: Set(to_decimal(derive_apy(offset_pct, duration_days))),
                    duration_days: Set(duration_days),
                    min_amount: Set(to_decimal(MIN_AMOUNT)),
                    max_amount: Set(to_decimal(MAX_AMOUNT)),
                    settlement_time: Set(Utc::now() + ChronoDuration::days(duration_days as i64)),
                    status: Set(ProductStatus::Active),
                    created_at: Set(Some(Utc::now())),
                    updated_at: Set(Some(Utc::now())),
                    ..Default::default()
                };
                row.insert(&app.db).await?;
                created += 1;
            }
        }
    }
    debug!(symbol, price, created, "refreshed dual-investment products");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apy_grows_with_strike_distance() {
        assert!(derive_apy(5.0, 7) > derive_apy(1.0, 7));
    }

    #[test]
    fn apy_decays_with_tenor_but_stays_positive() {
        assert!(derive_apy(1.0, 14) < derive_apy(1.0, 3));
        assert!(derive_apy(0.0, 365) >= 1.0);
    }

    #[test]
    fn strikes_sit_on_the_correct_side() {
        assert_eq!(strike_for(100.0, DualDirection::Up, 5.0), 105.0);
        assert_eq!(strike_for(100.0, DualDirection::Down, 5.0), 95.0);
    }
}
