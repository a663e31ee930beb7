//! Futures trigger evaluation.
//!
//! Mark-price ticks arm waiting strategies. The commit to `triggered` runs
//! inside a transaction that re-reads the row, and a process-wide
//! single-flight permit is held for the whole entry execution so a second
//! tick can never dispatch a duplicate entry.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{debug, error, warn};

use crate::exchange::PriceTick;
use crate::futures::entry;
use crate::state::AppState;
use shared::entity::futures_strategies;
use shared::num::to_f64;
use shared::{FuturesEvent, FuturesStatus, PositionSide};

/// LONG fires at or below the base price, SHORT at or above it.
pub fn should_fire(side: PositionSide, base_price: f64, price: f64) -> bool {
    match side {
        PositionSide::Long => price <= base_price,
        PositionSide::Short => price >= base_price,
    }
}

/// Scan waiting strategies for a symbol against one mark-price tick.
pub async fn handle_tick(app: &Arc<AppState>, tick: &PriceTick) {
    let waiting = futures_strategies::Entity::find()
        .filter(futures_strategies::Column::Symbol.eq(tick.symbol.clone()))
        .filter(futures_strategies::Column::Status.eq(FuturesStatus::Waiting))
        .filter(futures_strategies::Column::Enabled.eq(true))
        .filter(futures_strategies::Column::DeletedAt.is_null())
        .all(&app.db)
        .await;

    let waiting = match waiting {
        Ok(rows) => rows,
        Err(e) => {
            warn!(symbol = %tick.symbol, error = %e, "failed to load futures strategies");
            return;
        }
    };

    for strategy in waiting {
        app.prices
            .update(&tick.symbol, strategy.user_id, tick.price, tick.timestamp)
            .await;
        if !should_fire(strategy.side, to_f64(&strategy.base_price), tick.price) {
            continue;
        }
        let Some(permit) = app.flights.try_acquire(strategy.id) else {
            debug!(strategy_id = strategy.id, "entry already in flight, skipping tick");
            continue;
        };
        let app = app.clone();
        tokio::spawn(async move {
            // Held until entry execution finishes.
            let _permit = permit;
            let id = strategy.id;
            match commit_trigger(&app, id).await {
                Ok(true) => {
                    if let Err(e) = entry::execute_entry(&app, id).await {
                        error!(strategy_id = id, error = %e, "futures entry execution failed");
                    }
                }
                Ok(false) => debug!(strategy_id = id, "lost trigger race, skipping"),
                Err(e) => error!(strategy_id = id, error = %e, "trigger commit failed"),
            }
        });
    }
}

/// Commit `waiting -> triggered` with read-then-verify. Returns false when
/// the strategy changed state or was disabled between tick and commit.
pub async fn commit_trigger(app: &Arc<AppState>, strategy_id: u64) -> Result<bool> {
    let txn = app.db.begin().await.context("begin trigger transaction")?;

    let Some(current) = futures_strategies::Entity::find_by_id(strategy_id)
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        return Ok(false);
    };
    if !current.enabled || current.deleted_at.is_some() {
        txn.rollback().await?;
        return Ok(false);
    }
    let Some(next) = current.status.next(FuturesEvent::Trigger) else {
        txn.rollback().await?;
        return Ok(false);
    };

    let mut active: futures_strategies::ActiveModel = current.into();
    active.status = Set(next);
    active.triggered_at = Set(Some(Utc::now()));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&txn).await?;
    txn.commit().await.context("commit trigger transaction")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_fires_at_or_below_base() {
        assert!(should_fire(PositionSide::Long, 50_000.0, 49_999.0));
        assert!(should_fire(PositionSide::Long, 50_000.0, 50_000.0));
        assert!(!should_fire(PositionSide::Long, 50_000.0, 50_001.0));
    }

    #[test]
    fn short_fires_at_or_above_base() {
        assert!(should_fire(PositionSide::Short, 50_000.0, 50_001.0));
        assert!(should_fire(PositionSide::Short, 50_000.0, 50_000.0));
        assert!(!should_fire(PositionSide::Short, 50_000.0, 49_999.0));
    }
}
