//! Spot order reconciliation loop.
//!
//! Polls every pending order against the exchange, applies the cancel-after
//! deadline, and clears a strategy's `pending_batch` flag once its last
//! pending order resolves.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::exchange::Market;
use crate::state::AppState;
use shared::entity::{orders, strategies};
use shared::{SpotOrderStatus, VenueOrderStatus};

/// Local status for a venue status, `None` while the order is still live.
fn map_spot_status(status: VenueOrderStatus) -> Option<SpotOrderStatus> {
    match status {
        VenueOrderStatus::Filled => Some(SpotOrderStatus::Filled),
        VenueOrderStatus::Cancelled | VenueOrderStatus::Expired | VenueOrderStatus::Rejected => {
            Some(SpotOrderStatus::Cancelled)
        }
        VenueOrderStatus::New | VenueOrderStatus::PartiallyFilled => None,
    }
}

pub fn spawn_spot_reconcile_loop(app: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(app.config.spot_reconcile_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = reconcile_once(&app).await {
                warn!(error = %e, "spot reconciliation pass failed");
            }
        }
    })
}

pub async fn reconcile_once(app: &Arc<AppState>) -> Result<()> {
    let pending = orders::Entity::find()
        .filter(orders::Column::Status.eq(SpotOrderStatus::Pending))
        .all(&app.db)
        .await?;

    for order in pending {
        if let Err(e) = reconcile_order(app, &order).await {
            // Polling errors retry on the next pass.
            warn!(order_id = order.id, error = %e, "failed to reconcile spot order");
        }
    }

    clear_settled_batches(app).await
}

async fn reconcile_order(app: &Arc<AppState>, order: &orders::Model) -> Result<()> {
    let snapshot = app
        .exchange
        .get_order(Market::Spot, &order.symbol, &order.exchange_order_id)
        .await?;

    let resolved = match map_spot_status(snapshot.status) {
        Some(status) => Some(status),
        None => {
            let expired = order.cancel_after.is_some_and(|deadline| Utc::now() >= deadline);
            if expired {
                info!(
                    order_id = order.id,
                    symbol = %order.symbol,
                    "cancelling spot order past its deadline"
                );
                app.exchange
                    .cancel_order(Market::Spot, &order.symbol, &order.exchange_order_id)
                    .await?;
                Some(SpotOrderStatus::Cancelled)
            } else {
                None
            }
        }
    };

    if let Some(status) = resolved {
        debug!(order_id = order.id, ?status, "spot order resolved");
        let mut active: orders::ActiveModel = order.clone().into();
        active.status = Set(status);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&app.db).await?;
    }
    Ok(())
}

/// A flagged strategy re-arms only once every order in its batch has
/// resolved and no execution still holds the strategy's flight permit. The
/// permit check covers the window where the claim has committed but the
/// batch rows are not yet persisted.
fn batch_resolved(pending_orders: u64, executing: bool) -> bool {
    pending_orders == 0 && !executing
}

/// Unblock strategies whose whole batch has resolved.
async fn clear_settled_batches(app: &Arc<AppState>) -> Result<()> {
    let in_flight = strategies::Entity::find()
        .filter(strategies::Column::PendingBatch.eq(true))
        .all(&app.db)
        .await?;

    for strategy in in_flight {
        let open = orders::Entity::find()
            .filter(orders::Column::StrategyId.eq(strategy.id))
            .filter(orders::Column::Status.eq(SpotOrderStatus::Pending))
            .count(&app.db)
            .await?;
        if batch_resolved(open, app.flights.is_inflight(strategy.id)) {
            info!(strategy_id = strategy.id, "order batch settled, re-arming strategy");
            strategies::Entity::update_many()
                .col_expr(strategies::Column::PendingBatch, Expr::value(false))
                .col_expr(strategies::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(strategies::Column::Id.eq(strategy.id))
                .exec(&app.db)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_venue_statuses_resolve_locally() {
        assert_eq!(
            map_spot_status(VenueOrderStatus::Filled),
            Some(SpotOrderStatus::Filled)
        );
        assert_eq!(
            map_spot_status(VenueOrderStatus::Expired),
            Some(SpotOrderStatus::Cancelled)
        );
        assert_eq!(
            map_spot_status(VenueOrderStatus::Rejected),
            Some(SpotOrderStatus::Cancelled)
        );
    }

    #[test]
    fn live_venue_statuses_stay_pending() {
        assert_eq!(map_spot_status(VenueOrderStatus::New), None);
        assert_eq!(map_spot_status(VenueOrderStatus::PartiallyFilled), None);
    }

    #[test]
    fn in_flight_execution_blocks_re_arming() {
        // Zero order rows while the execution runs means the batch is still
        // being placed, not settled.
        assert!(!batch_resolved(0, true));
        assert!(!batch_resolved(2, false));
        assert!(batch_resolved(0, false));
    }
}
