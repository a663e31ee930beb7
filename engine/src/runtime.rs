//! Engine startup and supervision: subscription recovery after a restart,
//! the periodic feed sweep, and spawning of all long-running loops.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::exchange::StreamKind;
use crate::state::AppState;
use crate::{dual, futures, spot};
use shared::entity::{futures_strategies, strategies};
use shared::FuturesStatus;

/// Re-register every enabled strategy from the database into the feed, and
/// resume entry monitoring for strategies that were mid-entry when the
/// process stopped.
pub async fn recover_subscriptions(app: &Arc<AppState>) -> Result<()> {
    let spot_rows = strategies::Entity::find()
        .filter(strategies::Column::Enabled.eq(true))
        .filter(strategies::Column::DeletedAt.is_null())
        .all(&app.db)
        .await?;
    let spot_count = spot_rows.len();
    for strategy in spot_rows {
        app.feed
            .subscribe(StreamKind::Trade, &strategy.symbol, strategy.id);
    }

    let futures_rows = futures_strategies::Entity::find()
        .filter(futures_strategies::Column::Enabled.eq(true))
        .filter(futures_strategies::Column::DeletedAt.is_null())
        .filter(futures_strategies::Column::Status.is_in([
            FuturesStatus::Waiting,
            FuturesStatus::Triggered,
            FuturesStatus::PositionOpened,
        ]))
        .all(&app.db)
        .await?;
    let futures_count = futures_rows.len();

    for strategy in futures_rows {
        app.feed
            .subscribe(StreamKind::MarkPrice, &strategy.symbol, strategy.id);

        // A strategy left in `triggered` lost its monitoring task; resume
        // it so placed entry orders are still tracked to completion.
        if strategy.status == FuturesStatus::Triggered {
            if let Some(permit) = app.flights.try_acquire(strategy.id) {
                let app = app.clone();
                let id = strategy.id;
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = futures::monitor::monitor_entry(&app, id).await {
                        warn!(strategy_id = id, error = %e, "resumed entry monitor failed");
                    }
                });
            }
        }
    }

    info!(
        spot = spot_count,
        futures = futures_count,
        "recovered strategy subscriptions"
    );
    Ok(())
}

/// Periodically evict subscribers with no remaining enabled strategy and
/// close connections nobody listens to.
pub fn spawn_feed_sweep_loop(app: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(app.config.feed_sweep_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(&app).await {
                warn!(error = %e, "feed sweep pass failed");
            }
        }
    })
}

async fn sweep_once(app: &Arc<AppState>) -> Result<()> {
    let spot_valid: HashSet<(String, u64)> = strategies::Entity::find()
        .filter(strategies::Column::Enabled.eq(true))
        .filter(strategies::Column::DeletedAt.is_null())
        .all(&app.db)
        .await?
        .into_iter()
        .map(|s| (s.symbol, s.id))
        .collect();

    let futures_valid: HashSet<(String, u64)> = futures_strategies::Entity::find()
        .filter(futures_strategies::Column::Enabled.eq(true))
        .filter(futures_strategies::Column::DeletedAt.is_null())
        .filter(futures_strategies::Column::Status.is_in([
            FuturesStatus::Waiting,
            FuturesStatus::Triggered,
            FuturesStatus::PositionOpened,
        ]))
        .all(&app.db)
        .await?
        .into_iter()
        .map(|s| (s.symbol, s.id))
        .collect();

    app.feed.retain_subscribers(StreamKind::Trade, &spot_valid);
    app.feed
        .retain_subscribers(StreamKind::MarkPrice, &futures_valid);
    app.feed.sweep();
    Ok(())
}

/// Spawn every periodic loop. Handles are returned so the caller can keep
/// them alive for the process lifetime.
pub fn spawn_loops(app: Arc<AppState>) -> Vec<JoinHandle<()>> {
    vec![
        spot::reconcile::spawn_spot_reconcile_loop(app.clone()),
        futures::reconcile::spawn_futures_reconcile_loop(app.clone()),
        dual::products::spawn_product_sync_loop(app.clone()),
        dual::executor::spawn_strategy_execute_loop(app.clone()),
        dual::settlement::spawn_settlement_loop(app.clone()),
        spawn_feed_sweep_loop(app),
    ]
}
