//! Price feed multiplexer.
//!
//! One supervised websocket task per `(symbol, stream kind)` pair, no matter
//! how many strategies watch that symbol. Each task reconnects with a fixed
//! backoff when the stream drops, dispatches every tick to the registered
//! handler, and persists the latest price at most once per second.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter,
};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::exchange::{ExchangeClient, Market, PriceTick, StreamKind};
use shared::entity::symbol_prices;
use shared::num::to_decimal;

/// Consumer of live ticks. The engine registers one handler that fans ticks
/// out to the spot and futures trigger paths.
#[async_trait]
pub trait TickHandler: Send + Sync {
    async fn on_tick(&self, market: Market, tick: &PriceTick);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FeedKey {
    symbol: String,
    kind: StreamKind,
}

struct FeedEntry {
    subscribers: HashSet<u64>,
    task: JoinHandle<()>,
}

pub struct PriceFeed {
    exchange: Arc<dyn ExchangeClient>,
    db: DatabaseConnection,
    handler: OnceLock<Arc<dyn TickHandler>>,
    feeds: Mutex<HashMap<FeedKey, FeedEntry>>,
    last_persisted: Mutex<HashMap<String, Instant>>,
    reconnect_delay: Duration,
    persist_interval: Duration,
}

impl PriceFeed {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        db: DatabaseConnection,
        reconnect_secs: u64,
        persist_secs: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            exchange,
            db,
            handler: OnceLock::new(),
            feeds: Mutex::new(HashMap::new()),
            last_persisted: Mutex::new(HashMap::new()),
            reconnect_delay: Duration::from_secs(reconnect_secs),
            persist_interval: Duration::from_secs(persist_secs),
        })
    }

    /// Register the tick handler. Must happen before the first subscription;
    /// ticks arriving earlier are dropped.
    pub fn set_handler(&self, handler: Arc<dyn TickHandler>) {
        if self.handler.set(handler).is_err() {
            warn!("tick handler already registered");
        }
    }

    /// Ensure a feed task exists for `(symbol, kind)` and record the
    /// subscriber. Idempotent per subscriber.
    pub fn subscribe(self: &Arc<Self>, kind: StreamKind, symbol: &str, subscriber: u64) {
        let key = FeedKey {
            symbol: symbol.to_uppercase(),
            kind,
        };
        let mut feeds = self.feeds.lock().expect("feed registry lock poisoned");
        if let Some(entry) = feeds.get_mut(&key) {
            entry.subscribers.insert(subscriber);
            return;
        }

        info!(symbol = %key.symbol, ?kind, "starting price feed");
        let task = self.clone().spawn_feed_task(key.clone());
        let mut subscribers = HashSet::new();
        subscribers.insert(subscriber);
        feeds.insert(key, FeedEntry { subscribers, task });
    }

    pub fn unsubscribe(&self, kind: StreamKind, symbol: &str, subscriber: u64) {
        let key = FeedKey {
            symbol: symbol.to_uppercase(),
            kind,
        };
        let mut feeds = self.feeds.lock().expect("feed registry lock poisoned");
        if let Some(entry) = feeds.get_mut(&key) {
            entry.subscribers.remove(&subscriber);
        }
    }

    /// Drop subscribers of one stream kind that are no longer in the valid
    /// set. The periodic sweep uses this to evict strategies that were
    /// disabled or deleted without an explicit unsubscribe.
    pub fn retain_subscribers(&self, kind: StreamKind, valid: &HashSet<(String, u64)>) {
        let mut feeds = self.feeds.lock().expect("feed registry lock poisoned");
        for (key, entry) in feeds.iter_mut() {
            if key.kind != kind {
                continue;
            }
            entry
                .subscribers
                .retain(|id| valid.contains(&(key.symbol.clone(), *id)));
        }
    }

    /// Stop feed tasks that lost their last subscriber.
    pub fn sweep(&self) {
        let mut feeds = self.feeds.lock().expect("feed registry lock poisoned");
        feeds.retain(|key, entry| {
            if entry.subscribers.is_empty() {
                info!(symbol = %key.symbol, kind = ?key.kind, "stopping idle price feed");
                entry.task.abort();
                false
            } else {
                true
            }
        });
    }

    pub fn active_feeds(&self) -> usize {
        self.feeds.lock().expect("feed registry lock poisoned").len()
    }

    fn spawn_feed_task(self: Arc<Self>, key: FeedKey) -> JoinHandle<()> {
        tokio::spawn(async move {
            let market = match key.kind {
                StreamKind::Trade => Market::Spot,
                StreamKind::MarkPrice => Market::Futures,
            };
            loop {
                match self.exchange.connect_stream(key.kind, &key.symbol).await {
                    Ok(mut rx) => {
                        debug!(symbol = %key.symbol, kind = ?key.kind, "price stream connected");
                        while let Some(tick) = rx.recv().await {
                            self.dispatch(market, &tick).await;
                        }
                        warn!(symbol = %key.symbol, kind = ?key.kind, "price stream ended, reconnecting");
                    }
                    Err(e) => {
                        warn!(symbol = %key.symbol, kind = ?key.kind, error = %e, "price stream connect failed");
                    }
                }
                sleep(self.reconnect_delay).await;
            }
        })
    }

    async fn dispatch(&self, market: Market, tick: &PriceTick) {
        if let Some(handler) = self.handler.get() {
            handler.on_tick(market, tick).await;
        }
        if self.should_persist(&tick.symbol) {
            if let Err(e) = self.persist_price(tick).await {
                warn!(symbol = %tick.symbol, error = %e, "failed to persist price");
            }
        }
    }

    /// At most one write per symbol per persist interval.
    fn should_persist(&self, symbol: &str) -> bool {
        let mut last = self
            .last_persisted
            .lock()
            .expect("persist throttle lock poisoned");
        let now = Instant::now();
        match last.get(symbol) {
            Some(at) if now.duration_since(*at) < self.persist_interval => false,
            _ => {
                last.insert(symbol.to_string(), now);
                true
            }
        }
    }

    async fn persist_price(&self, tick: &PriceTick) -> anyhow::Result<()> {
        let existing = symbol_prices::Entity::find()
            .filter(symbol_prices::Column::Symbol.eq(tick.symbol.clone()))
            .one(&self.db)
            .await?;

        match existing {
            Some(row) => {
                let mut row: symbol_prices::ActiveModel = row.into();
                row.price = Set(to_decimal(tick.price));
                row.updated_at = Set(Some(Utc::now()));
                row.update(&self.db).await?;
            }
            None => {
                let row = symbol_prices::ActiveModel {
                    symbol: Set(tick.symbol.clone()),
                    price: Set(to_decimal(tick.price)),
                    updated_at: Set(Some(Utc::now())),
                    ..Default::default()
                };
                row.insert(&self.db).await?;
            }
        }
        Ok(())
    }
}
