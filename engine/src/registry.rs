//! Process-wide registries: the per-strategy single-flight guard and the
//! last-known-price table.
//!
//! Both own their internal maps; callers only see the narrow public surface,
//! and every mutation is key-scoped.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// At-most-one-in-flight-execution guard, keyed by strategy id.
///
/// `try_acquire` hands out an RAII permit; while the permit lives, repeated
/// triggers for the same key get `None` and must do nothing.
#[derive(Clone, Default)]
pub struct SingleFlight {
    inflight: Arc<Mutex<HashSet<u64>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: u64) -> Option<FlightPermit> {
        let mut inflight = self.inflight.lock().expect("single-flight lock poisoned");
        if inflight.insert(key) {
            Some(FlightPermit {
                key,
                inflight: self.inflight.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_inflight(&self, key: u64) -> bool {
        self.inflight
            .lock()
            .expect("single-flight lock poisoned")
            .contains(&key)
    }
}

pub struct FlightPermit {
    key: u64,
    inflight: Arc<Mutex<HashSet<u64>>>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(&self.key);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    pub price: f64,
    /// Milliseconds since the epoch, venue clock.
    pub timestamp: i64,
}

/// Last observed price per `(symbol, subscriber)`, for read-side consumers.
#[derive(Default)]
pub struct PriceTable {
    inner: RwLock<HashMap<(String, i64), PricePoint>>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, symbol: &str, user_id: i64, price: f64, timestamp: i64) {
        let mut table = self.inner.write().await;
        table.insert(
            (symbol.to_string(), user_id),
            PricePoint { price, timestamp },
        );
    }

    pub async fn get(&self, symbol: &str, user_id: i64) -> Option<PricePoint> {
        let table = self.inner.read().await;
        table.get(&(symbol.to_string(), user_id)).copied()
    }

    /// All prices visible to one user, sorted by symbol.
    pub async fn prices_for_user(&self, user_id: i64) -> Vec<(String, PricePoint)> {
        let table = self.inner.read().await;
        let mut rows: Vec<_> = table
            .iter()
            .filter(|((_, uid), _)| *uid == user_id)
            .map(|((symbol, _), point)| (symbol.clone(), *point))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub async fn remove_user(&self, user_id: i64) {
        let mut table = self.inner.write().await;
        table.retain(|(_, uid), _| *uid != user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_permit_held() {
        let flights = SingleFlight::new();
        let permit = flights.try_acquire(7).unwrap();
        assert!(flights.try_acquire(7).is_none());
        assert!(flights.is_inflight(7));
        drop(permit);
        assert!(flights.try_acquire(7).is_some());
    }

    #[test]
    fn keys_are_independent() {
        let flights = SingleFlight::new();
        let _a = flights.try_acquire(1).unwrap();
        assert!(flights.try_acquire(2).is_some());
    }

    #[tokio::test]
    async fn price_table_is_keyed_by_symbol_and_user() {
        let table = PriceTable::new();
        table.update("BTCUSDT", 1, 50000.0, 1).await;
        table.update("BTCUSDT", 2, 50001.0, 2).await;

        assert_eq!(table.get("BTCUSDT", 1).await.unwrap().price, 50000.0);
        assert_eq!(table.get("BTCUSDT", 2).await.unwrap().price, 50001.0);
        assert!(table.get("ETHUSDT", 1).await.is_none());

        let rows = table.prices_for_user(1).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "BTCUSDT");
    }
}
