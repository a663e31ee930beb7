//! Engine behavior tests against a scripted in-memory exchange.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use engine::exchange::{
    DepthSnapshot, ExchangeClient, ExchangeError, ExchangeResult, Market, OrderSnapshot,
    PriceTick, StreamKind, SymbolRules,
};
use engine::registry::SingleFlight;
use engine::spot::placement::{compute_levels, place_batch, validate_fractions};
use shared::{Decomposition, MarginMode, OrderSide, VenueOrderStatus};

#[derive(Debug, Clone)]
struct PlacedCall {
    symbol: String,
    side: OrderSide,
    price: f64,
    quantity: f64,
}

/// Scripted exchange: records placements and cancels, optionally rejecting
/// the nth placement.
#[derive(Default)]
struct MockExchange {
    placed: Mutex<Vec<PlacedCall>>,
    cancelled: Mutex<Vec<String>>,
    fail_on_placement: Option<usize>,
    placement_counter: AtomicUsize,
}

impl MockExchange {
    fn new() -> Self {
        Self::default()
    }

    fn failing_on(n: usize) -> Self {
        Self {
            fail_on_placement: Some(n),
            ..Self::default()
        }
    }

    fn placements(&self) -> Vec<PlacedCall> {
        self.placed.lock().unwrap().clone()
    }

    fn cancellations(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_price(&self, _market: Market, _symbol: &str) -> ExchangeResult<f64> {
        Ok(50_000.0)
    }

    async fn get_depth(
        &self,
        _market: Market,
        _symbol: &str,
        _limit: u32,
    ) -> ExchangeResult<DepthSnapshot> {
        Ok(DepthSnapshot {
            bids: vec![(49_999.0, 1.0)],
            asks: vec![(50_001.0, 1.0)],
        })
    }

    async fn get_symbol_rules(
        &self,
        _market: Market,
        _symbol: &str,
    ) -> ExchangeResult<SymbolRules> {
        Ok(SymbolRules {
            price_precision: 2,
            qty_precision: 4,
            min_notional: 10.0,
        })
    }

    async fn place_limit_order(
        &self,
        _market: Market,
        symbol: &str,
        side: OrderSide,
        price: f64,
        quantity: f64,
    ) -> ExchangeResult<String> {
        let n = self.placement_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_placement == Some(n) {
            return Err(ExchangeError::Rejected(format!("order {n} rejected")));
        }
        self.placed.lock().unwrap().push(PlacedCall {
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
        });
        Ok(format!("mock-{n}"))
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        stop_price: f64,
        quantity: f64,
    ) -> ExchangeResult<String> {
        self.place_limit_order(Market::Futures, symbol, side, stop_price, quantity)
            .await
    }

    async fn cancel_order(
        &self,
        _market: Market,
        _symbol: &str,
        order_id: &str,
    ) -> ExchangeResult<()> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }

    async fn get_order(
        &self,
        _market: Market,
        _symbol: &str,
        order_id: &str,
    ) -> ExchangeResult<OrderSnapshot> {
        Ok(OrderSnapshot {
            exchange_order_id: order_id.to_string(),
            status: VenueOrderStatus::New,
            executed_qty: 0.0,
            avg_price: 0.0,
            commission: 0.0,
        })
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> ExchangeResult<()> {
        Ok(())
    }

    async fn set_margin_mode(&self, _symbol: &str, _mode: MarginMode) -> ExchangeResult<()> {
        Ok(())
    }

    async fn connect_stream(
        &self,
        _kind: StreamKind,
        symbol: &str,
    ) -> ExchangeResult<mpsc::Receiver<PriceTick>> {
        let (tx, rx) = mpsc::channel(8);
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            let _ = tx
                .send(PriceTick {
                    symbol,
                    price: 50_001.0,
                    timestamp: 0,
                })
                .await;
        });
        Ok(rx)
    }
}

fn rules() -> SymbolRules {
    SymbolRules {
        price_precision: 2,
        qty_precision: 4,
        min_notional: 10.0,
    }
}

/// SELL 50000 with fractions 50/50 and gaps 0 and +10bps places exactly two
/// sell orders at 50000 and 50050 with the quantity split.
#[tokio::test]
async fn iceberg_batch_places_expected_levels() {
    let exchange = MockExchange::new();
    let levels = compute_levels(
        OrderSide::Sell,
        Decomposition::Iceberg,
        50_000.0,
        1.0,
        Some(vec![0.5, 0.5]),
        Some(vec![0.0, 10.0]),
        None,
        None,
        rules(),
        &[1.0],
        &[0.0],
    )
    .unwrap();

    let placed = place_batch(&exchange, Market::Spot, "BTCUSDT", OrderSide::Sell, &levels)
        .await
        .unwrap();

    assert_eq!(placed.len(), 2);
    let calls = exchange.placements();
    assert_eq!(calls[0].price, 50_000.0);
    assert_eq!(calls[1].price, 50_050.0);
    assert_eq!(calls[0].quantity, 0.5);
    assert_eq!(calls[1].quantity, 0.5);
    assert!(calls.iter().all(|c| c.side == OrderSide::Sell));
    assert!(calls.iter().all(|c| c.symbol == "BTCUSDT"));
    assert!(exchange.cancellations().is_empty());
}

/// Order 2 of 3 failing rolls back order 1 and never attempts order 3.
#[tokio::test]
async fn batch_rolls_back_on_mid_batch_failure() {
    let exchange = MockExchange::failing_on(2);
    let levels = compute_levels(
        OrderSide::Sell,
        Decomposition::Iceberg,
        50_000.0,
        3.0,
        Some(vec![0.4, 0.3, 0.3]),
        Some(vec![0.0, 5.0, 10.0]),
        None,
        None,
        rules(),
        &[1.0],
        &[0.0],
    )
    .unwrap();

    let result = place_batch(&exchange, Market::Spot, "BTCUSDT", OrderSide::Sell, &levels).await;

    assert!(result.is_err());
    assert_eq!(exchange.placements().len(), 1);
    assert_eq!(exchange.cancellations(), vec!["mock-1".to_string()]);
    // Placement 3 was never attempted.
    assert_eq!(exchange.placement_counter.load(Ordering::SeqCst), 2);
}

/// A bad fraction configuration is rejected before any exchange call.
#[tokio::test]
async fn invalid_fractions_never_reach_the_exchange() {
    let exchange = MockExchange::new();
    let result = compute_levels(
        OrderSide::Sell,
        Decomposition::Iceberg,
        50_000.0,
        1.0,
        Some(vec![0.5, 0.4]),
        Some(vec![0.0, 10.0]),
        None,
        None,
        rules(),
        &[1.0],
        &[0.0],
    );
    assert!(result.is_err());
    assert!(validate_fractions(&[0.5, 0.4]).is_err());
    assert!(exchange.placements().is_empty());
}

/// Two ticks racing on the same spot strategy both reach dispatch, but only
/// one wins the flight permit, so only one execution runs. The loser's
/// permit request fails even though its tick arrived before the winner
/// finished.
#[tokio::test]
async fn racing_ticks_dispatch_exactly_one_execution() {
    let flights = SingleFlight::new();

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let flights = flights.clone();
            tokio::spawn(async move { flights.try_acquire(11) })
        })
        .collect();

    let mut permits = Vec::new();
    for task in tasks {
        if let Some(permit) = task.await.unwrap() {
            permits.push(permit);
        }
    }
    assert_eq!(permits.len(), 1);

    // Once the winning execution finishes, the strategy can fire again.
    drop(permits);
    assert!(flights.try_acquire(11).is_some());
}

/// While a permit is held, concurrent triggers for the same strategy are
/// rejected; other strategies are unaffected.
#[tokio::test]
async fn single_flight_blocks_concurrent_execution() {
    let flights = SingleFlight::new();
    let permit = flights.try_acquire(42).expect("first acquire");

    let contender = {
        let flights = flights.clone();
        tokio::spawn(async move { flights.try_acquire(42).is_some() })
    };
    assert!(!contender.await.unwrap());
    assert!(flights.try_acquire(7).is_some());

    drop(permit);
    assert!(flights.try_acquire(42).is_some());
}

/// The mock stream closes after one tick; the receiver reports it so the
/// feed's reconnect path has a signal to act on.
#[tokio::test]
async fn stream_receiver_closes_on_disconnect() {
    let exchange = MockExchange::new();
    let mut rx = exchange
        .connect_stream(StreamKind::Trade, "BTCUSDT")
        .await
        .unwrap();

    let tick = rx.recv().await.expect("one tick");
    assert_eq!(tick.symbol, "BTCUSDT");
    assert_eq!(tick.price, 50_001.0);
    assert!(rx.recv().await.is_none());
}
