//! Exchange client adapter.
//!
//! The engine talks to the venue exclusively through the [`ExchangeClient`]
//! capability trait. All order operations take `&self` so they can be called
//! concurrently from many strategy tasks.

pub mod auth;
pub mod binance;
pub mod stream;

use async_trait::async_trait;
use shared::{MarginMode, OrderSide, VenueOrderStatus};
use thiserror::Error;
use tokio::sync::mpsc;

/// Which venue segment a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    Spot,
    Futures,
}

/// Which price stream a subscription rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Last traded price (spot strategies trigger on this).
    Trade,
    /// Smoothed mark price (futures strategies trigger on this).
    MarkPrice,
}

#[derive(Debug, Clone)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
    /// Milliseconds since the epoch, venue clock.
    pub timestamp: i64,
}

/// Order book snapshot. Bids descending, asks ascending, `(price, quantity)`.
#[derive(Debug, Clone, Default)]
pub struct DepthSnapshot {
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl DepthSnapshot {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|(p, _)| *p)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|(p, _)| *p)
    }

    /// Price at a 1-based depth index on one side of the book.
    pub fn price_at(&self, side: OrderSide, index: usize) -> Option<f64> {
        if index == 0 {
            return None;
        }
        let levels = match side {
            OrderSide::Buy => &self.bids,
            OrderSide::Sell => &self.asks,
        };
        levels.get(index - 1).map(|(p, _)| *p)
    }
}

/// Per-symbol trading rules fetched from exchange info.
#[derive(Debug, Clone, Copy)]
pub struct SymbolRules {
    pub price_precision: u32,
    pub qty_precision: u32,
    pub min_notional: f64,
}

/// Point-in-time view of one exchange order, from order polling.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub exchange_order_id: String,
    pub status: VenueOrderStatus,
    pub executed_qty: f64,
    pub avg_price: f64,
    pub commission: f64,
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Network-level failure; retryable.
    #[error("transport error: {0}")]
    Transport(String),
    /// The venue understood the request and refused it; not retryable.
    #[error("venue rejected request: {0}")]
    Rejected(String),
    #[error("stream error: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        ExchangeError::Transport(err.to_string())
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Capability interface over the external exchange.
///
/// The production implementation is [`binance::BinanceClient`]; tests use a
/// mock. Streams end when the connection drops; the feed multiplexer owns
/// reconnection.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_price(&self, market: Market, symbol: &str) -> ExchangeResult<f64>;

    async fn get_depth(&self, market: Market, symbol: &str, limit: u32)
        -> ExchangeResult<DepthSnapshot>;

    async fn get_symbol_rules(&self, market: Market, symbol: &str)
        -> ExchangeResult<SymbolRules>;

    /// Returns the exchange-assigned order id.
    async fn place_limit_order(
        &self,
        market: Market,
        symbol: &str,
        side: OrderSide,
        price: f64,
        quantity: f64,
    ) -> ExchangeResult<String>;

    /// Futures only. Returns the exchange-assigned order id.
    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        stop_price: f64,
        quantity: f64,
    ) -> ExchangeResult<String>;

    async fn cancel_order(&self, market: Market, symbol: &str, order_id: &str)
        -> ExchangeResult<()>;

    async fn get_order(&self, market: Market, symbol: &str, order_id: &str)
        -> ExchangeResult<OrderSnapshot>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()>;

    /// Non-fatal when the mode is already set; implementations map that venue
    /// response to `Ok(())`.
    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> ExchangeResult<()>;

    /// Open a price stream for one symbol. The receiver closes on disconnect.
    async fn connect_stream(
        &self,
        kind: StreamKind,
        symbol: &str,
    ) -> ExchangeResult<mpsc::Receiver<PriceTick>>;
}
