//! Shared engine state handed to every loop and handler as `Arc<AppState>`.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use shared::Config;

use crate::exchange::ExchangeClient;
use crate::feed::PriceFeed;
use crate::registry::{PriceTable, SingleFlight};

pub struct AppState {
    pub config: Config,
    pub db: DatabaseConnection,
    pub exchange: Arc<dyn ExchangeClient>,
    pub feed: Arc<PriceFeed>,
    /// Per-strategy single-flight permits for futures trigger dispatch.
    pub flights: SingleFlight,
    /// Last observed price per (symbol, user), exposed to the read side.
    pub prices: PriceTable,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DatabaseConnection,
        exchange: Arc<dyn ExchangeClient>,
        feed: Arc<PriceFeed>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            db,
            exchange,
            feed,
            flights: SingleFlight::new(),
            prices: PriceTable::new(),
        })
    }
}
