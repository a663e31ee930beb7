//! Fan-out from the price feed into the spot and futures trigger paths.
//!
//! Tick handling reads strategy state but never awaits exchange I/O; each
//! matched strategy is executed on its own spawned task.

use std::sync::Arc;

use async_trait::async_trait;

use crate::exchange::{Market, PriceTick};
use crate::feed::TickHandler;
use crate::state::AppState;
use crate::{futures, spot};

pub struct EngineTickHandler {
    app: Arc<AppState>,
}

impl EngineTickHandler {
    pub fn new(app: Arc<AppState>) -> Arc<Self> {
        Arc::new(Self { app })
    }
}

#[async_trait]
impl TickHandler for EngineTickHandler {
    async fn on_tick(&self, market: Market, tick: &PriceTick) {
        match market {
            Market::Spot => spot::trigger::handle_tick(&self.app, tick).await,
            Market::Futures => futures::trigger::handle_tick(&self.app, tick).await,
        }
    }
}
