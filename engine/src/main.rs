use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::exchange::{binance::BinanceClient, ExchangeClient};
use engine::feed::PriceFeed;
use engine::handler::EngineTickHandler;
use engine::runtime;
use engine::state::AppState;
use shared::{get_db_connection, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let db = get_db_connection(&config.database_url).await?;

    let exchange: Arc<dyn ExchangeClient> = Arc::new(BinanceClient::new(&config));
    let feed = PriceFeed::new(
        exchange.clone(),
        db.clone(),
        config.feed_reconnect_secs,
        config.price_persist_secs,
    );

    let app = AppState::new(config, db, exchange, feed.clone());
    feed.set_handler(EngineTickHandler::new(app.clone()));

    runtime::recover_subscriptions(&app).await?;
    let _loops = runtime::spawn_loops(app);

    info!("execution engine started");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}
