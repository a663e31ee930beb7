//! Websocket price streams.
//!
//! One connection per symbol and stream kind. The reader task parses each
//! frame into a [`PriceTick`] and forwards it over a bounded channel; when
//! the socket drops, the channel closes and the caller reconnects.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::{ExchangeError, ExchangeResult, PriceTick, StreamKind};

const TICK_BUFFER: usize = 1024;

/// Connect and spawn the reader task. Fails fast if the initial connect
/// fails so the caller's backoff loop sees it.
pub async fn open_price_stream(
    url: String,
    symbol: String,
    kind: StreamKind,
) -> ExchangeResult<mpsc::Receiver<PriceTick>> {
    let (ws, _) = connect_async(&url)
        .await
        .map_err(|e| ExchangeError::Stream(format!("connect {url}: {e}")))?;

    let (tx, rx) = mpsc::channel(TICK_BUFFER);

    tokio::spawn(async move {
        let (mut sink, mut source) = ws.split();

        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Some(tick) = parse_tick(&symbol, kind, &text) {
                        if tx.send(tick).await.is_err() {
                            // Receiver dropped; subscriber went away.
                            break;
                        }
                    }
                }
                Ok(Message::Ping(payload)) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!(symbol, "price stream closed by venue");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(symbol, error = %e, "price stream read failed");
                    break;
                }
            }
        }
        // Dropping tx closes the channel and signals the feed to reconnect.
    });

    Ok(rx)
}

/// Decode one frame into a tick. Tagged payloads are decoded once here at
/// the boundary; everything downstream works with the typed tick.
fn parse_tick(symbol: &str, kind: StreamKind, text: &str) -> Option<PriceTick> {
    let value: Value = serde_json::from_str(text).ok()?;
    let price: f64 = value.get("p")?.as_str()?.parse().ok()?;
    let timestamp = match kind {
        StreamKind::Trade => value.get("T")?.as_i64()?,
        StreamKind::MarkPrice => value.get("E")?.as_i64()?,
    };
    Some(PriceTick {
        symbol: symbol.to_string(),
        price,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agg_trade_frame() {
        let frame = r#"{"e":"aggTrade","E":1700000000100,"s":"BTCUSDT","p":"50001.10","q":"0.5","T":1700000000099}"#;
        let tick = parse_tick("BTCUSDT", StreamKind::Trade, frame).unwrap();
        assert_eq!(tick.price, 50001.10);
        assert_eq!(tick.timestamp, 1700000000099);
    }

    #[test]
    fn parses_mark_price_frame() {
        let frame = r#"{"e":"markPriceUpdate","E":1700000000200,"s":"BTCUSDT","p":"49999.95"}"#;
        let tick = parse_tick("BTCUSDT", StreamKind::MarkPrice, frame).unwrap();
        assert_eq!(tick.price, 49999.95);
        assert_eq!(tick.timestamp, 1700000000200);
    }

    #[test]
    fn ignores_frames_without_price() {
        let frame = r#"{"result":null,"id":1}"#;
        assert!(parse_tick("BTCUSDT", StreamKind::Trade, frame).is_none());
    }
}
