//! Binance REST implementation of the exchange capability interface.
//!
//! Spot endpoints live under `/api/v3`, USDT-margined futures under
//! `/fapi/v1`. Signed requests carry `timestamp` + `recvWindow` and an
//! HMAC-SHA256 signature over the query string.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use shared::{Config, MarginMode, OrderSide, VenueOrderStatus};
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    auth, stream, DepthSnapshot, ExchangeClient, ExchangeError, ExchangeResult, Market,
    OrderSnapshot, PriceTick, StreamKind, SymbolRules,
};

// Venue response code for "margin type already set".
const ERR_NO_NEED_TO_CHANGE_MARGIN: i64 = -4046;

pub struct BinanceClient {
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    spot_base: String,
    futures_base: String,
    spot_ws: String,
    futures_ws: String,
    recv_window: u64,
}

impl BinanceClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.binance_api_key.clone(),
            secret_key: config.binance_api_secret.clone(),
            spot_base: config.spot_rest_url.clone(),
            futures_base: config.futures_rest_url.clone(),
            spot_ws: config.spot_ws_url.clone(),
            futures_ws: config.futures_ws_url.clone(),
            recv_window: config.recv_window_ms,
        }
    }

    fn base(&self, market: Market) -> &str {
        match market {
            Market::Spot => &self.spot_base,
            Market::Futures => &self.futures_base,
        }
    }

    fn path(&self, market: Market, endpoint: &str) -> String {
        match market {
            Market::Spot => format!("/api/v3/{endpoint}"),
            Market::Futures => format!("/fapi/v1/{endpoint}"),
        }
    }

    async fn public_get(
        &self,
        market: Market,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> ExchangeResult<Value> {
        let url = format!("{}{}", self.base(market), self.path(market, endpoint));
        let response = self.http.get(&url).query(query).send().await?;
        decode_response(response).await
    }

    async fn signed_request(
        &self,
        method: reqwest::Method,
        market: Market,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<Value> {
        let mut params = params.to_vec();
        let timestamp = Utc::now().timestamp_millis().to_string();
        let recv_window = self.recv_window.to_string();
        params.push(("recvWindow", recv_window));
        params.push(("timestamp", timestamp));

        let query = auth::signed_query(&params, &self.secret_key);
        let url = format!(
            "{}{}?{}",
            self.base(market),
            self.path(market, endpoint),
            query
        );

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        decode_response(response).await
    }
}

async fn decode_response(response: reqwest::Response) -> ExchangeResult<Value> {
    let status = response.status();
    let body = response.text().await?;
    let value: Value = serde_json::from_str(&body)
        .map_err(|e| ExchangeError::Transport(format!("bad json: {e}")))?;

    if !status.is_success() {
        let msg = value
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or(&body)
            .to_string();
        // Keep the venue error code as a prefix so callers can match on it.
        let msg = match value.get("code").and_then(Value::as_i64) {
            Some(code) => format!("{code}: {msg}"),
            None => msg,
        };
        return Err(ExchangeError::Rejected(msg));
    }
    Ok(value)
}

fn venue_error_code(err: &ExchangeError) -> Option<i64> {
    // Rejection messages keep the venue text; the code prefix survives in
    // messages like "-4046: No need to change margin type".
    match err {
        ExchangeError::Rejected(msg) => msg
            .split(':')
            .next()
            .and_then(|head| head.trim().parse().ok()),
        _ => None,
    }
}

fn field_f64(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn parse_levels(value: &Value, key: &str) -> Vec<(f64, f64)> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let price: f64 = row.get(0)?.as_str()?.parse().ok()?;
                    let qty: f64 = row.get(1)?.as_str()?.parse().ok()?;
                    Some((price, qty))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn map_status(raw: &str) -> VenueOrderStatus {
    match raw {
        "NEW" => VenueOrderStatus::New,
        "PARTIALLY_FILLED" => VenueOrderStatus::PartiallyFilled,
        "FILLED" => VenueOrderStatus::Filled,
        "CANCELED" | "PENDING_CANCEL" => VenueOrderStatus::Cancelled,
        "EXPIRED" => VenueOrderStatus::Expired,
        _ => VenueOrderStatus::Rejected,
    }
}

/// Number of decimal places implied by a filter step like "0.01000000".
fn decimals_from_step(step: &str) -> u32 {
    let trimmed = step.trim_end_matches('0');
    match trimmed.split_once('.') {
        Some((_, frac)) => frac.len() as u32,
        None => 0,
    }
}

fn rules_from_symbol_info(market: Market, info: &Value) -> SymbolRules {
    let mut rules = SymbolRules {
        price_precision: 8,
        qty_precision: 8,
        min_notional: 0.0,
    };

    if market == Market::Futures {
        if let Some(p) = info.get("pricePrecision").and_then(Value::as_u64) {
            rules.price_precision = p as u32;
        }
        if let Some(q) = info.get("quantityPrecision").and_then(Value::as_u64) {
            rules.qty_precision = q as u32;
        }
    }

    if let Some(filters) = info.get("filters").and_then(Value::as_array) {
        for filter in filters {
            match filter.get("filterType").and_then(Value::as_str) {
                Some("PRICE_FILTER") => {
                    if let Some(tick) = filter.get("tickSize").and_then(Value::as_str) {
                        rules.price_precision = decimals_from_step(tick);
                    }
                }
                Some("LOT_SIZE") => {
                    if let Some(step) = filter.get("stepSize").and_then(Value::as_str) {
                        rules.qty_precision = decimals_from_step(step);
                    }
                }
                Some("MIN_NOTIONAL") | Some("NOTIONAL") => {
                    let notional = filter
                        .get("minNotional")
                        .or_else(|| filter.get("notional"))
                        .map(|v| match v {
                            Value::String(s) => s.parse().unwrap_or(0.0),
                            Value::Number(n) => n.as_f64().unwrap_or(0.0),
                            _ => 0.0,
                        })
                        .unwrap_or(0.0);
                    rules.min_notional = notional;
                }
                _ => {}
            }
        }
    }
    rules
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn get_price(&self, market: Market, symbol: &str) -> ExchangeResult<f64> {
        let value = self
            .public_get(market, "ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Ok(field_f64(&value, "price"))
    }

    async fn get_depth(
        &self,
        market: Market,
        symbol: &str,
        limit: u32,
    ) -> ExchangeResult<DepthSnapshot> {
        let value = self
            .public_get(
                market,
                "depth",
                &[
                    ("symbol", symbol.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(DepthSnapshot {
            bids: parse_levels(&value, "bids"),
            asks: parse_levels(&value, "asks"),
        })
    }

    async fn get_symbol_rules(
        &self,
        market: Market,
        symbol: &str,
    ) -> ExchangeResult<SymbolRules> {
        let value = self
            .public_get(market, "exchangeInfo", &[("symbol", symbol.to_string())])
            .await?;
        let info = value
            .get("symbols")
            .and_then(Value::as_array)
            .and_then(|symbols| symbols.first())
            .ok_or_else(|| {
                ExchangeError::Rejected(format!("no exchange info for {symbol}"))
            })?;
        Ok(rules_from_symbol_info(market, info))
    }

    async fn place_limit_order(
        &self,
        market: Market,
        symbol: &str,
        side: OrderSide,
        price: f64,
        quantity: f64,
    ) -> ExchangeResult<String> {
        let client_order_id = format!("eng-{}", uuid::Uuid::new_v4().simple());
        let value = self
            .signed_request(
                reqwest::Method::POST,
                market,
                "order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.as_str().to_string()),
                    ("type", "LIMIT".to_string()),
                    ("timeInForce", "GTC".to_string()),
                    ("price", price.to_string()),
                    ("quantity", quantity.to_string()),
                    ("newClientOrderId", client_order_id),
                ],
            )
            .await?;
        let order_id = value
            .get("orderId")
            .and_then(Value::as_i64)
            .ok_or_else(|| ExchangeError::Rejected("missing orderId".to_string()))?;
        debug!(symbol, order_id, "limit order placed");
        Ok(order_id.to_string())
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        stop_price: f64,
        quantity: f64,
    ) -> ExchangeResult<String> {
        let value = self
            .signed_request(
                reqwest::Method::POST,
                Market::Futures,
                "order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.as_str().to_string()),
                    ("type", "STOP_MARKET".to_string()),
                    ("stopPrice", stop_price.to_string()),
                    ("quantity", quantity.to_string()),
                    ("reduceOnly", "true".to_string()),
                ],
            )
            .await?;
        let order_id = value
            .get("orderId")
            .and_then(Value::as_i64)
            .ok_or_else(|| ExchangeError::Rejected("missing orderId".to_string()))?;
        Ok(order_id.to_string())
    }

    async fn cancel_order(
        &self,
        market: Market,
        symbol: &str,
        order_id: &str,
    ) -> ExchangeResult<()> {
        self.signed_request(
            reqwest::Method::DELETE,
            market,
            "order",
            &[
                ("symbol", symbol.to_string()),
                ("orderId", order_id.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_order(
        &self,
        market: Market,
        symbol: &str,
        order_id: &str,
    ) -> ExchangeResult<OrderSnapshot> {
        let value = self
            .signed_request(
                reqwest::Method::GET,
                market,
                "order",
                &[
                    ("symbol", symbol.to_string()),
                    ("orderId", order_id.to_string()),
                ],
            )
            .await?;

        let executed_qty = field_f64(&value, "executedQty");
        // Spot reports cumulative quote volume instead of an average price.
        let avg_price = match market {
            Market::Futures => field_f64(&value, "avgPrice"),
            Market::Spot => {
                let quote = field_f64(&value, "cummulativeQuoteQty");
                if executed_qty > 0.0 {
                    quote / executed_qty
                } else {
                    0.0
                }
            }
        };

        Ok(OrderSnapshot {
            exchange_order_id: order_id.to_string(),
            status: map_status(value.get("status").and_then(Value::as_str).unwrap_or("")),
            executed_qty,
            avg_price,
            // The order endpoint does not expose commission; fills are
            // costed with the configured taker rate downstream.
            commission: 0.0,
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        self.signed_request(
            reqwest::Method::POST,
            Market::Futures,
            "leverage",
            &[
                ("symbol", symbol.to_string()),
                ("leverage", leverage.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> ExchangeResult<()> {
        let result = self
            .signed_request(
                reqwest::Method::POST,
                Market::Futures,
                "marginType",
                &[
                    ("symbol", symbol.to_string()),
                    ("marginType", mode.as_str().to_string()),
                ],
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if venue_error_code(&e) == Some(ERR_NO_NEED_TO_CHANGE_MARGIN) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn connect_stream(
        &self,
        kind: StreamKind,
        symbol: &str,
    ) -> ExchangeResult<mpsc::Receiver<PriceTick>> {
        let lower = symbol.to_lowercase();
        let url = match kind {
            StreamKind::Trade => format!("{}/{}@aggTrade", self.spot_ws, lower),
            StreamKind::MarkPrice => format!("{}/{}@markPrice@1s", self.futures_ws, lower),
        };
        stream::open_price_stream(url, symbol.to_string(), kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_size_decimals() {
        assert_eq!(decimals_from_step("0.01000000"), 2);
        assert_eq!(decimals_from_step("0.00100000"), 3);
        assert_eq!(decimals_from_step("1.00000000"), 0);
        assert_eq!(decimals_from_step("1"), 0);
    }

    #[test]
    fn status_mapping_covers_terminal_states() {
        assert_eq!(map_status("NEW"), VenueOrderStatus::New);
        assert_eq!(map_status("FILLED"), VenueOrderStatus::Filled);
        assert_eq!(map_status("CANCELED"), VenueOrderStatus::Cancelled);
        assert_eq!(map_status("EXPIRED"), VenueOrderStatus::Expired);
        assert_eq!(map_status("REJECTED"), VenueOrderStatus::Rejected);
    }

    #[test]
    fn futures_rules_prefer_declared_precisions() {
        let info: Value = serde_json::from_str(
            r#"{"pricePrecision":2,"quantityPrecision":3,
                "filters":[{"filterType":"MIN_NOTIONAL","notional":"5"}]}"#,
        )
        .unwrap();
        let rules = rules_from_symbol_info(Market::Futures, &info);
        assert_eq!(rules.price_precision, 2);
        assert_eq!(rules.qty_precision, 3);
        assert_eq!(rules.min_notional, 5.0);
    }

    #[test]
    fn spot_rules_come_from_filters() {
        let info: Value = serde_json::from_str(
            r#"{"filters":[
                {"filterType":"PRICE_FILTER","tickSize":"0.01000000"},
                {"filterType":"LOT_SIZE","stepSize":"0.00001000"},
                {"filterType":"NOTIONAL","minNotional":"10.00000000"}]}"#,
        )
        .unwrap();
        let rules = rules_from_symbol_info(Market::Spot, &info);
        assert_eq!(rules.price_precision, 2);
        assert_eq!(rules.qty_precision, 5);
        assert_eq!(rules.min_notional, 10.0);
    }

    #[test]
    fn rejection_code_extraction() {
        let err = ExchangeError::Rejected("-4046: No need to change margin type.".to_string());
        assert_eq!(venue_error_code(&err), Some(-4046));
        let err = ExchangeError::Transport("timeout".to_string());
        assert_eq!(venue_error_code(&err), None);
    }
}
