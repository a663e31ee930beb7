//! Price-level computation, sizing, and batch placement for spot strategies.
//!
//! Level math is pure and unit-tested; [`place_batch`] does the exchange I/O
//! and owns the all-or-nothing rollback.

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::exchange::{DepthSnapshot, ExchangeClient, Market, SymbolRules};
use shared::{Decomposition, OrderSide};

const FRACTION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderLevel {
    pub price: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub level: OrderLevel,
    pub exchange_order_id: String,
}

/// Quantity fractions must be positive and sum to 1 within tolerance.
/// Rejected configurations never reach order placement.
pub fn validate_fractions(fractions: &[f64]) -> Result<()> {
    if fractions.is_empty() {
        bail!("no quantity fractions configured");
    }
    if fractions.iter().any(|f| *f <= 0.0) {
        bail!("quantity fractions must be positive");
    }
    let sum: f64 = fractions.iter().sum();
    if (sum - 1.0).abs() > FRACTION_TOLERANCE {
        bail!("quantity fractions sum to {sum}, expected 1.0");
    }
    Ok(())
}

/// Decode a JSON array column (`layer_fractions`, `layer_gaps_bps`,
/// `depth_anchors`). `None` means the strategy uses the configured defaults.
pub fn parse_json_list<T: DeserializeOwned>(raw: Option<&String>) -> Result<Option<Vec<T>>> {
    match raw {
        Some(text) => {
            let list = serde_json::from_str(text).context("invalid layer configuration")?;
            Ok(Some(list))
        }
        None => Ok(None),
    }
}

pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

fn round_up_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).ceil() / factor
}

/// Direction prices move away from the trigger: SELL ladders up, BUY down.
fn gap_sign(side: OrderSide) -> f64 {
    match side {
        OrderSide::Sell => 1.0,
        OrderSide::Buy => -1.0,
    }
}

/// Compute the limit order levels for one triggered spot strategy.
///
/// `depth` is only consulted for custom decomposition; a book shallower than
/// a requested anchor falls back to the trigger price for that level.
#[allow(clippy::too_many_arguments)]
pub fn compute_levels(
    side: OrderSide,
    decomposition: Decomposition,
    trigger_price: f64,
    total_quantity: f64,
    fractions: Option<Vec<f64>>,
    gaps_bps: Option<Vec<f64>>,
    depth_anchors: Option<Vec<usize>>,
    depth: Option<&DepthSnapshot>,
    rules: SymbolRules,
    default_fractions: &[f64],
    default_gaps_bps: &[f64],
) -> Result<Vec<OrderLevel>> {
    let raw: Vec<(f64, f64)> = match decomposition {
        Decomposition::Simple => vec![(trigger_price, total_quantity)],
        Decomposition::Iceberg => {
            let fractions = fractions.unwrap_or_else(|| default_fractions.to_vec());
            let gaps = gaps_bps.unwrap_or_else(|| default_gaps_bps.to_vec());
            validate_fractions(&fractions)?;
            if fractions.len() != gaps.len() {
                bail!(
                    "{} quantity fractions but {} price gaps",
                    fractions.len(),
                    gaps.len()
                );
            }
            let sign = gap_sign(side);
            fractions
                .iter()
                .zip(gaps.iter())
                .map(|(fraction, gap)| {
                    let price = trigger_price * (1.0 + sign * gap / 10_000.0);
                    (price, total_quantity * fraction)
                })
                .collect()
        }
        Decomposition::Custom => {
            let anchors =
                depth_anchors.ok_or_else(|| anyhow!("custom decomposition needs depth anchors"))?;
            let fractions = fractions.unwrap_or_else(|| default_fractions.to_vec());
            validate_fractions(&fractions)?;
            if fractions.len() != anchors.len() {
                bail!(
                    "{} quantity fractions but {} depth anchors",
                    fractions.len(),
                    anchors.len()
                );
            }
            fractions
                .iter()
                .zip(anchors.iter())
                .map(|(fraction, anchor)| {
                    let price = depth
                        .and_then(|d| d.price_at(side, *anchor))
                        .unwrap_or(trigger_price);
                    (price, total_quantity * fraction)
                })
                .collect()
        }
    };

    Ok(raw
        .into_iter()
        .map(|(price, quantity)| size_level(price, quantity, rules))
        .collect())
}

/// Round to the symbol's precision and bump sub-minimum-notional quantities
/// up to the smallest acceptable size.
fn size_level(price: f64, quantity: f64, rules: SymbolRules) -> OrderLevel {
    let price = round_to(price, rules.price_precision);
    let mut quantity = round_to(quantity, rules.qty_precision);
    if price > 0.0 && price * quantity < rules.min_notional {
        quantity = round_up_to(rules.min_notional / price, rules.qty_precision);
    }
    OrderLevel { price, quantity }
}

/// Place every level in order. If any placement fails, cancel everything
/// already placed in this batch and report the failure.
pub async fn place_batch(
    exchange: &dyn ExchangeClient,
    market: Market,
    symbol: &str,
    side: OrderSide,
    levels: &[OrderLevel],
) -> Result<Vec<PlacedOrder>> {
    let mut placed: Vec<PlacedOrder> = Vec::with_capacity(levels.len());
    for level in levels {
        match exchange
            .place_limit_order(market, symbol, side, level.price, level.quantity)
            .await
        {
            Ok(exchange_order_id) => placed.push(PlacedOrder {
                level: *level,
                exchange_order_id,
            }),
            Err(e) => {
                cancel_batch(exchange, market, symbol, &placed).await;
                return Err(anyhow!(
                    "placing order {} of {} failed: {e}",
                    placed.len() + 1,
                    levels.len()
                ));
            }
        }
    }
    Ok(placed)
}

/// Best-effort cancel of every order in a batch. Cancel failures are logged,
/// not propagated; reconciliation picks up any stragglers.
pub async fn cancel_batch(
    exchange: &dyn ExchangeClient,
    market: Market,
    symbol: &str,
    placed: &[PlacedOrder],
) {
    for order in placed {
        if let Err(e) = exchange
            .cancel_order(market, symbol, &order.exchange_order_id)
            .await
        {
            warn!(
                symbol,
                order_id = %order.exchange_order_id,
                error = %e,
                "failed to cancel order while rolling back batch"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> SymbolRules {
        SymbolRules {
            price_precision: 2,
            qty_precision: 4,
            min_notional: 10.0,
        }
    }

    #[test]
    fn rejects_fractions_not_summing_to_one() {
        assert!(validate_fractions(&[0.5, 0.4]).is_err());
        assert!(validate_fractions(&[]).is_err());
        assert!(validate_fractions(&[0.5, -0.5, 1.0]).is_err());
        assert!(validate_fractions(&[0.35, 0.25, 0.2, 0.1, 0.1]).is_ok());
    }

    #[test]
    fn simple_is_one_level_at_trigger() {
        let levels = compute_levels(
            OrderSide::Buy,
            Decomposition::Simple,
            50_000.0,
            1.0,
            None,
            None,
            None,
            None,
            rules(),
            &[1.0],
            &[0.0],
        )
        .unwrap();
        assert_eq!(levels, vec![OrderLevel { price: 50_000.0, quantity: 1.0 }]);
    }

    #[test]
    fn sell_iceberg_ladders_above_trigger() {
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
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].price, 50_000.0);
        assert!((levels[1].price - 50_050.0).abs() < 0.01);
        assert_eq!(levels[0].quantity, 0.5);
        assert_eq!(levels[1].quantity, 0.5);
    }

    #[test]
    fn buy_iceberg_ladders_below_trigger() {
        let levels = compute_levels(
            OrderSide::Buy,
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
        assert!((levels[1].price - 49_950.0).abs() < 0.01);
    }

    #[test]
    fn iceberg_rejects_length_mismatch() {
        let result = compute_levels(
            OrderSide::Sell,
            Decomposition::Iceberg,
            50_000.0,
            1.0,
            Some(vec![0.5, 0.5]),
            Some(vec![0.0]),
            None,
            None,
            rules(),
            &[1.0],
            &[0.0],
        );
        assert!(result.is_err());
    }

    #[test]
    fn custom_reads_book_and_falls_back_when_shallow() {
        let depth = DepthSnapshot {
            bids: vec![(49_990.0, 1.0)],
            asks: vec![(50_010.0, 1.0), (50_020.0, 1.0)],
        };
        let levels = compute_levels(
            OrderSide::Sell,
            Decomposition::Custom,
            50_000.0,
            1.0,
            Some(vec![0.5, 0.3, 0.2]),
            None,
            Some(vec![1, 2, 3]),
            Some(&depth),
            rules(),
            &[1.0],
            &[0.0],
        )
        .unwrap();
        assert_eq!(levels[0].price, 50_010.0);
        assert_eq!(levels[1].price, 50_020.0);
        // Book only has two ask levels; the third falls back to the trigger.
        assert_eq!(levels[2].price, 50_000.0);
    }

    #[test]
    fn sub_notional_quantity_is_bumped_up() {
        let level = size_level(100.0, 0.05, rules());
        // 100 * 0.05 = 5 < 10 min notional -> 10 / 100 = 0.1.
        assert_eq!(level.quantity, 0.1);
    }

    #[test]
    fn prices_and_quantities_are_rounded() {
        let level = size_level(50_000.123456, 0.123456789, rules());
        assert_eq!(level.price, 50_000.12);
        assert_eq!(level.quantity, 0.1235);
    }
}
