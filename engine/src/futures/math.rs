//! Entry, exit, and P&L price math for leveraged strategies.
//!
//! Everything here is pure so the formulas can be pinned by unit tests; the
//! execution paths feed these results straight into order placement.

use anyhow::{bail, Result};

use crate::exchange::{DepthSnapshot, SymbolRules};
use crate::spot::placement::{round_to, validate_fractions, OrderLevel};
use shared::PositionSide;

/// Exit price that covers the configured profit plus round-trip commission.
///
/// `tp_rate_pct` is a percentage (2.0 = 2%); `taker_fee` a per-side rate
/// (0.0004 = 0.04%), charged once on entry and once on exit.
pub fn take_profit_price(entry: f64, side: PositionSide, tp_rate_pct: f64, taker_fee: f64) -> f64 {
    entry * (1.0 + side.sign() * (tp_rate_pct / 100.0 + 2.0 * taker_fee))
}

/// Stop price at the configured loss percentage from entry.
pub fn stop_loss_price(entry: f64, side: PositionSide, sl_rate_pct: f64) -> f64 {
    entry * (1.0 - side.sign() * sl_rate_pct / 100.0)
}

/// Entry anchor from the opposing side of the book: best ask for LONG, best
/// bid for SHORT. A positive offset shades the price in the strategy's
/// favor (lower for LONG, higher for SHORT).
pub fn entry_price_from_depth(
    depth: &DepthSnapshot,
    side: PositionSide,
    offset_bps: f64,
) -> Option<f64> {
    let anchor = match side {
        PositionSide::Long => depth.best_ask()?,
        PositionSide::Short => depth.best_bid()?,
    };
    Some(anchor * (1.0 - side.sign() * offset_bps / 10_000.0))
}

/// Decompose a notional quantity into layered entry orders.
///
/// Gap ladders walk away from the anchor in the favorable direction (below
/// for LONG, above for SHORT). Each layer's base quantity is its share of
/// the notional divided by its own price.
pub fn entry_layers(
    anchor_price: f64,
    notional: f64,
    side: PositionSide,
    fractions: &[f64],
    gaps_bps: &[f64],
    rules: SymbolRules,
) -> Result<Vec<OrderLevel>> {
    validate_fractions(fractions)?;
    if fractions.len() != gaps_bps.len() {
        bail!(
            "{} quantity fractions but {} price gaps",
            fractions.len(),
            gaps_bps.len()
        );
    }
    Ok(fractions
        .iter()
        .zip(gaps_bps.iter())
        .map(|(fraction, gap)| {
            let price = round_to(
                anchor_price * (1.0 - side.sign() * gap / 10_000.0),
                rules.price_precision,
            );
            let quantity = round_to(notional * fraction / price, rules.qty_precision);
            OrderLevel { price, quantity }
        })
        .collect())
}

/// Lay out take-profit orders across the same fractions as the entry, at
/// increasing (LONG) or decreasing (SHORT) offsets from the base TP price.
pub fn take_profit_layers(
    base_tp: f64,
    position_qty: f64,
    side: PositionSide,
    fractions: &[f64],
    gaps_bps: &[f64],
    rules: SymbolRules,
) -> Result<Vec<OrderLevel>> {
    validate_fractions(fractions)?;
    if fractions.len() != gaps_bps.len() {
        bail!(
            "{} quantity fractions but {} price gaps",
            fractions.len(),
            gaps_bps.len()
        );
    }
    Ok(fractions
        .iter()
        .zip(gaps_bps.iter())
        .map(|(fraction, gap)| {
            let price = round_to(
                base_tp * (1.0 + side.sign() * gap / 10_000.0),
                rules.price_precision,
            );
            let quantity = round_to(position_qty * fraction, rules.qty_precision);
            OrderLevel { price, quantity }
        })
        .collect())
}

/// Quantity-weighted average price across fills. `None` when nothing filled.
pub fn weighted_average(fills: &[(f64, f64)]) -> Option<f64> {
    let total_qty: f64 = fills.iter().map(|(_, qty)| qty).sum();
    if total_qty <= 0.0 {
        return None;
    }
    let weighted: f64 = fills.iter().map(|(price, qty)| price * qty).sum();
    Some(weighted / total_qty)
}

/// Realized P&L for a closed quantity.
pub fn realized_pnl(entry: f64, exit: f64, quantity: f64, side: PositionSide) -> f64 {
    side.sign() * (exit - entry) * quantity
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> SymbolRules {
        SymbolRules {
            price_precision: 2,
            qty_precision: 3,
            min_notional: 5.0,
        }
    }

    #[test]
    fn take_profit_covers_fees_both_sides() {
        let long = take_profit_price(100.0, PositionSide::Long, 2.0, 0.0004);
        assert!((long - 102.08).abs() < 1e-9);
        let short = take_profit_price(100.0, PositionSide::Short, 2.0, 0.0004);
        assert!((short - 97.92).abs() < 1e-9);
    }

    #[test]
    fn stop_loss_is_below_entry_for_long_above_for_short() {
        assert!((stop_loss_price(100.0, PositionSide::Long, 5.0) - 95.0).abs() < 1e-9);
        assert!((stop_loss_price(100.0, PositionSide::Short, 5.0) - 105.0).abs() < 1e-9);
    }

    #[test]
    fn entry_anchor_uses_opposing_side_of_book() {
        let depth = DepthSnapshot {
            bids: vec![(99.0, 1.0)],
            asks: vec![(101.0, 1.0)],
        };
        assert_eq!(
            entry_price_from_depth(&depth, PositionSide::Long, 0.0),
            Some(101.0)
        );
        assert_eq!(
            entry_price_from_depth(&depth, PositionSide::Short, 0.0),
            Some(99.0)
        );
    }

    #[test]
    fn entry_offset_shades_in_favor() {
        let depth = DepthSnapshot {
            bids: vec![(99.0, 1.0)],
            asks: vec![(100.0, 1.0)],
        };
        // 10 bps long: buy slightly below the ask.
        let long = entry_price_from_depth(&depth, PositionSide::Long, 10.0).unwrap();
        assert!((long - 99.9).abs() < 1e-9);
        // 10 bps short: sell slightly above the bid.
        let short = entry_price_from_depth(&depth, PositionSide::Short, 10.0).unwrap();
        assert!((short - 99.099).abs() < 1e-9);
    }

    #[test]
    fn long_entry_layers_walk_down_from_anchor() {
        let layers = entry_layers(
            100.0,
            1_000.0,
            PositionSide::Long,
            &[0.5, 0.5],
            &[0.0, 100.0],
            rules(),
        )
        .unwrap();
        assert_eq!(layers[0].price, 100.0);
        assert_eq!(layers[1].price, 99.0);
        assert_eq!(layers[0].quantity, 5.0);
        // 500 notional at 99 = 5.0505... rounded to 3 decimals.
        assert!((layers[1].quantity - 5.051).abs() < 1e-9);
    }

    #[test]
    fn short_take_profit_layers_walk_down() {
        let layers = take_profit_layers(
            97.92,
            10.0,
            PositionSide::Short,
            &[0.5, 0.5],
            &[0.0, 100.0],
            rules(),
        )
        .unwrap();
        assert_eq!(layers[0].price, 97.92);
        assert!(layers[1].price < layers[0].price);
        assert_eq!(layers[0].quantity, 5.0);
    }

    #[test]
    fn weighted_average_across_layers() {
        let avg = weighted_average(&[(100.0, 1.0), (102.0, 3.0)]).unwrap();
        assert!((avg - 101.5).abs() < 1e-9);
        assert_eq!(weighted_average(&[]), None);
        assert_eq!(weighted_average(&[(100.0, 0.0)]), None);
    }

    #[test]
    fn realized_pnl_signs() {
        assert!((realized_pnl(100.0, 102.0, 2.0, PositionSide::Long) - 4.0).abs() < 1e-9);
        assert!((realized_pnl(100.0, 102.0, 2.0, PositionSide::Short) + 4.0).abs() < 1e-9);
    }
}
