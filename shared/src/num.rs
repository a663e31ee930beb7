//! Decimal <-> f64 conversion helpers.
//!
//! Engine math runs in f64; persisted money columns are `Decimal`. The string
//! round-trip keeps the decimal representation exact for values that came out
//! of precision rounding.

use rust_decimal::Decimal;
use std::str::FromStr;

pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_str(&value.to_string()).unwrap_or_else(|_| Decimal::ZERO)
}

pub fn to_f64(value: &Decimal) -> f64 {
    f64::from_str(&value.to_string()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_precision_rounded_values() {
        let price = 50050.0;
        assert_eq!(to_f64(&to_decimal(price)), price);
        let qty = 0.00123;
        assert!((to_f64(&to_decimal(qty)) - qty).abs() < 1e-12);
    }
}
