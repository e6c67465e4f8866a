//! Wire-boundary price conversion and profit computation.
//!
//! All prices and USD amounts inside the core are [`Micros`] (1e-6 fixed
//! point). `f64` only appears when crossing the broker wire boundary or when
//! carrying a lot size, which is a decimal quantity rather than a monetary
//! amount and is never mixed with `Micros` arithmetic.

use crate::Micros;

/// Scale factor: 1 price/USD unit = 1_000_000 micros.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    NotFinite,
    OutOfRange,
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingError::NotFinite => write!(f, "price_to_micros: non-finite input (NaN or Inf)"),
            PricingError::OutOfRange => {
                write!(f, "price_to_micros: price out of i64 range after scaling")
            }
        }
    }
}

impl std::error::Error for PricingError {}

/// Convert integer-micros to `f64` for broker wire serialization only.
pub fn micros_to_price(micros: Micros) -> f64 {
    micros.raw() as f64 / MICROS_PER_UNIT as f64
}

/// Parse an `f64` price from a broker response into `Micros`.
/// Rounds to the nearest micro. Rejects NaN/Inf and out-of-range values in
/// all build profiles.
pub fn price_to_micros(price: f64) -> Result<Micros, PricingError> {
    if !price.is_finite() {
        return Err(PricingError::NotFinite);
    }
    let scaled = price * MICROS_PER_UNIT as f64;
    if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(PricingError::OutOfRange);
    }
    Ok(Micros::new(scaled.round() as i64))
}

/// Compute profit in USD micros for a price move against a lot-denominated
/// position.
///
/// `diff_price` is the signed, direction-adjusted price difference (already
/// `current - entry` for LONG or `entry - current` for SHORT).
/// `contract_value` is USD-per-1.0-price-move-per-1.0-lot, supplied by the
/// broker adapter via `SymbolInfo` (Open Question 1: treated as opaque).
/// `volume_lots` is a plain decimal lot count, not a monetary amount.
///
/// Uses an `i128` intermediate so two micros-scaled multiplications do not
/// lose precision; saturates to `Micros::MAX`/`MIN` on overflow rather than
/// panicking, since no realistic trade size approaches `i64` limits and a
/// profit figure feeding a safety decision must never panic.
pub fn profit_usd(diff_price: Micros, contract_value: Micros, volume_lots: f64) -> Micros {
    let volume_micros = (volume_lots * MICROS_PER_UNIT as f64).round() as i128;
    let per_unit = (diff_price.raw() as i128 * contract_value.raw() as i128) / MICROS_PER_UNIT as i128;
    let total = (per_unit * volume_micros) / MICROS_PER_UNIT as i128;
    if total > i64::MAX as i128 {
        Micros::MAX
    } else if total < i64::MIN as i128 {
        Micros::MIN
    } else {
        Micros::new(total as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_fractional_price() {
        let micros = Micros::new(100_500_000);
        let back = price_to_micros(micros_to_price(micros)).unwrap();
        assert_eq!(back, micros);
    }

    #[test]
    fn nan_is_rejected() {
        assert_eq!(price_to_micros(f64::NAN), Err(PricingError::NotFinite));
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert_eq!(price_to_micros(f64::MAX), Err(PricingError::OutOfRange));
    }

    #[test]
    fn profit_usd_one_lot_one_dollar_move() {
        // 1.0 price unit move, $100000 contract value per lot, 0.01 lots => $1000
        let diff = Micros::new(1_000_000);
        let contract_value = Micros::new(100_000 * MICROS_PER_UNIT);
        let profit = profit_usd(diff, contract_value, 0.01);
        assert_eq!(profit, Micros::new(1_000 * MICROS_PER_UNIT));
    }

    #[test]
    fn profit_usd_is_negative_for_adverse_move() {
        let diff = Micros::new(-500_000);
        let contract_value = Micros::new(100_000 * MICROS_PER_UNIT);
        let profit = profit_usd(diff, contract_value, 0.01);
        assert!(profit.is_negative());
    }
}
