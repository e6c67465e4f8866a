use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tle_money::Micros;

use crate::{Direction, Ticket};

/// In-memory mirror of one broker position, owned by the position registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Micros,
    /// Decimal lot count. Not a monetary amount — never mixed into `Micros`
    /// arithmetic directly, only passed to `tle_money::profit_usd`.
    pub volume: f64,
    pub current_price: Micros,
    pub current_sl: Option<Micros>,
    pub opened_at: DateTime<Utc>,
    /// Incremented on any observed change (fill, quote update, reconcile).
    pub version: u64,
}

impl Position {
    /// Signed price difference oriented so that a positive value always
    /// means "in profit," for either direction.
    pub fn directional_price_diff(&self) -> Micros {
        match self.direction {
            Direction::Long => self.current_price - self.entry_price,
            Direction::Short => self.entry_price - self.current_price,
        }
    }

    /// Current profit in USD micros given the symbol's contract value.
    pub fn profit_usd(&self, contract_value: Micros) -> Micros {
        tle_money::profit_usd(self.directional_price_diff(), contract_value, self.volume)
    }

    /// Convert a target profit-in-USD figure into an absolute SL price for
    /// this position's direction and contract value.
    ///
    /// Inverse of `profit_usd`: solves `target_profit = diff * contract_value
    /// * volume` for `diff`, then offsets from `entry_price` in the
    /// protective direction.
    pub fn sl_price_for_profit(&self, target_profit: Micros, contract_value: Micros) -> Micros {
        let volume_micros = (self.volume * tle_money::MICROS_PER_UNIT as f64).round() as i128;
        if volume_micros == 0 || contract_value.raw() == 0 {
            return self.entry_price;
        }
        let diff_raw = (target_profit.raw() as i128 * tle_money::MICROS_PER_UNIT as i128
            * tle_money::MICROS_PER_UNIT as i128)
            / (contract_value.raw() as i128 * volume_micros);
        let diff = Micros::new(diff_raw.clamp(i64::MIN as i128, i64::MAX as i128) as i64);
        match self.direction {
            Direction::Long => self.entry_price + diff,
            Direction::Short => self.entry_price - diff,
        }
    }

    /// `true` if `candidate` is on the protective side of (or equal to)
    /// `baseline` for this position's direction — i.e. moving the SL from
    /// `baseline` to `candidate` would not reduce protection.
    pub fn is_protective_or_equal(&self, candidate: Micros, baseline: Micros) -> bool {
        match self.direction {
            Direction::Long => candidate >= baseline,
            Direction::Short => candidate <= baseline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_position() -> Position {
        Position {
            ticket: Ticket::new(1),
            symbol: "EURUSD".into(),
            direction: Direction::Long,
            entry_price: Micros::new(1_100_000_000),
            volume: 0.01,
            current_price: Micros::new(1_100_500_000),
            current_sl: None,
            opened_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn profit_positive_on_favorable_long_move() {
        let p = long_position();
        let contract_value = Micros::new(100_000 * tle_money::MICROS_PER_UNIT);
        assert!(p.profit_usd(contract_value).is_non_negative());
    }

    #[test]
    fn sl_price_for_profit_is_inverse_of_profit_usd() {
        let p = long_position();
        let contract_value = Micros::new(100_000 * tle_money::MICROS_PER_UNIT);
        let target = Micros::new(5_000_000); // $5
        let sl = p.sl_price_for_profit(target, contract_value);
        let mut hypothetical = p.clone();
        hypothetical.current_price = sl;
        let recovered = hypothetical.profit_usd(contract_value);
        let delta = (recovered.raw() - target.raw()).abs();
        assert!(delta < 1_000, "round trip drift too large: {delta}");
    }

    #[test]
    fn is_protective_or_equal_for_long_requires_higher_or_equal_sl() {
        let p = long_position();
        let base = Micros::new(1_100_000_000);
        assert!(p.is_protective_or_equal(Micros::new(1_100_100_000), base));
        assert!(p.is_protective_or_equal(base, base));
        assert!(!p.is_protective_or_equal(Micros::new(1_099_900_000), base));
    }

    #[test]
    fn is_protective_or_equal_for_short_requires_lower_or_equal_sl() {
        let mut p = long_position();
        p.direction = Direction::Short;
        let base = Micros::new(1_100_000_000);
        assert!(p.is_protective_or_equal(Micros::new(1_099_900_000), base));
        assert!(!p.is_protective_or_equal(Micros::new(1_100_100_000), base));
    }
}
