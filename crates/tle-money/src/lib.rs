//! Fixed-point money: the `Micros` type and wire-boundary price conversions.
//!
//! Every price and USD amount in the trade lifecycle engine is a `Micros`
//! (1e-6 fixed point `i64`). This eliminates the float drift that would
//! otherwise let two SL prices compare equal in one tick and not the next,
//! which would break the monotonic-SL invariant the application engine
//! relies on.

mod fixedpoint;
mod prices;

pub use fixedpoint::Micros;
pub use prices::{micros_to_price, price_to_micros, profit_usd, PricingError, MICROS_PER_UNIT};
