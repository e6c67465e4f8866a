//! Daemon library target: the HTTP status/control surface (§ SPEC_FULL.md B)
//! wired around a single [`tle_runtime::Runtime`].
//!
//! Exposes the router and state for integration tests; the binary in
//! `main.rs` depends on this library target.

pub mod api_types;
pub mod routes;
pub mod state;
pub mod wiring;
