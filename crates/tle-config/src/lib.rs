//! Layered YAML configuration loading, canonical hashing, and the
//! engine-wide `Config` struct.

mod config;
mod loader;

pub use config::{Config, Mode};
pub use loader::{load_layered_yaml, load_layered_yaml_from_strings, LoadedConfig};
