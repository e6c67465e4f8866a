//! Explicit runtime context and fatal-condition kill switch, replacing the
//! thread-local-singleton pattern the design notes flag for re-architecture.

mod context;
mod killswitch;

pub use context::Runtime;
pub use killswitch::{KillSwitch, KillSwitchReason};
