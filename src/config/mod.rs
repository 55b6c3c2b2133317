//! Engine configuration and constants.
//!
//! This module provides:
//! - Configuration constants (layout, timeouts, limits)
//! - Engine configuration and observer callbacks
//! - CLI option types and parsing

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{
    Command, Config, DatabaseFormat, LogFormat, LogLevel, Opt, RefreshObserver, UnknownObserver,
};
