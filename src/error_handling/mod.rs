//! Error handling.
//!
//! Error types are split by where they surface:
//! - **Lookup**: returned per call, never fatal
//! - **Load/refresh**: abort `initialize`, or are logged and retried in the background
//! - **Initialization**: catalog and logger setup

mod types;

// Re-export public API
pub use types::{
    CatalogError, InitError, InitializationError, LookupError, MalformedDatabase, RefreshError,
};
