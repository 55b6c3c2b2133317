//! geoisp library: IPv4 geolocation and ISP lookup with live refresh
//!
//! This library decodes IP range databases in the DAT layout, resolves each
//! range's text record against a reference catalog of countries,
//! subdivisions, cities and ISPs, and serves lookups from an immutable range
//! index that is swapped atomically whenever the source changes.
//!
//! # Example
//!
//! ```no_run
//! use geoisp::{Config, GeoIsp};
//! use std::net::Ipv4Addr;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     local_path: std::path::PathBuf::from("ipdb.dat"),
//!     remote: Some("https://mirror.example.com/ipdb.dat".to_string()),
//!     ..Default::default()
//! };
//!
//! let engine = GeoIsp::new(config)?;
//! engine.initialize().await?;
//!
//! let result = engine.lookup(Ipv4Addr::new(58, 32, 10, 5))?;
//! if let Some(country) = result.country() {
//!     println!("{} via {:?}", country.name, result.isps());
//! }
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! `initialize`, `refresh_now` and `shutdown` need a Tokio runtime. Lookups
//! are synchronous and may run on any thread.

pub mod catalog;
pub mod config;
mod database;
mod engine;
mod error_handling;
mod index;
pub mod initialization;
mod refresh;
mod resolver;

// Re-export public API
pub use catalog::{Catalog, CatalogBuilder, City, Country, Isp, Iso3166_1, Location};
pub use config::{Config, DatabaseFormat, LogFormat, LogLevel, RefreshObserver, UnknownObserver};
pub use database::{decode, Checksum, DecodedDatabase};
pub use engine::{EngineState, GeoIsp, GeoIspResult, RefreshEvent, RefreshOutcome};
pub use error_handling::{
    CatalogError, InitError, InitializationError, LookupError, MalformedDatabase, RefreshError,
};
pub use index::{IndexOptions, RangeIndex, RangeRecord};
pub use resolver::{RecordResolver, Resolution, UnknownLevel};
