//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and engine configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::constants::{
    DEFAULT_MIN_BINARY_SEARCH_RANGE, DEFAULT_POLL_INTERVAL, FETCH_TIMEOUT_SECS,
    MAX_DATABASE_DOWNLOAD_SIZE,
};
use crate::engine::RefreshEvent;
use crate::resolver::UnknownLevel;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// On-disk database format.
///
/// DAT is the only format understood today.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DatabaseFormat {
    /// Range table plus tab-separated text section
    Dat,
}

impl DatabaseFormat {
    /// Infers the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("dat") {
            Some(DatabaseFormat::Dat)
        } else {
            None
        }
    }
}

/// Callback invoked for every non-empty name the catalog cannot resolve.
///
/// Receives the level that failed and the raw field values up to that level.
#[derive(Clone)]
pub struct UnknownObserver(pub Arc<dyn Fn(UnknownLevel, &[&str]) + Send + Sync>);

impl UnknownObserver {
    /// Wraps a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(UnknownLevel, &[&str]) + Send + Sync + 'static,
    {
        UnknownObserver(Arc::new(f))
    }

    pub(crate) fn notify(&self, level: UnknownLevel, fields: &[&str]) {
        (self.0)(level, fields)
    }
}

impl fmt::Debug for UnknownObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UnknownObserver(..)")
    }
}

/// Callback invoked after every refresh cycle, successful or not.
#[derive(Clone)]
pub struct RefreshObserver(pub Arc<dyn Fn(&RefreshEvent) + Send + Sync>);

impl RefreshObserver {
    /// Wraps a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RefreshEvent) + Send + Sync + 'static,
    {
        RefreshObserver(Arc::new(f))
    }

    pub(crate) fn notify(&self, event: &RefreshEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for RefreshObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshObserver(..)")
    }
}

/// Engine configuration (no CLI dependencies).
///
/// # Examples
///
/// ```no_run
/// use geoisp::Config;
/// use std::path::PathBuf;
///
/// let config = Config {
///     local_path: PathBuf::from("ipdb.dat"),
///     remote: Some("https://mirror.example.com/ipdb.dat".to_string()),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Local database file; downloads are persisted here
    pub local_path: PathBuf,

    /// Remote source URL; enables conditional-fetch refresh
    pub remote: Option<String>,

    /// Database format; inferred from the local file extension when unset
    pub format: Option<DatabaseFormat>,

    /// World (reference catalog) CSV file; the built-in world is used when unset
    pub catalog_path: Option<PathBuf>,

    /// Interval between refresh checks
    pub poll_interval: Duration,

    /// Candidate span at or below which lookup scans linearly
    pub min_binary_search_range: usize,

    /// Keep unresolvable ISP names as synthetic ISPs with ID 0
    pub retain_unknown_isps: bool,

    /// Receives names the catalog does not know
    pub unknown_observer: Option<UnknownObserver>,

    /// Receives the outcome of every refresh cycle
    pub refresh_observer: Option<RefreshObserver>,

    /// Start the background refresh task from `initialize`
    pub auto_start: bool,

    /// Total timeout of one remote fetch
    pub fetch_timeout: Duration,

    /// Largest remote database accepted, in bytes
    pub max_download_size: u64,
}

impl Config {
    /// Resolves the effective database format.
    pub fn effective_format(&self) -> Option<DatabaseFormat> {
        self.format
            .or_else(|| DatabaseFormat::from_path(&self.local_path))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_path: PathBuf::from("ipdb.dat"),
            remote: None,
            format: None,
            catalog_path: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_binary_search_range: DEFAULT_MIN_BINARY_SEARCH_RANGE,
            retain_unknown_isps: false,
            unknown_observer: None,
            refresh_observer: None,
            auto_start: true,
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            max_download_size: MAX_DATABASE_DOWNLOAD_SIZE,
        }
    }
}

/// Command-line options for the `geoisp` binary.
#[derive(Debug, Parser)]
#[command(name = "geoisp", version, about = "IPv4 geolocation and ISP lookup")]
pub struct Opt {
    /// Local database path
    #[arg(long, default_value = "ipdb.dat")]
    pub local: PathBuf,

    /// Remote download URL
    #[arg(long)]
    pub remote: Option<String>,

    /// Database format (inferred from the file extension when omitted)
    #[arg(long, value_enum)]
    pub format: Option<DatabaseFormat>,

    /// World (reference catalog) CSV path
    #[arg(long)]
    pub world: Option<PathBuf>,

    /// Refresh check interval in seconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub interval_secs: u64,

    /// Keep unknown ISP names as ISPs with ID 0
    #[arg(long)]
    pub retain_unknown_isps: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of the `geoisp` binary.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Locate IPv4 addresses read from stdin, one per line
    Locate {
        /// Print results as JSON lines
        #[arg(long)]
        json: bool,

        /// Print distinct unknown names per level on exit
        #[arg(long)]
        report_unknowns: bool,
    },
    /// Load the database once and print its summary
    Inspect,
}

impl Opt {
    /// Builds the engine configuration from CLI options.
    pub fn to_config(&self) -> Config {
        Config {
            local_path: self.local.clone(),
            remote: self.remote.clone(),
            format: self.format,
            catalog_path: self.world.clone(),
            poll_interval: Duration::from_secs(self.interval_secs.max(1)),
            retain_unknown_isps: self.retain_unknown_isps,
            ..Default::default()
        }
    }
}
