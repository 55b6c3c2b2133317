//! Error type definitions.
//!
//! This module defines all error types used throughout the engine.

use std::net::IpAddr;
use std::path::PathBuf;

use log::SetLoggerError;
use thiserror::Error;

/// Error types for logger initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),
}

/// Errors returned by a single lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No index has been published yet.
    #[error("IP index not initialized")]
    NotInitialized,

    /// The address is not IPv4, or its first octet is the reserved zero.
    #[error("Invalid lookup key: {0}")]
    InvalidKey(IpAddr),
}

/// Structural problems found while decoding a database or validating its ranges.
///
/// Any of these fails the whole load; nothing is published.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedDatabase {
    /// The content is smaller than the fixed header region.
    #[error("Database too short: {len} bytes (header needs {required})")]
    TooShort { len: usize, required: usize },

    /// The header word is below the text-offset bias.
    #[error("Invalid header word {0:#010x}")]
    InvalidHeader(u32),

    /// The text section would start inside the header or past the end of the content.
    #[error("Text section offset {offset} outside of [{min}, {len}]")]
    TextSectionOutOfBounds { offset: usize, min: usize, len: usize },

    /// The entry table is not a whole number of entries.
    #[error("Entry table of {len} bytes is not a multiple of {entry_size}")]
    TruncatedEntryTable { len: usize, entry_size: usize },

    /// An entry points outside the content.
    #[error("Entry {entry} references text [{start}, {end}) beyond {len} bytes")]
    TextOutOfBounds {
        entry: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    /// An entry's text is not UTF-8.
    #[error("Entry {entry} text is not valid UTF-8")]
    InvalidText { entry: usize },

    /// No ranges at all.
    #[error("Database contains no ranges")]
    NoRanges,

    /// Upper bounds must be strictly ascending.
    #[error("Range {position} upper bound {current:#010x} does not follow {previous:#010x}")]
    UnorderedRanges {
        position: usize,
        previous: u32,
        current: u32,
    },

    /// The last range must end at 255.255.255.255.
    #[error("Ranges end at {last:#010x} and do not cover the whole key space")]
    IncompleteCoverage { last: u32 },
}

/// Errors loading or parsing the reference catalog (world file).
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Error reading the world file.
    #[error("Failed to read world file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV syntax error.
    #[error("World CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A row with a known kind but unusable fields.
    #[error("Invalid {kind} row at line {line}: {reason}")]
    InvalidRow {
        kind: &'static str,
        line: u64,
        reason: String,
    },

    /// A row whose first field is not a known kind.
    #[error("Unknown row kind {kind:?} at line {line}")]
    UnknownRowKind { kind: String, line: u64 },
}

/// Errors of a single load or refresh cycle.
///
/// During `initialize` these abort startup; in the background task they are
/// logged and the cycle is retried on the next tick.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// The database content failed to decode or validate.
    #[error("Malformed database: {0}")]
    MalformedDatabase(#[from] MalformedDatabase),

    /// No local database and no remote source to fetch one from.
    #[error("Local database {0} not found and no remote source configured")]
    MissingLocalFile(PathBuf),

    /// The configured or inferred format is not supported.
    #[error("Unsupported database format for {0}")]
    UnsupportedFormat(PathBuf),

    /// Error reading the local database.
    #[error("Failed to read database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network failure during a fetch.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote answered with a non-success status.
    #[error("Remote returned HTTP {0}")]
    HttpStatus(reqwest::StatusCode),

    /// The remote response carries no ETag.
    #[error("Remote response has no ETag validator")]
    MissingValidator,

    /// The ETag is weak or not a sha1 validator.
    #[error("Unsupported ETag validator: {0:?}")]
    UnsupportedValidator(String),

    /// The downloaded bytes do not hash to the advertised validator.
    #[error("Downloaded content hashes to sha1-{actual}, expected sha1-{expected}")]
    ValidatorMismatch { expected: String, actual: String },

    /// The remote database exceeds the configured size limit.
    #[error("Remote database too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    /// Writing the temporary file or renaming it over the local path failed.
    #[error("Failed to persist database to {path}: {source}")]
    PersistFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking decode task panicked or was cancelled.
    #[error("Database build task failed: {0}")]
    TaskFailed(String),
}

/// Errors returned by engine construction and `initialize`.
#[derive(Error, Debug)]
pub enum InitError {
    /// The reference catalog could not be loaded.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The first load failed.
    #[error("Initial load failed: {0}")]
    Load(#[from] RefreshError),

    /// `initialize` was already called successfully.
    #[error("Engine already initialized")]
    AlreadyInitialized,
}
