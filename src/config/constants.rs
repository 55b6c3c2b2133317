//! Configuration constants.
//!
//! This module defines the defaults and limits used throughout the engine,
//! including database layout constants, refresh timing and download limits.

use std::time::Duration;

// DAT layout
/// Size of the fixed header region (offset word + reserved block)
pub const DAT_HEADER_SIZE: usize = 1028;
/// Bias added to the text-section offset stored in the first header word
pub const DAT_TEXT_OFFSET_BIAS: u32 = 1024;
/// Size of one range entry (u32 upper bound + u32 packed text pointer)
pub const DAT_ENTRY_SIZE: usize = 8;
/// Mask selecting the relative text offset out of a packed text pointer
pub const DAT_TEXT_OFFSET_MASK: u32 = 0x00FF_FFFF;

// Lookup
/// Candidate span at or below which lookup switches from bisection to a linear scan
pub const DEFAULT_MIN_BINARY_SEARCH_RANGE: usize = 10;

// Refresh
/// How often the background task checks for a new database (one hour)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Total timeout for a single remote fetch in seconds (large files take a while)
pub const FETCH_TIMEOUT_SECS: u64 = 300;
/// TCP connect timeout for remote fetches in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Maximum accepted database download size in bytes (256MB)
pub const MAX_DATABASE_DOWNLOAD_SIZE: u64 = 256 * 1024 * 1024;

// HTTP validators
/// ETag response header
pub const HEADER_ETAG: &str = "ETag";
/// Conditional request header carrying the currently published validator
pub const HEADER_IF_NONE_MATCH: &str = "If-None-Match";
/// The only validator scheme accepted from a remote source
pub const SHA1_VALIDATOR_PREFIX: &str = "sha1-";
