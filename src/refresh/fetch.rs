//! Conditional download of the remote database.
//!
//! The remote must advertise a strong `sha1-<hex>` ETag. The body is streamed
//! into a temporary file next to the local path while being hashed, and only
//! renamed over the local file once the digest matches the validator.

use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;

use crate::config::{CONNECT_TIMEOUT_SECS, HEADER_ETAG, HEADER_IF_NONE_MATCH, SHA1_VALIDATOR_PREFIX};
use crate::database::Checksum;
use crate::error_handling::RefreshError;

/// Result of one conditional fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOutcome {
    /// The remote holds the content already published.
    Unmodified,
    /// New content was persisted at the local path.
    Downloaded(Checksum),
}

/// Creates the HTTP client used for database downloads.
pub(crate) fn build_client(fetch_timeout: Duration) -> Result<reqwest::Client, RefreshError> {
    let client = reqwest::Client::builder()
        .timeout(fetch_timeout)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(concat!("geoisp/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Parses a strong `sha1-<hex>` ETag, quoted or bare.
pub(crate) fn parse_validator(etag: &str) -> Result<Checksum, RefreshError> {
    let unsupported = || RefreshError::UnsupportedValidator(etag.to_string());
    let trimmed = etag.trim();
    if trimmed.starts_with("W/") {
        return Err(unsupported());
    }
    let bare = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed);
    let digest = bare
        .strip_prefix(SHA1_VALIDATOR_PREFIX)
        .ok_or_else(unsupported)?;
    Checksum::from_hex(digest).ok_or_else(unsupported)
}

/// Fetches `url` unless it still matches `current`, persisting new content at `local_path`.
pub(crate) async fn fetch_database(
    client: &reqwest::Client,
    url: &str,
    local_path: &Path,
    current: Option<&Checksum>,
    max_size: u64,
) -> Result<FetchOutcome, RefreshError> {
    let mut request = client.get(url);
    if let Some(current) = current {
        request = request.header(HEADER_IF_NONE_MATCH, current.validator());
    }

    let mut response = request.send().await?;
    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
        log::debug!("Remote database unmodified (304)");
        return Ok(FetchOutcome::Unmodified);
    }
    if !status.is_success() {
        return Err(RefreshError::HttpStatus(status));
    }

    let etag = response
        .headers()
        .get(HEADER_ETAG)
        .filter(|value| !value.is_empty())
        .ok_or(RefreshError::MissingValidator)?;
    let etag = etag.to_str().map_err(|_| {
        RefreshError::UnsupportedValidator(String::from_utf8_lossy(etag.as_bytes()).into_owned())
    })?;
    let expected = parse_validator(etag)?;

    if current == Some(&expected) {
        log::debug!("Remote database validator unchanged ({})", expected);
        return Ok(FetchOutcome::Unmodified);
    }

    if let Some(content_length) = response.content_length() {
        if content_length > max_size {
            return Err(RefreshError::TooLarge {
                size: content_length,
                max: max_size,
            });
        }
    }

    let persist_err = |source: std::io::Error| RefreshError::PersistFailure {
        path: local_path.to_path_buf(),
        source,
    };

    // Same directory as the target so the final rename stays on one filesystem
    let dir = local_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".geoisp-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(persist_err)?;
    let mut file = tokio::fs::File::from_std(temp.as_file().try_clone().map_err(persist_err)?);

    let mut hasher = Sha1::new();
    let mut size: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        size += chunk.len() as u64;
        if size > max_size {
            return Err(RefreshError::TooLarge {
                size,
                max: max_size,
            });
        }
        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(persist_err)?;
    }
    file.flush().await.map_err(persist_err)?;
    file.sync_all().await.map_err(persist_err)?;
    drop(file);

    let actual = Checksum::from_hasher(hasher);
    if actual != expected {
        return Err(RefreshError::ValidatorMismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }

    temp.persist(local_path)
        .map_err(|e| persist_err(e.error))?;

    log::info!(
        "Downloaded database from {} ({} bytes, {})",
        url,
        size,
        actual.validator()
    );
    Ok(FetchOutcome::Downloaded(actual))
}
