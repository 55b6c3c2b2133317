//! Change detection for the database source.
//!
//! Two modes:
//!
//! - **Local**: the local file's modification time is compared against the
//!   time of the last successful load.
//! - **Remote**: a conditional GET is sent with the published checksum as
//!   validator; new content is persisted over the local file first.
//!
//! Either way the engine reloads from the local path.

mod fetch;
mod loader;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::{Config, DatabaseFormat};
use crate::database::Checksum;
use crate::error_handling::RefreshError;

pub(crate) use loader::load_index;

/// What a change check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceChange {
    /// Nothing new to load.
    Unchanged,
    /// The local file holds content worth loading.
    Changed {
        /// Modification time observed before loading, if available
        modified: Option<SystemTime>,
    },
}

/// Per-engine source state. Only one refresh cycle uses it at a time.
#[derive(Debug)]
pub(crate) struct Source {
    local_path: PathBuf,
    remote: Option<String>,
    format: DatabaseFormat,
    client: Option<reqwest::Client>,
    max_download_size: u64,
    last_loaded_mtime: Option<SystemTime>,
}

impl Source {
    /// Validates the format and prepares the HTTP client for remote sources.
    pub(crate) fn new(config: &Config) -> Result<Self, RefreshError> {
        let format = config
            .effective_format()
            .ok_or_else(|| RefreshError::UnsupportedFormat(config.local_path.clone()))?;
        let client = match config.remote {
            Some(_) => Some(fetch::build_client(config.fetch_timeout)?),
            None => None,
        };
        Ok(Source {
            local_path: config.local_path.clone(),
            remote: config.remote.clone(),
            format,
            client,
            max_download_size: config.max_download_size,
            last_loaded_mtime: None,
        })
    }

    pub(crate) fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub(crate) fn format(&self) -> DatabaseFormat {
        self.format
    }

    /// Makes sure a local file exists, downloading it when a remote is configured.
    pub(crate) async fn ensure_local(&mut self) -> Result<(), RefreshError> {
        if tokio::fs::try_exists(&self.local_path).await.unwrap_or(false) {
            return Ok(());
        }
        let (Some(client), Some(url)) = (&self.client, &self.remote) else {
            return Err(RefreshError::MissingLocalFile(self.local_path.clone()));
        };
        log::info!(
            "Local database {} missing, downloading from {}",
            self.local_path.display(),
            url
        );
        fetch::fetch_database(client, url, &self.local_path, None, self.max_download_size).await?;
        Ok(())
    }

    /// Checks the source for content newer than `published`.
    pub(crate) async fn check(
        &mut self,
        published: Option<&Checksum>,
    ) -> Result<SourceChange, RefreshError> {
        if let (Some(client), Some(url)) = (&self.client, &self.remote) {
            let outcome = fetch::fetch_database(
                client,
                url,
                &self.local_path,
                published,
                self.max_download_size,
            )
            .await?;
            return Ok(match outcome {
                fetch::FetchOutcome::Unmodified => SourceChange::Unchanged,
                fetch::FetchOutcome::Downloaded(_) => SourceChange::Changed {
                    modified: self.local_mtime().await,
                },
            });
        }

        let modified = self.local_mtime().await;
        let newer = match (modified, self.last_loaded_mtime) {
            (Some(current), Some(loaded)) => current > loaded,
            // Without a usable timestamp there is nothing to compare against
            (Some(_), None) => published.is_none(),
            (None, _) => false,
        };
        Ok(if newer {
            SourceChange::Changed { modified }
        } else {
            SourceChange::Unchanged
        })
    }

    /// Records a successful load so the same file is not loaded twice.
    pub(crate) fn mark_loaded(&mut self, modified: Option<SystemTime>) {
        if modified.is_some() {
            self.last_loaded_mtime = modified;
        }
    }

    /// Modification time of the local file, if it can be read.
    pub(crate) async fn local_mtime(&self) -> Option<SystemTime> {
        match tokio::fs::metadata(&self.local_path).await {
            Ok(metadata) => metadata.modified().ok(),
            Err(e) => {
                log::debug!(
                    "Cannot stat database {}: {}",
                    self.local_path.display(),
                    e
                );
                None
            }
        }
    }

    /// Short description for log messages.
    pub(crate) fn describe(&self) -> String {
        match &self.remote {
            Some(url) => format!("remote {}", url),
            None => format!("local {}", self.local_path.display()),
        }
    }
}

/// Interval used when the configured one is zero.
pub(crate) fn effective_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        Duration::from_secs(1)
    } else {
        interval
    }
}
