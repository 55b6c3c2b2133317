//! Reading, decoding and indexing a database file.

use std::path::Path;
use std::sync::Arc;

use crate::config::DatabaseFormat;
use crate::database;
use crate::error_handling::RefreshError;
use crate::index::{IndexOptions, RangeIndex};
use crate::resolver::RecordResolver;

/// Loads `path` into a new index.
///
/// Decoding runs on the blocking pool so large files do not stall the runtime.
pub(crate) async fn load_index(
    path: &Path,
    format: DatabaseFormat,
    resolver: Arc<RecordResolver>,
    options: IndexOptions,
) -> Result<RangeIndex, RefreshError> {
    log::debug!("Loading database from: {}", path.display());

    let content = tokio::fs::read(path)
        .await
        .map_err(|source| RefreshError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let index = tokio::task::spawn_blocking(move || {
        let decoded = match format {
            DatabaseFormat::Dat => database::decode(&content, &resolver)?,
        };
        RangeIndex::from_decoded(decoded, Arc::clone(resolver.catalog()), options)
    })
    .await
    .map_err(|e| RefreshError::TaskFailed(e.to_string()))??;

    Ok(index)
}
