//! Remote artifact publishing.
//!
//! Writes the captured image under `prefix/filename` in the target
//! repository and hands back the reference the document patcher embeds. The
//! reference is a path relative to the document (`./prefix/filename`), not
//! an absolute content URL — relative paths cost far less of the reference
//! block's width budget and render identically when the document and the
//! artifact share a repository.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::observability::format_bytes;
use crate::store::{ContentStore, StoreError};

/// Reference to a published artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Repository-relative storage path, e.g. `screenshots/2026-01-10.png`.
    pub remote_path: String,
    /// Document-relative link target, e.g. `./screenshots/2026-01-10.png`.
    pub relative: String,
}

#[derive(Debug, Error)]
#[error("artifact publish failed: {0}")]
pub struct PublishError(#[from] pub StoreError);

pub struct Publisher {
    store: Arc<dyn ContentStore>,
    prefix: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn ContentStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Write the artifact, overwriting any same-named object so a re-run on
    /// the same day replaces that day's artifact instead of duplicating it.
    pub async fn publish(&self, filename: &str, bytes: &[u8]) -> Result<ArtifactRef, PublishError> {
        let remote_path = format!("{}/{}", self.prefix, filename);
        let message = format!("Add profile screenshot: {filename}");

        self.store
            .write(&remote_path, bytes, &message, None)
            .await?;

        info!(
            path = %remote_path,
            size = %format_bytes(bytes.len() as u64),
            "artifact published"
        );

        Ok(ArtifactRef {
            relative: format!("./{remote_path}"),
            remote_path,
        })
    }
}
