//! Repository-content port.
//!
//! Everything that touches the remote repository — publishing artifacts,
//! patching the target document, sweeping old artifacts — goes through
//! [`ContentStore`]. The production implementation is
//! [`github::GitHubStore`]; [`memory::MemoryStore`] backs tests.

use async_trait::async_trait;
use thiserror::Error;

pub mod github;
pub mod memory;

pub use github::GitHubStore;
pub use memory::MemoryStore;

/// Opaque revision identifier for a stored object.
///
/// Threaded explicitly through each read → write pair. Writing with a stale
/// token fails with [`StoreError::PreconditionFailed`] instead of silently
/// overwriting a concurrent modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken(pub String);

impl VersionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A stored object together with its current version token.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub version: VersionToken,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("write precondition failed for {path}: stored version differs from the supplied token")]
    PreconditionFailed { path: String },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),
}

impl StoreError {
    /// Whether a retry could plausibly succeed (connection trouble or a
    /// server-side 5xx). Auth, permission, and precondition failures are
    /// final.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Remote repository-content capability: read, conditional write, list,
/// delete. Paths are repository-relative, `/`-separated, no leading slash.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read an object and its version token. `Ok(None)` when absent.
    async fn read(&self, path: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Write an object, creating the containing structure if needed.
    ///
    /// `expected` carries the optimistic-concurrency precondition:
    /// `Some(token)` requires the stored version to still match the token;
    /// `None` creates or overwrites unconditionally. Returns the new
    /// version token.
    async fn write(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError>;

    /// List object paths directly under a prefix. A missing prefix lists as
    /// empty rather than failing.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Delete an object. Deleting a missing object is [`StoreError::NotFound`].
    async fn delete(&self, path: &str, message: &str) -> Result<(), StoreError>;
}
