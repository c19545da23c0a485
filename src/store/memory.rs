//! In-memory [`ContentStore`] double for tests and offline experiments.
//!
//! Semantics mirror the GitHub adapter where it matters: version tokens
//! change on every write, a stale token is a precondition failure, and
//! listing a missing prefix yields an empty set. Individual deletes can be
//! made to fail to exercise the sweeper's partial-failure tolerance.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use super::{ContentStore, StoreError, StoredObject, VersionToken};

#[derive(Default)]
struct Inner {
    objects: HashMap<String, (Vec<u8>, u64)>,
    next_rev: u64,
    failing_deletes: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without bumping the write counter.
    pub async fn seed(&self, path: &str, bytes: &[u8]) {
        let mut inner = self.inner.lock().await;
        inner.next_rev += 1;
        let rev = inner.next_rev;
        inner.objects.insert(path.to_string(), (bytes.to_vec(), rev));
    }

    /// Make every future delete of `path` fail with a server error.
    pub async fn fail_deletes_of(&self, path: &str) {
        self.inner
            .lock()
            .await
            .failing_deletes
            .insert(path.to_string());
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.inner.lock().await.objects.contains_key(path)
    }

    pub async fn bytes_of(&self, path: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .await
            .objects
            .get(path)
            .map(|(bytes, _)| bytes.clone())
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.lock().await.objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of successful writes since construction.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

fn token(rev: u64) -> VersionToken {
    VersionToken(format!("rev-{rev}"))
}

#[async_trait::async_trait]
impl ContentStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<StoredObject>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.objects.get(path).map(|(bytes, rev)| StoredObject {
            bytes: bytes.clone(),
            version: token(*rev),
        }))
    }

    async fn write(
        &self,
        path: &str,
        bytes: &[u8],
        _message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError> {
        let mut inner = self.inner.lock().await;

        if let Some(expected) = expected {
            let current = inner.objects.get(path).map(|(_, rev)| token(*rev));
            if current.as_ref() != Some(expected) {
                return Err(StoreError::PreconditionFailed {
                    path: path.to_string(),
                });
            }
        }

        inner.next_rev += 1;
        let rev = inner.next_rev;
        inner.objects.insert(path.to_string(), (bytes.to_vec(), rev));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(token(rev))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let mut paths: Vec<String> = inner
            .objects
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn delete(&self, path: &str, _message: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.failing_deletes.contains(path) {
            return Err(StoreError::Api {
                status: 500,
                message: format!("injected delete failure for {path}"),
            });
        }
        match inner.objects.remove(path) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }
}
