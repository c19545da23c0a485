//! Run orchestration.
//!
//! One invocation is one pass through the pipeline:
//!
//!   Capture → Publish → Patch → Sweep
//!
//! A failing stage aborts the run immediately — there is no partial
//! continuation, so a publish failure can never patch the document with a
//! dangling reference. Sweep problems are the one exception: they accumulate
//! as warnings in the report and never change the verdict. Dry run stops
//! after capture (plus the local copy), leaving every remote surface
//! untouched.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::artifact;
use crate::capture::{Browser, CaptureError, CaptureUnit};
use crate::config::Config;
use crate::document::{DocumentPatcher, PatchError};
use crate::observability::StageTimer;
use crate::publish::{ArtifactRef, PublishError, Publisher};
use crate::retention::{self, SweepReport};
use crate::store::ContentStore;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Publish,
    Patch,
    Sweep,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Capture => "capture",
            Stage::Publish => "publish",
            Stage::Patch => "patch",
            Stage::Sweep => "sweep",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("capture stage failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("publish stage failed: {0}")]
    Publish(#[from] PublishError),

    #[error("patch stage failed: {0}")]
    Patch(#[from] PatchError),
}

impl WorkflowError {
    /// The stage the run died in.
    pub fn stage(&self) -> Stage {
        match self {
            WorkflowError::Capture(_) => Stage::Capture,
            WorkflowError::Publish(_) => Stage::Publish,
            WorkflowError::Patch(_) => Stage::Patch,
        }
    }
}

/// What one run did.
#[derive(Debug)]
pub struct RunReport {
    pub dry_run: bool,
    pub filename: String,
    pub degraded_capture: bool,
    pub local_copy: Option<PathBuf>,
    pub artifact: Option<ArtifactRef>,
    pub document_changed: Option<bool>,
    pub sweep: Option<SweepReport>,
}

pub struct Workflow {
    config: Arc<Config>,
    capture: CaptureUnit,
    store: Arc<dyn ContentStore>,
}

impl Workflow {
    pub fn new(
        config: Arc<Config>,
        browser: Arc<dyn Browser>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            config,
            capture: CaptureUnit::new(browser),
            store,
        }
    }

    /// Run the pipeline, naming the artifact for today (UTC).
    pub async fn run(&self) -> Result<RunReport, WorkflowError> {
        self.run_for_date(Utc::now().date_naive()).await
    }

    /// Run the pipeline, naming the artifact for an explicit capture date.
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<RunReport, WorkflowError> {
        let dry_run = self.config.dry_run;
        info!(
            profile = %self.config.profile_url,
            repo = %self.config.repo,
            dry_run,
            "starting run"
        );

        let timer = StageTimer::start("capture");
        let snapshot = self.capture.capture(&self.config.capture_request()).await?;
        timer.finish();

        let filename = artifact::name_for(date);
        let local_copy = self.save_local_copy(&filename, &snapshot.bytes).await;

        let mut report = RunReport {
            dry_run,
            filename: filename.clone(),
            degraded_capture: snapshot.degraded,
            local_copy,
            artifact: None,
            document_changed: None,
            sweep: None,
        };

        if dry_run {
            info!("dry run — skipping publish, patch, and sweep");
            return Ok(report);
        }

        let timer = StageTimer::start("publish");
        let publisher = Publisher::new(self.store.clone(), self.config.artifact_prefix.as_str());
        let artifact_ref = publisher.publish(&filename, &snapshot.bytes).await?;
        timer.finish();

        let timer = StageTimer::start("patch");
        let patcher = DocumentPatcher::new(
            self.store.clone(),
            self.config.document_path.as_str(),
            self.config.insert_after_marker.clone(),
        );
        let changed = patcher.patch(&artifact_ref, date).await?;
        timer.finish();

        let timer = StageTimer::start("sweep");
        let sweep = retention::sweep(
            self.store.as_ref(),
            &self.config.artifact_prefix,
            self.config.keep_count,
        )
        .await;
        timer.finish();

        info!(
            artifact = %artifact_ref.remote_path,
            document_changed = changed,
            swept = sweep.deleted,
            "run complete"
        );

        report.artifact = Some(artifact_ref);
        report.document_changed = Some(changed);
        report.sweep = Some(sweep);
        Ok(report)
    }

    /// Keep a local copy of the capture under `{data_dir}/screenshots/` so a
    /// dry run leaves something inspectable. Failure is never fatal.
    async fn save_local_copy(&self, filename: &str, bytes: &[u8]) -> Option<PathBuf> {
        let dir = self.config.screenshots_dir();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), err = %e, "could not create local screenshots directory");
            return None;
        }

        let path = dir.join(filename);
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                info!(path = %path.display(), "local copy saved");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), err = %e, "could not save local copy");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, Page, Viewport};
    use crate::config::CaptureConfig;
    use crate::store::{MemoryStore, StoreError, StoredObject, VersionToken};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubPage;

    #[async_trait]
    impl Page for StubPage {
        async fn goto(&self, _url: &str, _timeout: Duration) -> Result<(), CaptureError> {
            Ok(())
        }
        async fn hide(&self, _selector: &str) -> Result<(), CaptureError> {
            Ok(())
        }
        async fn scroll_to(&self, _selector: &str) -> Result<bool, CaptureError> {
            Ok(true)
        }
        async fn screenshot_full_page(&self) -> Result<Vec<u8>, CaptureError> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
    }

    struct StubBrowser;

    #[async_trait]
    impl Browser for StubBrowser {
        async fn open(&self, _viewport: Viewport) -> Result<Box<dyn Page>, CaptureError> {
            Ok(Box::new(StubPage))
        }
    }

    /// Delegates to a MemoryStore but refuses every write.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl ContentStore for ReadOnlyStore {
        async fn read(&self, path: &str) -> Result<Option<StoredObject>, StoreError> {
            self.0.read(path).await
        }
        async fn write(
            &self,
            _path: &str,
            _bytes: &[u8],
            _message: &str,
            _expected: Option<&VersionToken>,
        ) -> Result<VersionToken, StoreError> {
            Err(StoreError::Permission("read-only token".into()))
        }
        async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.0.list(prefix).await
        }
        async fn delete(&self, path: &str, message: &str) -> Result<(), StoreError> {
            self.0.delete(path, message).await
        }
    }

    fn config(data_dir: std::path::PathBuf, dry_run: bool) -> Arc<Config> {
        Arc::new(Config {
            profile_url: "https://github.com/someone".into(),
            repo: "someone/someone".into(),
            branch: "main".into(),
            document_path: "README.md".into(),
            artifact_prefix: "screenshots".into(),
            keep_count: 30,
            insert_after_marker: None,
            api_base_url: "https://api.github.com".into(),
            token: None,
            data_dir,
            log: "info".into(),
            log_format: "pretty".into(),
            dry_run,
            capture: CaptureConfig::default(),
        })
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn publish_failure_short_circuits_patch_and_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let inner = MemoryStore::new();
        inner.seed("README.md", b"original bio\n").await;
        // One artifact past the retention bound, so a sweep would delete
        // something if it (wrongly) ran after the failed publish.
        for day in 1..=31 {
            inner
                .seed(&format!("screenshots/2020-01-{day:02}.png"), b"png")
                .await;
        }
        let store = Arc::new(ReadOnlyStore(inner));

        let workflow = Workflow::new(
            config(dir.path().to_path_buf(), false),
            Arc::new(StubBrowser),
            store.clone(),
        );

        let err = workflow.run_for_date(date(2026, 1, 10)).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Publish);

        // Document untouched, nothing swept.
        assert_eq!(store.0.bytes_of("README.md").await.unwrap(), b"original bio\n");
        assert_eq!(store.0.list("screenshots").await.unwrap().len(), 31);
    }

    #[tokio::test]
    async fn dry_run_captures_locally_and_mutates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());

        let workflow = Workflow::new(
            config(dir.path().to_path_buf(), true),
            Arc::new(StubBrowser),
            store.clone(),
        );

        let report = workflow.run_for_date(date(2026, 1, 10)).await.unwrap();

        assert!(report.dry_run);
        assert!(report.artifact.is_none());
        assert!(report.document_changed.is_none());
        assert!(report.sweep.is_none());
        assert_eq!(store.write_count(), 0);
        assert!(store.paths().await.is_empty());

        let local = report.local_copy.expect("dry run keeps a local copy");
        assert!(local.ends_with("screenshots/2026-01-10.png"));
        assert_eq!(std::fs::read(local).unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn full_run_publishes_patches_and_sweeps() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .seed("README.md", b"![Profile](./screenshots/2026-01-09.png)\n")
            .await;
        store.seed("screenshots/2026-01-09.png", b"old").await;

        let mut cfg = config(dir.path().to_path_buf(), false);
        Arc::get_mut(&mut cfg).unwrap().keep_count = 1;

        let workflow = Workflow::new(cfg, Arc::new(StubBrowser), store.clone());
        let report = workflow.run_for_date(date(2026, 1, 10)).await.unwrap();

        assert_eq!(report.filename, "2026-01-10.png");
        assert_eq!(report.document_changed, Some(true));
        assert_eq!(report.sweep.as_ref().unwrap().deleted, 1);

        let doc = String::from_utf8(store.bytes_of("README.md").await.unwrap()).unwrap();
        assert_eq!(doc, "![Profile](./screenshots/2026-01-10.png)\n");
        assert_eq!(store.list("screenshots").await.unwrap(), vec![
            "screenshots/2026-01-10.png"
        ]);
    }
}
