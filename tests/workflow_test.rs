//! End-to-end pipeline tests: a scripted browser plus the in-memory content
//! store, exercising full runs the way the binary wires them up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use profilesnap::capture::{Browser, CaptureError, Page, Viewport};
use profilesnap::config::{CaptureConfig, Config};
use profilesnap::store::{ContentStore, MemoryStore};
use profilesnap::workflow::Workflow;

const PNG: &[u8] = b"\x89PNG-not-really";

struct ScriptedPage {
    anchor_present: bool,
}

#[async_trait]
impl Page for ScriptedPage {
    async fn goto(&self, _url: &str, _timeout: Duration) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn hide(&self, _selector: &str) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn scroll_to(&self, _selector: &str) -> Result<bool, CaptureError> {
        Ok(self.anchor_present)
    }

    async fn screenshot_full_page(&self) -> Result<Vec<u8>, CaptureError> {
        Ok(PNG.to_vec())
    }
}

struct ScriptedBrowser {
    anchor_present: bool,
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn open(&self, _viewport: Viewport) -> Result<Box<dyn Page>, CaptureError> {
        Ok(Box::new(ScriptedPage {
            anchor_present: self.anchor_present,
        }))
    }
}

fn test_config(data_dir: std::path::PathBuf, dry_run: bool, keep_count: usize) -> Arc<Config> {
    Arc::new(Config {
        profile_url: "https://github.com/someone".into(),
        repo: "someone/someone".into(),
        branch: "main".into(),
        document_path: "README.md".into(),
        artifact_prefix: "screenshots".into(),
        keep_count,
        insert_after_marker: None,
        api_base_url: "https://api.github.com".into(),
        token: None,
        data_dir,
        log: "info".into(),
        log_format: "pretty".into(),
        dry_run,
        capture: CaptureConfig {
            anchor_selector: Some("h2.popular-repos".into()),
            settle_delay_ms: 0,
            ..CaptureConfig::default()
        },
    })
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn readme(store: &MemoryStore) -> String {
    String::from_utf8(store.bytes_of("README.md").await.unwrap()).unwrap()
}

#[tokio::test]
async fn daily_run_replaces_yesterdays_reference() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .seed("README.md", b"![Profile](./screenshots/2026-01-09.png)\n")
        .await;
    store.seed("screenshots/2026-01-09.png", b"old").await;

    let workflow = Workflow::new(
        test_config(dir.path().to_path_buf(), false, 30),
        Arc::new(ScriptedBrowser { anchor_present: true }),
        store.clone(),
    );

    let report = workflow.run_for_date(date(2026, 1, 10)).await.unwrap();

    assert!(!report.degraded_capture);
    assert_eq!(report.filename, "2026-01-10.png");
    assert_eq!(
        report.artifact.as_ref().unwrap().remote_path,
        "screenshots/2026-01-10.png"
    );
    assert_eq!(report.document_changed, Some(true));

    assert_eq!(
        store.bytes_of("screenshots/2026-01-10.png").await.unwrap(),
        PNG
    );
    assert_eq!(
        readme(&store).await,
        "![Profile](./screenshots/2026-01-10.png)\n"
    );
}

#[tokio::test]
async fn missing_anchor_still_completes_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());

    let workflow = Workflow::new(
        test_config(dir.path().to_path_buf(), false, 30),
        Arc::new(ScriptedBrowser {
            anchor_present: false,
        }),
        store.clone(),
    );

    let report = workflow.run_for_date(date(2026, 1, 10)).await.unwrap();

    assert!(report.degraded_capture);
    assert!(store.contains("screenshots/2026-01-10.png").await);
    assert_eq!(
        readme(&store).await,
        "![Profile](./screenshots/2026-01-10.png)\n"
    );
}

#[tokio::test]
async fn dry_run_only_captures() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.seed("README.md", b"untouched\n").await;

    let workflow = Workflow::new(
        test_config(dir.path().to_path_buf(), true, 30),
        Arc::new(ScriptedBrowser { anchor_present: true }),
        store.clone(),
    );

    let report = workflow.run_for_date(date(2026, 1, 10)).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(store.write_count(), 0);
    assert_eq!(readme(&store).await, "untouched\n");
    assert!(report.sweep.is_none());

    // The capture itself is still inspectable locally.
    let local = report.local_copy.expect("local copy saved");
    assert_eq!(std::fs::read(local).unwrap(), PNG);
}

#[tokio::test]
async fn legacy_reference_blocks_are_replaced_by_exactly_one_current_block() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .seed(
            "README.md",
            b"<!-- github-screenshot-automation -->\n\
              ![shot](https://raw.githubusercontent.com/u/r/main/screenshots/screenshot-2024-01-15-10-30-45.png)\n\n\
              ![Profile Screenshot](https://raw.githubusercontent.com/u/r/main/screenshots/2025-12-31.png)\n\n\
              About me.\n",
        )
        .await;

    let workflow = Workflow::new(
        test_config(dir.path().to_path_buf(), false, 30),
        Arc::new(ScriptedBrowser { anchor_present: true }),
        store.clone(),
    );

    workflow.run_for_date(date(2026, 1, 10)).await.unwrap();

    let doc = readme(&store).await;
    assert_eq!(doc.matches("![Profile](").count(), 1);
    assert_eq!(doc.matches("![Profile Screenshot]").count(), 0);
    assert!(!doc.contains("github-screenshot-automation"));
    assert!(doc.contains("About me."));
    assert!(doc.starts_with("![Profile](./screenshots/2026-01-10.png)\n"));
}

#[tokio::test]
async fn second_run_on_the_same_day_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());

    let workflow = Workflow::new(
        test_config(dir.path().to_path_buf(), false, 30),
        Arc::new(ScriptedBrowser { anchor_present: true }),
        store.clone(),
    );

    let first = workflow.run_for_date(date(2026, 1, 10)).await.unwrap();
    assert_eq!(first.document_changed, Some(true));

    let second = workflow.run_for_date(date(2026, 1, 10)).await.unwrap();
    assert_eq!(second.document_changed, Some(false));

    // One artifact object, one reference block.
    assert_eq!(
        store.list("screenshots").await.unwrap(),
        vec!["screenshots/2026-01-10.png"]
    );
    assert_eq!(readme(&store).await.matches("![Profile](").count(), 1);
}

#[tokio::test]
async fn run_sweeps_down_to_the_retention_bound() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    for day in 1..=31 {
        store
            .seed(&format!("screenshots/2026-01-{day:02}.png"), b"old")
            .await;
    }
    // A stray hand-placed file must survive any sweep.
    store.seed("screenshots/banner.png", b"keep").await;

    let workflow = Workflow::new(
        test_config(dir.path().to_path_buf(), false, 5),
        Arc::new(ScriptedBrowser { anchor_present: true }),
        store.clone(),
    );

    let report = workflow.run_for_date(date(2026, 2, 1)).await.unwrap();

    let sweep = report.sweep.unwrap();
    assert_eq!(sweep.deleted, 27);
    assert!(sweep.warnings.is_empty());

    let remaining = store.list("screenshots").await.unwrap();
    assert_eq!(remaining.len(), 6); // 5 dated + the stray
    assert!(remaining.contains(&"screenshots/2026-02-01.png".to_string()));
    assert!(remaining.contains(&"screenshots/2026-01-31.png".to_string()));
    assert!(remaining.contains(&"screenshots/2026-01-28.png".to_string()));
    assert!(remaining.contains(&"screenshots/banner.png".to_string()));
    assert!(!remaining.contains(&"screenshots/2026-01-27.png".to_string()));
}
