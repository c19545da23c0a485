//! Target document patching.
//!
//! The target document carries at most one live reference block — the fixed
//! `![Profile]` marker followed by a link to the newest artifact. Patching
//! is fetch → remove every recognized block (current and historical
//! formats) → insert one fresh block → write back, and the write carries
//! the version token from the fetch so a concurrently modified document
//! fails the run instead of being overwritten.
//!
//! Historical formats are an ordered list of recognizers
//! ([`ReferenceFormat`]); supporting a future format means adding a variant.

use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::publish::ArtifactRef;
use crate::store::{ContentStore, StoreError};

/// Fixed marker token opening every current-format reference block.
pub const MARKER: &str = "![Profile]";

/// Recognized reference-block formats, in removal order. The banner format
/// goes first so its trailing image is consumed together with the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceFormat {
    /// `<!-- github-screenshot-automation -->` banner followed by any image.
    LegacyBanner,
    /// `![Profile Screenshot](<target>)` — retired labeled format.
    LegacyLabeled,
    /// `![Profile](<target>)` — the format new blocks use.
    Current,
}

impl ReferenceFormat {
    pub const ALL: [ReferenceFormat; 3] = [
        ReferenceFormat::LegacyBanner,
        ReferenceFormat::LegacyLabeled,
        ReferenceFormat::Current,
    ];

    fn pattern(self) -> &'static Regex {
        static BANNER: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"<!-- github-screenshot-automation -->\s*!\[[^\]\n]*\]\([^)\n]*\)")
                .unwrap()
        });
        static LABELED: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"!\[Profile Screenshot\]\([^)\n]*\)").unwrap());
        static CURRENT: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"!\[Profile\]\([^)\n]*\)").unwrap());

        match self {
            ReferenceFormat::LegacyBanner => &BANNER,
            ReferenceFormat::LegacyLabeled => &LABELED,
            ReferenceFormat::Current => &CURRENT,
        }
    }
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("document store error: {0}")]
    Store(StoreError),

    #[error("document {0} was modified concurrently — not overwriting")]
    ConcurrentModification(String),

    #[error("document is not valid UTF-8 text")]
    NotText,
}

impl From<StoreError> for PatchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PreconditionFailed { path } => PatchError::ConcurrentModification(path),
            other => PatchError::Store(other),
        }
    }
}

/// Render the reference block for an artifact. Deliberately minimal: the
/// marker, one single-word alt, the relative link — every character counts
/// when the same block is reused in width-constrained fields.
pub fn reference_block(artifact: &ArtifactRef) -> String {
    format!("![Profile]({})", artifact.relative)
}

/// Remove every recognized reference block and tidy the leftovers: runs of
/// three or more newlines collapse to a blank line, and leading blank space
/// is dropped so re-insertion at the top is byte-stable.
pub fn strip_reference_blocks(content: &str) -> String {
    static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

    let mut out = content.to_string();
    for format in ReferenceFormat::ALL {
        out = format.pattern().replace_all(&out, "").into_owned();
    }
    let out = BLANK_RUNS.replace_all(&out, "\n\n");
    out.trim_start().to_string()
}

fn compose(block: &str, rest: &str, insert_after: Option<&str>) -> String {
    if let Some(marker) = insert_after {
        let lines: Vec<&str> = rest.lines().collect();
        if let Some(idx) = lines.iter().position(|line| line.contains(marker)) {
            let mut out = String::new();
            for line in &lines[..=idx] {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
            out.push_str(block);
            out.push('\n');

            let tail: Vec<&str> = lines[idx + 1..]
                .iter()
                .copied()
                .skip_while(|line| line.trim().is_empty())
                .collect();
            if !tail.is_empty() {
                out.push('\n');
                for line in tail {
                    out.push_str(line);
                    out.push('\n');
                }
            }
            return out;
        }
        warn!(marker, "insert marker not found — inserting at top of document");
    }

    if rest.is_empty() {
        format!("{block}\n")
    } else {
        format!("{block}\n\n{rest}")
    }
}

/// Rewrites the target document to reference one artifact.
pub struct DocumentPatcher {
    store: Arc<dyn ContentStore>,
    document_path: String,
    insert_after: Option<String>,
}

impl DocumentPatcher {
    pub fn new(
        store: Arc<dyn ContentStore>,
        document_path: impl Into<String>,
        insert_after: Option<String>,
    ) -> Self {
        Self {
            store,
            document_path: document_path.into(),
            insert_after,
        }
    }

    /// Patch the document to reference `artifact`. Returns whether the
    /// stored content actually changed; an already-correct document is left
    /// untouched (no write, no commit).
    pub async fn patch(&self, artifact: &ArtifactRef, date: NaiveDate) -> Result<bool, PatchError> {
        let fetched = self.store.read(&self.document_path).await?;
        let (original, version) = match &fetched {
            Some(obj) => (
                String::from_utf8(obj.bytes.clone()).map_err(|_| PatchError::NotText)?,
                Some(&obj.version),
            ),
            None => {
                debug!(path = %self.document_path, "document absent — starting from empty");
                (String::new(), None)
            }
        };

        let block = reference_block(artifact);
        let rest = strip_reference_blocks(&original);
        let updated = compose(&block, &rest, self.insert_after.as_deref());

        if updated == original {
            info!(path = %self.document_path, "document already references this artifact — nothing to write");
            return Ok(false);
        }

        let day = date.format("%Y-%m-%d");
        let message = if version.is_some() {
            format!("Update profile screenshot - {day}")
        } else {
            format!("Create README with profile screenshot - {day}")
        };

        self.store
            .write(&self.document_path, updated.as_bytes(), &message, version)
            .await?;

        info!(path = %self.document_path, bytes = updated.len(), "document updated");
        Ok(true)
    }
}
