//! Retention sweeping.
//!
//! Trims the artifact prefix down to the `keep_count` most recent entries,
//! dating each by its filename. Fail-safe rules: a name neither the current
//! nor the legacy pattern can date is never deleted, an entry whose date
//! ties the last retained entry is kept, and a failed delete is recorded
//! and skipped rather than aborting the rest of the sweep.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::artifact;
use crate::store::ContentStore;

/// A non-fatal problem encountered during a sweep.
#[derive(Debug, Clone)]
pub struct SweepWarning {
    pub path: String,
    pub reason: String,
}

/// Outcome of one sweep. Warnings never affect the run verdict.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub deleted: usize,
    pub kept: usize,
    pub warnings: Vec<SweepWarning>,
}

/// Delete every datable artifact under `prefix` beyond rank `keep_count`.
pub async fn sweep(store: &dyn ContentStore, prefix: &str, keep_count: usize) -> SweepReport {
    let paths = match store.list(prefix).await {
        Ok(paths) => paths,
        Err(e) => {
            warn!(prefix, err = %e, "artifact listing failed — skipping sweep");
            return SweepReport {
                warnings: vec![SweepWarning {
                    path: prefix.to_string(),
                    reason: format!("listing failed: {e}"),
                }],
                ..Default::default()
            };
        }
    };
    let total = paths.len();

    let mut dated: Vec<(NaiveDate, String)> = Vec::new();
    for path in paths {
        let name = path.rsplit('/').next().unwrap_or(&path);
        match artifact::parse(name) {
            Some(date) => dated.push((date, path)),
            None => debug!(path = %path, "undatable name — left in place"),
        }
    }

    // Newest first; name as tiebreaker only to make ordering deterministic.
    dated.sort_by(|a, b| b.cmp(a));

    let boundary = if keep_count == 0 {
        None
    } else {
        dated.get(keep_count - 1).map(|(date, _)| *date)
    };

    let mut deleted = 0;
    let mut warnings = Vec::new();
    for (date, path) in dated.iter().skip(keep_count) {
        if Some(*date) == boundary {
            debug!(path = %path, "date ties the retention boundary — kept");
            continue;
        }

        let name = path.rsplit('/').next().unwrap_or(path);
        let message = format!("Remove expired screenshot: {name}");
        match store.delete(path, &message).await {
            Ok(()) => {
                debug!(path = %path, "expired artifact deleted");
                deleted += 1;
            }
            Err(e) => {
                warn!(path = %path, err = %e, "delete failed — continuing sweep");
                warnings.push(SweepWarning {
                    path: path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let report = SweepReport {
        deleted,
        kept: total - deleted,
        warnings,
    };
    info!(
        prefix,
        deleted = report.deleted,
        kept = report.kept,
        warnings = report.warnings.len(),
        "sweep complete"
    );
    report
}
