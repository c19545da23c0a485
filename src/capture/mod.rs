// SPDX-License-Identifier: MIT
//! Profile page capture.
//!
//! [`CaptureUnit`] owns the capture sequence — navigate, hide configured
//! elements, scroll to the anchor, settle, screenshot — over the [`Browser`]
//! / [`Page`] ports. The production adapter lives in [`chromium`]; tests
//! drive the unit with a scripted fake.
//!
//! A missing anchor never fails the run: the unit captures from the current
//! scroll position and flags the snapshot as degraded.

pub mod chromium;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::observability::format_bytes;

/// Maximum accepted screenshot size (10 MB raw PNG bytes).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Browser viewport in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// One capture request: where to point the browser and how to frame the shot.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub url: String,
    pub viewport: Viewport,
    /// CSS selector to scroll into view before capturing. Not finding it is
    /// a degraded capture, not a failure.
    pub anchor_selector: Option<String>,
    /// CSS selectors hidden (display: none) before the capture.
    pub hide_selectors: Vec<String>,
    /// Wait after scrolling for layout and animation to stabilize.
    pub settle_delay: Duration,
    pub navigation_timeout: Duration,
}

/// A successful capture: image bytes plus metadata.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    /// True when the anchor selector was configured but could not be used.
    pub degraded: bool,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(
        "no headless browser found on PATH — install Chromium or Chrome so one of \
         these binaries is available: chromium, chrome, google-chrome, chromium-browser"
    )]
    NoBrowser,

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("browser produced an empty screenshot")]
    EmptyCapture,

    #[error("screenshot is too large ({size} bytes exceeds the {MAX_IMAGE_BYTES} byte limit)")]
    SizeExceeded { size: usize },
}

/// Browser capability: open an isolated page session at a given viewport.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open(&self, viewport: Viewport) -> Result<Box<dyn Page>, CaptureError>;
}

/// One page session. Implementations own the underlying browser lifetime;
/// dropping the page tears the session down.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), CaptureError>;

    /// Hide every element matching `selector`.
    async fn hide(&self, selector: &str) -> Result<(), CaptureError>;

    /// Scroll the first element matching `selector` into view.
    /// `Ok(false)` when nothing matches.
    async fn scroll_to(&self, selector: &str) -> Result<bool, CaptureError>;

    /// Capture the full scrollable document height from the current scroll
    /// offset downward.
    async fn screenshot_full_page(&self) -> Result<Vec<u8>, CaptureError>;
}

/// Drives one capture over a [`Browser`].
pub struct CaptureUnit {
    browser: std::sync::Arc<dyn Browser>,
}

impl CaptureUnit {
    pub fn new(browser: std::sync::Arc<dyn Browser>) -> Self {
        Self { browser }
    }

    pub async fn capture(&self, req: &CaptureRequest) -> Result<Snapshot, CaptureError> {
        let page = self.browser.open(req.viewport).await?;

        info!(url = %req.url, "navigating");
        page.goto(&req.url, req.navigation_timeout).await?;

        for selector in &req.hide_selectors {
            if let Err(e) = page.hide(selector).await {
                warn!(selector = %selector, err = %e, "could not hide element — capturing with it visible");
            }
        }

        let mut degraded = false;
        if let Some(anchor) = &req.anchor_selector {
            match page.scroll_to(anchor).await {
                Ok(true) => debug!(selector = %anchor, "scrolled to anchor"),
                Ok(false) => {
                    degraded = true;
                    warn!(
                        selector = %anchor,
                        "anchor not found — capturing from current scroll position"
                    );
                }
                Err(e) => {
                    degraded = true;
                    warn!(
                        selector = %anchor,
                        err = %e,
                        "anchor scroll failed — capturing from current scroll position"
                    );
                }
            }
        }

        if !req.settle_delay.is_zero() {
            tokio::time::sleep(req.settle_delay).await;
        }

        let bytes = page.screenshot_full_page().await?;
        if bytes.is_empty() {
            return Err(CaptureError::EmptyCapture);
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(CaptureError::SizeExceeded { size: bytes.len() });
        }

        info!(size = %format_bytes(bytes.len() as u64), degraded, "capture complete");

        Ok(Snapshot {
            bytes,
            width: req.viewport.width,
            height: req.viewport.height,
            captured_at: Utc::now(),
            degraded,
        })
    }
}
