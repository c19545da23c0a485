// SPDX-License-Identifier: MIT
//! Chromium adapter for the browser port.
//!
//! Strategy:
//!   1. `detect_browser()` probes PATH for a supported browser binary.
//!   2. `open()` launches it headless at the requested viewport and attaches
//!      a fresh tab over the DevTools protocol.
//!   3. Page operations (navigate, hide, scroll, screenshot) are blocking
//!      DevTools calls, so each is isolated in `spawn_blocking`.
//!
//! Dropping the page drops the browser handle, which tears the process down.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page as CdpPage;
use headless_chrome::{Browser as ChromeBrowser, LaunchOptions, Tab};
use serde::Deserialize;
use tracing::debug;

use super::{Browser, CaptureError, Page, Viewport};

/// Browser binaries to probe, in preference order.
const CANDIDATE_BROWSERS: &[&str] = &["chromium", "chrome", "google-chrome", "chromium-browser"];

/// Some profile hosts serve a reduced page to unknown agents; present a
/// plain desktop Chrome UA.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How long a found anchor element may take to appear.
const ANCHOR_WAIT: Duration = Duration::from_secs(3);

/// Locate the first headless-capable browser binary on PATH.
pub fn detect_browser() -> Option<PathBuf> {
    let path_var = std::env::var("PATH").ok()?;
    for candidate in CANDIDATE_BROWSERS {
        for dir in path_var.split(':') {
            let binary = Path::new(dir).join(candidate);
            if binary.is_file() {
                debug!(browser = %binary.display(), "headless browser detected on PATH");
                return Some(binary);
            }
        }
    }
    None
}

/// Launches a PATH-discovered Chromium/Chrome per page session.
#[derive(Debug, Default)]
pub struct ChromiumBrowser;

impl ChromiumBrowser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn open(&self, viewport: Viewport) -> Result<Box<dyn Page>, CaptureError> {
        let page = tokio::task::spawn_blocking(move || -> Result<ChromiumPage, CaptureError> {
            let binary = detect_browser().ok_or(CaptureError::NoBrowser)?;

            // Throwaway profile directory: no cookies or cache leak between
            // runs, and a crashed run leaves nothing behind to lock on.
            let profile_dir =
                tempfile::TempDir::new().map_err(|e| CaptureError::Launch(e.to_string()))?;

            let options = LaunchOptions::default_builder()
                .path(Some(binary))
                .headless(true)
                .sandbox(false)
                .window_size(Some((viewport.width, viewport.height)))
                .user_data_dir(Some(profile_dir.path().to_path_buf()))
                .build()
                .map_err(|e| CaptureError::Launch(e.to_string()))?;

            let browser =
                ChromeBrowser::new(options).map_err(|e| CaptureError::Launch(e.to_string()))?;
            let tab = browser
                .new_tab()
                .map_err(|e| CaptureError::Launch(e.to_string()))?;
            tab.set_user_agent(USER_AGENT, None, None)
                .map_err(|e| CaptureError::Launch(e.to_string()))?;

            Ok(ChromiumPage {
                _browser: browser,
                _profile_dir: profile_dir,
                tab,
            })
        })
        .await
        .map_err(|e| CaptureError::Launch(e.to_string()))??;

        Ok(Box::new(page))
    }
}

struct ChromiumPage {
    // Keeps the browser process alive for the lifetime of the tab. Declared
    // before the profile directory so the process exits before its profile
    // is removed.
    _browser: ChromeBrowser,
    _profile_dir: tempfile::TempDir,
    tab: Arc<Tab>,
}

impl ChromiumPage {
    async fn blocking<T, F>(&self, op: F) -> Result<T, CaptureError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> Result<T, CaptureError> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || op(tab))
            .await
            .map_err(|e| CaptureError::Script(e.to_string()))?
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), CaptureError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)
                .map_err(|e| CaptureError::Navigation(e.to_string()))?;
            tab.wait_until_navigated()
                .map_err(|e| CaptureError::Navigation(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn hide(&self, selector: &str) -> Result<(), CaptureError> {
        let quoted = serde_json::Value::String(selector.to_string()).to_string();
        self.blocking(move |tab| {
            let expr = format!(
                "document.querySelectorAll({quoted}).forEach(el => el.style.display = 'none')"
            );
            tab.evaluate(&expr, false)
                .map_err(|e| CaptureError::Script(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn scroll_to(&self, selector: &str) -> Result<bool, CaptureError> {
        let selector = selector.to_string();
        self.blocking(move |tab| {
            match tab.wait_for_element_with_custom_timeout(&selector, ANCHOR_WAIT) {
                Ok(element) => {
                    element
                        .scroll_into_view()
                        .map_err(|e| CaptureError::Script(e.to_string()))?;
                    Ok(true)
                }
                Err(_) => Ok(false),
            }
        })
        .await
    }

    async fn screenshot_full_page(&self) -> Result<Vec<u8>, CaptureError> {
        self.blocking(move |tab| {
            // Everything from the current scroll offset to the bottom of the
            // document, at full scrollable width.
            let metrics = page_metrics(&tab)?;
            let clip = CdpPage::Viewport {
                x: 0.0,
                y: metrics.scroll_y,
                width: metrics.width,
                height: (metrics.height - metrics.scroll_y).max(1.0),
                scale: 1.0,
            };

            tab.capture_screenshot(
                CdpPage::CaptureScreenshotFormatOption::Png,
                None,
                Some(clip),
                true,
            )
            .map_err(|e| CaptureError::Screenshot(e.to_string()))
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct PageMetrics {
    scroll_y: f64,
    width: f64,
    height: f64,
}

fn page_metrics(tab: &Tab) -> Result<PageMetrics, CaptureError> {
    let expr = "JSON.stringify({ scroll_y: window.scrollY, \
                width: document.documentElement.scrollWidth, \
                height: document.documentElement.scrollHeight })";
    let result = tab
        .evaluate(expr, false)
        .map_err(|e| CaptureError::Script(e.to_string()))?;

    let encoded = result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| CaptureError::Script("page metrics evaluated to nothing".into()))?;

    serde_json::from_str(&encoded)
        .map_err(|e| CaptureError::Script(format!("unreadable page metrics: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test because it mutates the process-wide PATH.
    #[test]
    fn detect_browser_probes_path_candidates() {
        let empty = tempfile::tempdir().unwrap();
        let stocked = tempfile::tempdir().unwrap();
        let fake = stocked.path().join("chromium");
        std::fs::write(&fake, b"#!/bin/sh\n").unwrap();

        let original = std::env::var_os("PATH");

        std::env::set_var("PATH", empty.path());
        let missing = detect_browser();

        std::env::set_var("PATH", stocked.path());
        let found = detect_browser();

        match original {
            Some(p) => std::env::set_var("PATH", p),
            None => std::env::remove_var("PATH"),
        }

        assert!(missing.is_none());
        assert_eq!(found, Some(fake));
    }
}
