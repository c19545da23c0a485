use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::error;

use crate::capture::{CaptureRequest, Viewport};

const DEFAULT_BRANCH: &str = "main";
const DEFAULT_DOCUMENT_PATH: &str = "README.md";
const DEFAULT_ARTIFACT_PREFIX: &str = "screenshots";
const DEFAULT_KEEP_COUNT: usize = 30;
const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

// ─── CaptureConfig ────────────────────────────────────────────────────────────

/// Screenshot framing configuration (`[capture]` in config.toml).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Browser viewport width in pixels (800–3840). Default: 1920.
    pub viewport_width: u32,
    /// Browser viewport height in pixels (600–2160). Default: 1080.
    pub viewport_height: u32,
    /// CSS selector scrolled into view before the capture. None = capture
    /// from the top of the page.
    pub anchor_selector: Option<String>,
    /// CSS selectors hidden before the capture (e.g. the profile README
    /// section, so the shot starts at the repositories list).
    pub hide_selectors: Vec<String>,
    /// Wait after scrolling for layout/animation to stabilize (milliseconds).
    /// Default: 1000.
    pub settle_delay_ms: u64,
    /// Page navigation/readiness timeout in seconds. Default: 30.
    pub navigation_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1920,
            viewport_height: 1080,
            anchor_selector: None,
            hide_selectors: vec![],
            settle_delay_ms: 1000,
            navigation_timeout_secs: 30,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Public profile page to screenshot.
    profile_url: Option<String>,
    /// Target repository holding both the artifacts and the document,
    /// `owner/name`.
    repo: Option<String>,
    /// Branch written to (default: "main").
    branch: Option<String>,
    /// Repository path of the target document (default: "README.md").
    document_path: Option<String>,
    /// Storage prefix for artifacts (default: "screenshots").
    artifact_prefix: Option<String>,
    /// How many artifacts the sweeper retains (default: 30).
    keep_count: Option<usize>,
    /// Insert the reference block after the first line containing this
    /// marker instead of at the top of the document.
    insert_after_marker: Option<String>,
    /// Override the GitHub API base URL (default: https://api.github.com).
    api_base_url: Option<String>,
    /// API token. Prefer the GITHUB_TOKEN environment variable.
    token: Option<String>,
    /// Log level filter string, e.g. "debug", "info,profilesnap=trace".
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Capture without publishing, patching, or sweeping.
    dry_run: Option<bool>,
    /// Screenshot framing (`[capture]`).
    capture: Option<CaptureConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{name}` — set {hint}")]
    Missing {
        name: &'static str,
        hint: &'static str,
    },

    #[error("invalid `{name}`: {reason}")]
    Invalid {
        name: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Public profile page to screenshot (PROFILESNAP_PROFILE_URL env var).
    pub profile_url: String,
    /// Target repository, `owner/name` (PROFILESNAP_REPO env var).
    pub repo: String,
    /// Branch written to (PROFILESNAP_BRANCH env var).
    pub branch: String,
    /// Repository path of the target document.
    pub document_path: String,
    /// Storage prefix for artifacts.
    pub artifact_prefix: String,
    /// Retention bound for the sweeper.
    pub keep_count: usize,
    /// Optional marker line the reference block is inserted after.
    pub insert_after_marker: Option<String>,
    /// GitHub API base URL (PROFILESNAP_API_URL env var).
    pub api_base_url: String,
    /// API token (GITHUB_TOKEN env var). None is only viable for dry runs.
    pub token: Option<String>,
    pub data_dir: PathBuf,
    pub log: String,
    pub log_format: String,
    pub dry_run: bool,
    pub capture: CaptureConfig,
}

impl Config {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn load(
        data_dir: Option<PathBuf>,
        log: Option<String>,
        log_format: Option<String>,
        dry_run: bool,
    ) -> Result<Self, ConfigError> {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let profile_url = env_nonempty("PROFILESNAP_PROFILE_URL")
            .or(toml.profile_url)
            .ok_or(ConfigError::Missing {
                name: "profile_url",
                hint: "PROFILESNAP_PROFILE_URL or `profile_url` in config.toml",
            })?;

        let repo = env_nonempty("PROFILESNAP_REPO")
            .or(toml.repo)
            .ok_or(ConfigError::Missing {
                name: "repo",
                hint: "PROFILESNAP_REPO or `repo` in config.toml",
            })?;

        let branch = env_nonempty("PROFILESNAP_BRANCH")
            .or(toml.branch)
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        let api_base_url = env_nonempty("PROFILESNAP_API_URL")
            .or(toml.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let token = env_nonempty("GITHUB_TOKEN").or(toml.token);

        let config = Self {
            profile_url,
            repo,
            branch,
            document_path: toml
                .document_path
                .unwrap_or_else(|| DEFAULT_DOCUMENT_PATH.to_string()),
            artifact_prefix: toml
                .artifact_prefix
                .unwrap_or_else(|| DEFAULT_ARTIFACT_PREFIX.to_string()),
            keep_count: toml.keep_count.unwrap_or(DEFAULT_KEEP_COUNT),
            insert_after_marker: toml.insert_after_marker,
            api_base_url,
            token,
            data_dir,
            log: log.or(toml.log).unwrap_or_else(|| "info".to_string()),
            log_format: log_format
                .or(toml.log_format)
                .unwrap_or_else(|| "pretty".to_string()),
            dry_run: dry_run || toml.dry_run.unwrap_or(false),
            capture: toml.capture.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.repo.contains('/') || self.repo.starts_with('/') || self.repo.ends_with('/') {
            return Err(ConfigError::Invalid {
                name: "repo",
                reason: format!("expected owner/name, got: {}", self.repo),
            });
        }

        if !self.profile_url.starts_with("https://") && !self.profile_url.starts_with("http://") {
            return Err(ConfigError::Invalid {
                name: "profile_url",
                reason: format!("expected an http(s) URL, got: {}", self.profile_url),
            });
        }

        let w = self.capture.viewport_width;
        if !(800..=3840).contains(&w) {
            return Err(ConfigError::Invalid {
                name: "capture.viewport_width",
                reason: format!("{w} is outside 800–3840"),
            });
        }

        let h = self.capture.viewport_height;
        if !(600..=2160).contains(&h) {
            return Err(ConfigError::Invalid {
                name: "capture.viewport_height",
                reason: format!("{h} is outside 600–2160"),
            });
        }

        Ok(())
    }

    /// Token, or an error naming where to put one. Mutating commands call
    /// this; dry runs and capture-only runs never need it.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or(ConfigError::Missing {
            name: "token",
            hint: "GITHUB_TOKEN or `token` in config.toml",
        })
    }

    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            url: self.profile_url.clone(),
            viewport: Viewport {
                width: self.capture.viewport_width,
                height: self.capture.viewport_height,
            },
            anchor_selector: self.capture.anchor_selector.clone(),
            hide_selectors: self.capture.hide_selectors.clone(),
            settle_delay: Duration::from_millis(self.capture.settle_delay_ms),
            navigation_timeout: Duration::from_secs(self.capture.navigation_timeout_secs),
        }
    }

    /// Directory that receives local copies of captured screenshots.
    pub fn screenshots_dir(&self) -> PathBuf {
        self.data_dir.join("screenshots")
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/profilesnap
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("profilesnap");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/profilesnap or ~/.local/share/profilesnap
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("profilesnap");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("profilesnap");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\profilesnap
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("profilesnap");
        }
    }
    // Fallback
    PathBuf::from(".profilesnap")
}
