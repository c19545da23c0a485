//! GitHub Contents API adapter for [`ContentStore`].
//!
//! Version tokens are blob SHAs. An update PUT carries the expected SHA;
//! GitHub rejects a stale SHA with 409/422, which surfaces as
//! [`StoreError::PreconditionFailed`]. A missing repository is created on
//! first write (public, empty) and the write retried, so publishing works
//! against a brand-new target.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ContentStore, StoreError, StoredObject, VersionToken};
use crate::retry::Backoff;

const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct GhContentFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhDirEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct GhWriteResponse {
    content: GhWrittenBlob,
}

#[derive(Debug, Deserialize)]
struct GhWrittenBlob {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

/// Content store backed by one branch of one GitHub repository.
pub struct GitHubStore {
    client: reqwest::Client,
    api_base: String,
    /// `owner/name`.
    repo: String,
    branch: String,
    token: String,
    backoff: Backoff,
}

impl GitHubStore {
    pub fn new(
        api_base: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            repo: repo.into(),
            branch: branch.into(),
            token: token.into(),
            backoff: Backoff::default(),
        })
    }

    /// Replace the retry policy (tests use [`Backoff::instant`]).
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Resolve the authenticated login and warn when it differs from the
    /// repository owner. A mismatch is not fatal — collaborator tokens are
    /// legitimate — but it is the most common misconfiguration.
    pub async fn verify_identity(&self) -> Result<String, StoreError> {
        let url = format!("{}/user", self.api_base);
        let resp = self.get(&url).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.status_error(status, "user", &body_message(resp).await));
        }
        let user: GhUser = resp
            .json()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let owner = self.repo.split('/').next().unwrap_or_default();
        if user.login != owner {
            warn!(
                login = %user.login,
                owner = %owner,
                "authenticated user differs from repository owner"
            );
        } else {
            info!(login = %user.login, "authenticated");
        }
        Ok(user.login)
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.api_base, self.repo, path)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, StoreError> {
        self.client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header(
                "User-Agent",
                format!("profilesnap/{}", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, StoreError> {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header(
                "User-Agent",
                format!("profilesnap/{}", env!("CARGO_PKG_VERSION")),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))
    }

    fn status_error(&self, status: StatusCode, path: &str, message: &str) -> StoreError {
        match status {
            StatusCode::UNAUTHORIZED => StoreError::Auth(message.to_string()),
            StatusCode::FORBIDDEN => StoreError::Permission(message.to_string()),
            StatusCode::NOT_FOUND => StoreError::NotFound(path.to_string()),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                StoreError::PreconditionFailed {
                    path: path.to_string(),
                }
            }
            other => StoreError::Api {
                status: other.as_u16(),
                message: message.to_string(),
            },
        }
    }

    /// Current blob SHA of `path`, or `None` when absent.
    async fn current_version(&self, path: &str) -> Result<Option<VersionToken>, StoreError> {
        match self.fetch_file(path).await? {
            Some(file) => Ok(Some(VersionToken(file.sha))),
            None => Ok(None),
        }
    }

    async fn fetch_file(&self, path: &str) -> Result<Option<GhContentFile>, StoreError> {
        let url = self.contents_url(path);
        let resp = self.get(&url).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let file: GhContentFile = resp
                    .json()
                    .await
                    .map_err(|e| StoreError::Network(e.to_string()))?;
                Ok(Some(file))
            }
            status => Err(self.status_error(status, path, &body_message(resp).await)),
        }
    }

    async fn put_contents(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<VersionToken, StoreError> {
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(bytes),
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        let url = self.contents_url(path);
        let resp = self
            .send_json(reqwest::Method::PUT, &url, &body)
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.status_error(status, path, &body_message(resp).await));
        }
        let written: GhWriteResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(VersionToken(written.content.sha))
    }

    /// Create the backing repository: public, no auto-init. Called when a
    /// contents write 404s because the repository itself is missing.
    async fn create_repository(&self) -> Result<(), StoreError> {
        let name = self.repo.split('/').nth(1).unwrap_or(&self.repo);
        info!(repo = %self.repo, "repository not found — creating it");

        let body = json!({
            "name": name,
            "description": format!("Profile repository for {name}"),
            "private": false,
            "auto_init": false,
        });
        let url = format!("{}/user/repos", self.api_base);
        let resp = self
            .send_json(reqwest::Method::POST, &url, &body)
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.status_error(status, &self.repo, &body_message(resp).await));
        }
        Ok(())
    }
}

async fn body_message(resp: reqwest::Response) -> String {
    #[derive(Deserialize)]
    struct GhErrorBody {
        message: String,
    }
    match resp.json::<GhErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => String::new(),
    }
}

#[async_trait::async_trait]
impl ContentStore for GitHubStore {
    async fn read(&self, path: &str) -> Result<Option<StoredObject>, StoreError> {
        let file = self
            .backoff
            .run(|| self.fetch_file(path), StoreError::is_transient)
            .await?;

        let Some(file) = file else { return Ok(None) };

        // The Contents API wraps base64 at 60 columns; strip the newlines
        // before decoding.
        let raw: String = file
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = BASE64.decode(raw.as_bytes()).map_err(|e| StoreError::Api {
            status: 200,
            message: format!("undecodable content for {path}: {e}"),
        })?;

        Ok(Some(StoredObject {
            bytes,
            version: VersionToken(file.sha),
        }))
    }

    async fn write(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError> {
        self.backoff
            .run(
                || async {
                    // Unconditional writes still need the current SHA when
                    // the object exists — the API refuses a blind update.
                    let sha = match expected {
                        Some(token) => Some(token.0.clone()),
                        None => self.current_version(path).await?.map(|t| t.0),
                    };

                    match self.put_contents(path, bytes, message, sha.as_deref()).await {
                        Err(StoreError::NotFound(_)) => {
                            // The repository itself is missing.
                            self.create_repository().await?;
                            debug!(path, "retrying write after repository creation");
                            self.put_contents(path, bytes, message, None).await
                        }
                        other => other,
                    }
                },
                StoreError::is_transient,
            )
            .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.backoff
            .run(
                || async {
                    let url = self.contents_url(prefix);
                    let resp = self.get(&url).await?;
                    match resp.status() {
                        StatusCode::NOT_FOUND => Ok(Vec::new()),
                        status if status.is_success() => {
                            let entries: Vec<GhDirEntry> = resp
                                .json()
                                .await
                                .map_err(|e| StoreError::Network(e.to_string()))?;
                            Ok(entries
                                .into_iter()
                                .filter(|e| e.kind == "file")
                                .map(|e| e.path)
                                .collect())
                        }
                        status => Err(self.status_error(status, prefix, &body_message(resp).await)),
                    }
                },
                StoreError::is_transient,
            )
            .await
    }

    async fn delete(&self, path: &str, message: &str) -> Result<(), StoreError> {
        self.backoff
            .run(
                || async {
                    let Some(version) = self.current_version(path).await? else {
                        return Err(StoreError::NotFound(path.to_string()));
                    };

                    let body = json!({
                        "message": message,
                        "sha": version.0,
                        "branch": self.branch,
                    });
                    let url = self.contents_url(path);
                    let resp = self
                        .send_json(reqwest::Method::DELETE, &url, &body)
                        .await?;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(self.status_error(status, path, &body_message(resp).await));
                    }
                    Ok(())
                },
                StoreError::is_transient,
            )
            .await
    }
}
