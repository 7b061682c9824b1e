//! Remote versioned storage backend over the GitHub contents API.
//!
//! [`GitHubBackend`] stores the snapshot as a single file in a repository
//! and uses the file's blob SHA as the opaque version token. The contents
//! API is a natural fit for the conditioned-write contract:
//!
//! - `GET /repos/{repo}/contents/{path}?ref={branch}` returns the file
//!   content (base64) together with its current SHA.
//! - `PUT` to the same URL creates or updates the file; when the file
//!   already exists the request must carry the expected SHA, and a stale or
//!   missing SHA is rejected without changing the stored state.
//! - A `PUT` to a path whose directories do not exist creates them
//!   implicitly; there is no separate mkdir step.
//!
//! This backend is a thin adapter: it maps HTTP statuses onto
//! [`StoreError`] and moves bytes. The retry-and-merge protocol lives in
//! [`TaskRegistry`](crate::registry::TaskRegistry).

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::constants::{GITHUB_API_BASE, GITHUB_API_VERSION, REMOTE_OBJECT_PATH};
use crate::store::backend::{StorageBackend, StoreError, VersionedObject};

/// File metadata returned by the contents API on read.
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

/// Body of a contents API `PUT` request.
///
/// `sha` is omitted entirely on first creation; sending it as `null` is
/// rejected by the API.
#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// Metadata returned by the contents API on a successful write.
#[derive(Debug, Deserialize)]
struct PutResponse {
    content: Option<PutContent>,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

/// Versioned backend storing the snapshot in a GitHub repository file.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use keepalive_store::{GitHubBackend, RemoteConfig};
///
/// let config = RemoteConfig::new("ghp_example", "acme/task-state");
/// let backend = GitHubBackend::new(&config, Duration::from_secs(10)).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct GitHubBackend {
    client: reqwest::Client,
    repo: String,
    branch: String,
    object_path: String,
    base_url: String,
}

impl GitHubBackend {
    /// Creates a backend for the configured repository and branch.
    ///
    /// Both read and write calls are bounded by `timeout`; an elapsed
    /// timeout surfaces as [`StoreError::Unreachable`].
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] if the token cannot be used as a header
    /// value or the HTTP client cannot be constructed.
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("token {}", config.token)).map_err(|e| {
            StoreError::Backend {
                message: "remote store token is not a valid header value".to_string(),
                source: Some(Box::new(e)),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("keepalive-store/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Backend {
                message: "failed to construct HTTP client".to_string(),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            object_path: REMOTE_OBJECT_PATH.to_string(),
            base_url: GITHUB_API_BASE.to_string(),
        })
    }

    /// Overrides the API base URL. Used to point the backend at a test
    /// server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the snapshot object path inside the repository.
    pub fn with_object_path(mut self, path: impl Into<String>) -> Self {
        self.object_path = path.into();
        self
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.base_url, self.repo, self.object_path
        )
    }

    fn transport_error(&self, err: reqwest::Error) -> StoreError {
        let message = if err.is_timeout() {
            format!("request to {} timed out", self.repo)
        } else {
            format!("request to {} failed: {err}", self.repo)
        };
        StoreError::Unreachable { message }
    }

    async fn unexpected_status(&self, action: &str, resp: reqwest::Response) -> StoreError {
        let status = resp.status();
        let mut body = resp.text().await.unwrap_or_default();
        truncate_utf8(&mut body, 200);
        StoreError::Backend {
            message: format!("{action} {} answered HTTP {status}: {body}", self.object_path),
            source: None,
        }
    }
}

/// Shortens `body` to at most `max` bytes without splitting a character.
fn truncate_utf8(body: &mut String, max: usize) {
    if body.len() <= max {
        return;
    }
    let mut cut = max;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
}

/// Decodes a contents API payload: base64 with embedded line breaks.
fn decode_content(raw: &str) -> Result<Vec<u8>, StoreError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(compact).map_err(|e| StoreError::Backend {
        message: "stored object is not valid base64".to_string(),
        source: Some(Box::new(e)),
    })
}

#[async_trait]
impl StorageBackend for GitHubBackend {
    async fn read(&self) -> Result<VersionedObject, StoreError> {
        let resp = self
            .client
            .get(self.contents_url())
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match resp.status() {
            StatusCode::OK => {
                let body: ContentsResponse =
                    resp.json().await.map_err(|e| StoreError::Backend {
                        message: "malformed contents response".to_string(),
                        source: Some(Box::new(e)),
                    })?;
                Ok(VersionedObject {
                    data: decode_content(&body.content)?,
                    token: Some(body.sha),
                })
            },
            StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                path: self.object_path.clone(),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Unauthorized {
                status: resp.status().as_u16(),
            }),
            _ => Err(self.unexpected_status("reading", resp).await),
        }
    }

    async fn write(
        &self,
        data: &[u8],
        expected: Option<&str>,
        message: &str,
    ) -> Result<Option<String>, StoreError> {
        let body = PutRequest {
            message,
            content: BASE64.encode(data),
            branch: &self.branch,
            sha: expected,
        };

        let resp = self
            .client
            .put(self.contents_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match resp.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let body: PutResponse = resp.json().await.map_err(|e| StoreError::Backend {
                    message: "malformed write response".to_string(),
                    source: Some(Box::new(e)),
                })?;
                Ok(body.content.map(|c| c.sha))
            },
            // 409 is the documented conflict answer; 422 is returned when
            // the file exists but no sha was supplied, which is the
            // first-creation race. Both mean the object changed under us.
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(StoreError::VersionConflict {
                    path: self.object_path.clone(),
                    expected: expected.map(String::from),
                })
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Unauthorized {
                status: resp.status().as_u16(),
            }),
            StatusCode::NOT_FOUND => Err(StoreError::Backend {
                message: format!(
                    "repository {} or branch {} not found (check repo and token scope)",
                    self.repo, self.branch
                ),
                source: None,
            }),
            _ => Err(self.unexpected_status("writing", resp).await),
        }
    }
}
