//! Registry configuration and backend selection.
//!
//! [`RegistryConfig`] decides which storage backend a registry runs on: the
//! remote versioned store when remote credentials are present, otherwise the
//! local-file fallback. Configuration can be built programmatically or read
//! from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BRANCH, DEFAULT_LOCAL_PATH, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS,
    ENV_REMOTE_BRANCH, ENV_REMOTE_REPO, ENV_REMOTE_TOKEN,
};
use crate::store::{GitHubBackend, LocalFileBackend, StorageBackend, StoreError};

/// Credentials and target for the remote versioned store.
///
/// # Examples
///
/// ```
/// use keepalive_store::RemoteConfig;
///
/// let remote = RemoteConfig::new("ghp_example", "acme/task-state")
///     .with_branch("state");
/// assert_eq!(remote.branch, "state");
/// ```
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Access token for the remote store. Treated as a secret: never logged.
    pub token: String,

    /// Target repository in `owner/repo` form.
    pub repo: String,

    /// Branch the snapshot object lives on.
    pub branch: String,
}

impl RemoteConfig {
    /// Creates a remote configuration targeting the default branch.
    pub fn new(token: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_string(),
        }
    }

    /// Sets the branch the snapshot object lives on.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Reads the remote configuration from the environment.
    ///
    /// Returns `None` unless both `GITHUB_STORAGE_TOKEN` and
    /// `GITHUB_STORAGE_REPO` are set and non-empty. `GITHUB_STORAGE_BRANCH`
    /// is optional and defaults to `main`.
    pub fn from_env() -> Option<Self> {
        let token = non_empty_env(ENV_REMOTE_TOKEN)?;
        let repo = non_empty_env(ENV_REMOTE_REPO)?;
        let branch = non_empty_env(ENV_REMOTE_BRANCH).unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        Some(Self { token, repo, branch })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Full registry configuration: backend selection, retry budget, timeouts.
///
/// # Examples
///
/// ```
/// use keepalive_store::RegistryConfig;
///
/// // Local-file fallback: no remote configured.
/// let config = RegistryConfig::default();
/// let backend = config.backend().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Remote store target, or `None` for the local-file fallback.
    pub remote: Option<RemoteConfig>,

    /// Snapshot path used by the local fallback.
    pub local_path: PathBuf,

    /// Conditioned-write attempts before a save gives up.
    pub max_attempts: u32,

    /// Timeout applied to each remote read and write call.
    pub timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            remote: None,
            local_path: PathBuf::from(DEFAULT_LOCAL_PATH),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RegistryConfig {
    /// Builds a configuration from the environment: remote when the
    /// `GITHUB_STORAGE_*` variables are present, local fallback otherwise.
    pub fn from_env() -> Self {
        Self {
            remote: RemoteConfig::from_env(),
            ..Self::default()
        }
    }

    /// Sets the remote store target.
    #[must_use]
    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Sets the local fallback snapshot path.
    #[must_use]
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = path.into();
        self
    }

    /// Sets the conditioned-write attempt budget. Clamped to at least 1.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the per-call remote timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Constructs the storage backend this configuration selects.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] if the remote HTTP client cannot be built,
    /// for example when the token is not a valid header value.
    pub fn backend(&self) -> Result<Box<dyn StorageBackend>, StoreError> {
        match &self.remote {
            Some(remote) => {
                tracing::debug!(repo = %remote.repo, branch = %remote.branch, "using remote store");
                Ok(Box::new(GitHubBackend::new(remote, self.timeout)?))
            },
            None => {
                tracing::debug!(path = %self.local_path.display(), "using local file store");
                Ok(Box::new(LocalFileBackend::new(&self.local_path)))
            },
        }
    }
}
