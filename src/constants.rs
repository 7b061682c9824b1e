//! Default paths, limits, and protocol constants for the task registry.

/// Path of the snapshot object inside the remote repository.
///
/// Namespaced under a dedicated subdirectory so the registry never collides
/// with unrelated content at the repository root. The remote store creates
/// the directory implicitly on first write.
pub const REMOTE_OBJECT_PATH: &str = "keepalive/tasks.json";

/// Default path of the snapshot file used by the local fallback store.
pub const DEFAULT_LOCAL_PATH: &str = "keepalive_tasks.json";

/// Default branch written to when none is configured.
pub const DEFAULT_BRANCH: &str = "main";

/// Default number of conditioned-write attempts before a save gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default timeout in seconds for remote read and write calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Separator between the owner and resource components of a snapshot key.
pub const KEY_SEPARATOR: char = '|';

/// Base URL of the GitHub REST API.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Value sent in the `X-GitHub-Api-Version` header.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

/// Environment variable holding the remote store access token.
pub const ENV_REMOTE_TOKEN: &str = "GITHUB_STORAGE_TOKEN";

/// Environment variable holding the remote repository (`owner/repo`).
pub const ENV_REMOTE_REPO: &str = "GITHUB_STORAGE_REPO";

/// Environment variable holding the remote branch name.
pub const ENV_REMOTE_BRANCH: &str = "GITHUB_STORAGE_BRANCH";
