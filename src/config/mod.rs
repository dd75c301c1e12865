//! Gateway configuration.
//!
//! Everything the dispatcher needs is passed in explicitly at construction;
//! nothing is resolved from ambient process state. Configuration is stored in
//! RON format.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directory under the app root holding gateway-private state (the default
/// content repository and the checkout cache).
pub const PRIVATE_DIR: &str = ".refgate";

/// Top-level configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    /// Root of the served file hierarchy. Publication symlinks are created
    /// under it and repository path prefixes are resolved against it.
    #[serde(default = "default_app_root")]
    pub app_root: PathBuf,

    /// Default repository served when a request carries no path prefix.
    /// Falls back to `<app_root>/.refgate/content.git`.
    #[serde(default)]
    pub repository: Option<PathBuf>,

    /// Ref used for pass-through requests without an `x-git-ref` header.
    #[serde(default = "default_ref")]
    pub default_ref: String,

    /// git binary used for checkout resolution (`rev-list` / `checkout`).
    #[serde(default = "default_git_binary")]
    pub git_binary: String,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub git: GitLimits,

    #[serde(default = "default_listen")]
    pub listen_addr: String,
}

/// Checkout cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheConfig {
    /// Cache directory; falls back to `<app_root>/.refgate/cache`.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Materialized checkouts kept before LRU eviction kicks in.
    #[serde(default = "default_max_checkouts")]
    pub max_checkouts: usize,
}

/// Limits applied to git subprocess exchanges.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GitLimits {
    /// Per-exchange timeout; a subprocess still running after this is killed.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum concurrent git subprocesses across all requests.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Config {
    /// Absolute-or-relative path of the default repository.
    pub fn repository_dir(&self) -> PathBuf {
        self.repository
            .clone()
            .unwrap_or_else(|| self.app_root.join(PRIVATE_DIR).join("content.git"))
    }

    /// Directory holding one working tree per materialized commit.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| self.app_root.join(PRIVATE_DIR).join("cache"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app_root: default_app_root(),
            repository: None,
            default_ref: default_ref(),
            git_binary: default_git_binary(),
            cache: CacheConfig::default(),
            git: GitLimits::default(),
            listen_addr: default_listen(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            dir: None,
            max_checkouts: default_max_checkouts(),
        }
    }
}

impl Default for GitLimits {
    fn default() -> Self {
        GitLimits {
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_app_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_ref() -> String {
    "master".to_string()
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8418".to_string()
}

fn default_max_checkouts() -> usize {
    64
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_concurrency() -> usize {
    8
}
