//! Runtime settings
//!
//! Store, fetch and executor tunables in one place. Loaded from TOML,
//! falls back to defaults when no file is given.

use lodharvest_core::{Error, Result};
use lodharvest_fetch::{default_accept, FetcherConfig, RetryPolicy};
use lodharvest_store::{UnionGraph, DEFAULT_BASE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarvestSettings {
    pub store: StoreSettings,
    pub fetch: FetchSettings,
    pub executor: ExecutorSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    /// Base of every partition URI.
    pub base: String,
    /// Remote query endpoint. Empty selects the in-memory store.
    pub read_endpoint: String,
    /// Remote update endpoint. Empty makes the remote store read-only.
    pub write_endpoint: String,
    /// N-Quads file that persists the in-memory store between runs.
    pub state_file: String,
    /// How the remote endpoint exposes the union of all partitions.
    pub union_graph: UnionGraph,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE.to_string(),
            read_endpoint: String::new(),
            write_endpoint: String::new(),
            state_file: String::new(),
            union_graph: UnionGraph::default(),
        }
    }
}

impl StoreSettings {
    pub fn is_remote(&self) -> bool {
        !self.read_endpoint.trim().is_empty()
    }

    pub fn state_path(&self) -> Option<PathBuf> {
        let s = self.state_file.trim();
        (!s.is_empty()).then(|| PathBuf::from(s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchSettings {
    pub retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Media types to ask for, best first.
    pub accept: Vec<String>,
    pub follow_companions: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            retries: 8,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            timeout_secs: 30,
            user_agent: format!("lodharvest/{}", env!("CARGO_PKG_VERSION")),
            accept: default_accept(),
            follow_companions: true,
        }
    }
}

impl FetchSettings {
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            retry: RetryPolicy::exponential(
                self.retries,
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_max_ms),
            ),
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
            follow_companions: self.follow_companions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Assertions driven at once within a task.
    pub concurrency: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl HarvestSettings {
    /// Missing file gives defaults; a file that does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let settings = toml::from_str(&content)
                    .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
                tracing::info!("Loaded settings from {}", path.display());
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No settings at {} - using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(format!("serializing settings: {e}")))
    }
}
