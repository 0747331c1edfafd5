//! Configuration file support
//!
//! Settings come from an optional `logsift.toml`; every field has a default so
//! an empty file (or no file) is valid.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use logsift_pool::CollateOptions;
use logsift_store::FsStore;

/// Default read size for object bodies
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default collector poll interval in milliseconds
const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub processor: ProcessorConfig,
}

/// Where objects are read from
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding `<account>/<container>/<object>` trees
    pub root: PathBuf,

    /// Read size for object bodies, in bytes
    pub chunk_size: usize,

    /// Give up on an object if no chunk arrives for this many seconds
    pub read_timeout_secs: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/logsift"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout_secs: None,
        }
    }
}

impl StoreConfig {
    pub fn build(&self) -> FsStore {
        let store = FsStore::new(&self.root).with_chunk_size(self.chunk_size);
        match self.read_timeout_secs {
            Some(secs) => store.with_read_timeout(Duration::from_secs(secs)),
            None => store,
        }
    }
}

/// How per-object work is fanned out
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    pub worker_count: usize,
    pub poll_interval_ms: u64,
    pub recover_panics: bool,

    /// Name attached to every log event of a processing run
    pub log_route: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            recover_panics: false,
            log_route: "log-processor".to_string(),
        }
    }
}

impl ProcessorConfig {
    pub fn collate_options(&self) -> CollateOptions {
        CollateOptions::new(self.worker_count)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_recover_panics(self.recover_panics)
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse configuration")
    }

    /// Load configuration from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }
}
