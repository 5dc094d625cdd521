//! Adapter configuration
//!
//! Settings are resolved in layers: built-in defaults, then the optional JSON
//! config file (`<config dir>/dropboxfs/config.json`), then environment
//! variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Default metadata cache TTL: 5 minutes
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default spool size before writes spill to disk: 5 MiB
pub const DEFAULT_MAX_BUFFER: usize = 5 * 1024 * 1024;

/// Default retry budget for idempotent remote reads
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Longest accepted metadata cache TTL: one year
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_CACHE_TTL: &str = "DROPBOX_CACHE_TTL";
const ENV_MAX_BUFFER: &str = "DROPBOX_MAX_BUFFER";
const ENV_MAX_RETRIES: &str = "DROPBOX_MAX_RETRIES";

/// Configuration for a `DropboxFs` instance and its client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsConfig {
    /// Metadata cache TTL; zero disables caching entirely
    pub cache_ttl: Duration,
    /// Bytes held in memory by a writer before spilling to a temp file
    pub max_buffer: usize,
    /// Retries for retryable errors on metadata, listing and download calls
    pub max_retries: u32,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

/// On-disk representation; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    cache_ttl_secs: Option<u64>,
    max_buffer: Option<usize>,
    max_retries: Option<u32>,
    request_timeout_secs: Option<u64>,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            max_buffer: DEFAULT_MAX_BUFFER,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl FsConfig {
    /// Set the cache TTL (zero disables caching)
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Whether metadata caching is enabled
    pub fn caching_enabled(&self) -> bool {
        !self.cache_ttl.is_zero()
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dropboxfs").join("config.json"))
    }

    /// Load a JSON config file on top of the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let file: ConfigFile = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        debug!(path = %path.display(), "Loaded config file");
        Self::default()
            .merge(file)
            .with_context(|| format!("Invalid config file: {:?}", path))
    }

    /// Resolve the effective configuration: defaults, config file (if present), environment
    pub fn resolve() -> Result<Self> {
        let base = match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::default(),
        };
        base.apply_env(|key| env::var(key).ok())
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ttl) = lookup(ENV_CACHE_TTL) {
            let secs: u64 = ttl
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_CACHE_TTL, ttl))?;
            self.cache_ttl =
                cache_ttl(secs).with_context(|| format!("Invalid {}", ENV_CACHE_TTL))?;
        }
        if let Some(buffer) = lookup(ENV_MAX_BUFFER) {
            self.max_buffer = buffer
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_MAX_BUFFER, buffer))?;
        }
        if let Some(retries) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = retries
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_MAX_RETRIES, retries))?;
        }
        Ok(self)
    }

    fn merge(mut self, file: ConfigFile) -> Result<Self> {
        if let Some(secs) = file.cache_ttl_secs {
            self.cache_ttl = cache_ttl(secs).context("Invalid cache_ttl_secs")?;
        }
        if let Some(max_buffer) = file.max_buffer {
            self.max_buffer = max_buffer;
        }
        if let Some(max_retries) = file.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(secs) = file.request_timeout_secs {
            if secs == 0 {
                bail!("request_timeout_secs must be greater than zero");
            }
            self.request_timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }
}

fn cache_ttl(secs: u64) -> Result<Duration> {
    let ttl = Duration::from_secs(secs);
    if ttl > MAX_CACHE_TTL {
        bail!(
            "cache TTL of {}s exceeds the maximum of {}s",
            secs,
            MAX_CACHE_TTL.as_secs()
        );
    }
    Ok(ttl)
}
