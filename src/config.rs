//! Configuration structures for tensor bucketing

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::level_filters::LevelFilter;

use crate::error::{Error, Result};

/// Default bucket size: 25 MiB
pub const DEFAULT_BUCKET_SIZE_BYTES: usize = 25 * 1024 * 1024;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Chunking settings
    #[serde(default)]
    pub bucket: BucketConfig,
    /// System-wide settings
    #[serde(default)]
    pub system: SystemConfig,
}

impl Config {
    /// Load configuration from a JSON or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bucket.size_limit_bytes == 0 {
            return Err(Error::config("Bucket size limit must be > 0"));
        }

        if self.system.num_threads == 0 {
            return Err(Error::config("Number of threads must be > 0"));
        }

        if self.system.log_level.parse::<LevelFilter>().is_err() {
            return Err(Error::config(format!(
                "Unknown log level '{}'",
                self.system.log_level
            )));
        }

        Ok(())
    }
}

/// Chunking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Maximum cumulative bytes per chunk
    pub size_limit_bytes: usize,
    /// Process chunks on the rayon pool
    pub parallel: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            size_limit_bytes: DEFAULT_BUCKET_SIZE_BYTES,
            parallel: false,
        }
    }
}

/// System-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Number of worker threads
    pub num_threads: usize,
    /// Base log level for the command-line front end
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            log_level: crate::logging::DEFAULT_LEVEL.to_string(),
        }
    }
}
