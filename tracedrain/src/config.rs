//! Trace offload configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file at all) yields a usable configuration.
//!
//! ```toml
//! platform = "edge"
//! buffer_size = "64M"
//! periodic_offload = true
//! buffer_offload_interval_us = 100
//! file_dump_interval_s = 5
//! metric_set = "functions"
//! output_dir = "trace-out"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracedrain_common::{DEFAULT_FILE_DUMP_INTERVAL_S, DEFAULT_OFFLOAD_INTERVAL_US};

use crate::domain::{ByteSize, ConfigError};

/// Which platform capability variant to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// PCIe-attached accelerator driven from an x86 host
    #[default]
    Host,
    /// Embedded SoC where trace buffers come out of processing-system memory
    Edge,
}

/// Trace offload settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceConfig {
    #[serde(default)]
    pub platform: PlatformKind,

    /// Requested total trace buffer size (`8M`, `512K`, `1G`, ...)
    #[serde(default = "TraceConfig::default_buffer_size")]
    pub buffer_size: String,

    /// Drain direct-streaming devices continuously from a background thread
    #[serde(default = "TraceConfig::default_periodic_offload")]
    pub periodic_offload: bool,

    /// Delay between background drains
    #[serde(default = "TraceConfig::default_offload_interval_us")]
    pub buffer_offload_interval_us: u64,

    /// Delay between periodic flushes of trace files to disk
    #[serde(default = "TraceConfig::default_file_dump_interval_s")]
    pub file_dump_interval_s: u64,

    /// Runtime-configured metric set; `None` means metrics were fixed at
    /// compile time and no runtime config file is written
    #[serde(default)]
    pub metric_set: Option<String>,

    /// Directory receiving trace files
    #[serde(default = "TraceConfig::default_output_dir")]
    pub output_dir: PathBuf,
}

impl TraceConfig {
    fn default_buffer_size() -> String {
        "8M".to_string()
    }

    fn default_periodic_offload() -> bool {
        true
    }

    fn default_offload_interval_us() -> u64 {
        DEFAULT_OFFLOAD_INTERVAL_US
    }

    fn default_file_dump_interval_s() -> u64 {
        DEFAULT_FILE_DUMP_INTERVAL_S
    }

    fn default_output_dir() -> PathBuf {
        PathBuf::from(".")
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML is malformed, has unknown keys, or the
    /// buffer size does not parse.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: TraceConfig = toml::from_str(contents)?;
        // Validate eagerly so a bad size fails at load rather than at activation
        config.requested_buffer_size()?;
        Ok(config)
    }

    /// The configured buffer size, before any clamping
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidSize`] if `buffer_size` does not parse.
    pub fn requested_buffer_size(&self) -> Result<ByteSize, ConfigError> {
        ByteSize::parse(&self.buffer_size)
    }

    #[must_use]
    pub fn offload_interval(&self) -> Duration {
        Duration::from_micros(self.buffer_offload_interval_us)
    }

    #[must_use]
    pub fn file_dump_interval(&self) -> Duration {
        Duration::from_secs(self.file_dump_interval_s)
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            platform: PlatformKind::default(),
            buffer_size: Self::default_buffer_size(),
            periodic_offload: Self::default_periodic_offload(),
            buffer_offload_interval_us: Self::default_offload_interval_us(),
            file_dump_interval_s: Self::default_file_dump_interval_s(),
            metric_set: None,
            output_dir: Self::default_output_dir(),
        }
    }
}
