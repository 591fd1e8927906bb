// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Configuration file types and parsing for the relay pipeline.
//!
//! JSON5 configuration format supporting:
//! - Queue capacities for the shared and per-listener workers
//! - Shutdown style, timestamp prefix kind, stack-trace mask
//! - Per-source level masks (comments and trailing commas welcome)

use crate::context::TimestampKind;
use crate::severity::LevelMask;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// How `shutdown_configured` tears the pipeline down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShutdownStyle {
    /// Abandon queued work and exit promptly
    Instant,
    /// Drain every queue before exiting
    #[default]
    Await,
}

impl ShutdownStyle {
    pub fn is_immediate(self) -> bool {
        self == ShutdownStyle::Instant
    }
}

/// Startup configuration (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// Capacity of each per-listener queue (rounded up to a power of two)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: u32,

    /// Capacity of the shared first-stage queue
    #[serde(default = "default_main_queue_capacity")]
    pub main_queue_capacity: u32,

    /// Shutdown style used by `shutdown_configured`
    #[serde(default)]
    pub shutdown: ShutdownStyle,

    /// Prefix format for timestamped listeners
    #[serde(default)]
    pub timestamp: TimestampKind,

    /// Severities that get an eager stack-trace capture
    #[serde(default = "LevelMask::none")]
    pub traceable: LevelMask,

    /// Mask for sources without an explicit entry
    #[serde(default)]
    pub default_mask: LevelMask,

    /// Per-source level masks
    #[serde(default)]
    pub sources: HashMap<String, LevelMask>,

    /// Source identity of the early bootstrap logger, exempt from
    /// stack-trace capture (its frames predate the host being ready)
    #[serde(default = "default_bootstrap_source")]
    pub bootstrap_source: String,
}

fn default_queue_capacity() -> u32 {
    256
}

fn default_main_queue_capacity() -> u32 {
    1024
}

fn default_bootstrap_source() -> String {
    "bootstrap".to_string()
}

impl LevelMask {
    /// serde default helper
    pub(crate) fn none() -> LevelMask {
        LevelMask::NONE
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            main_queue_capacity: default_main_queue_capacity(),
            shutdown: ShutdownStyle::default(),
            timestamp: TimestampKind::default(),
            traceable: LevelMask::NONE,
            default_mask: LevelMask::ALL,
            sources: HashMap::new(),
            bootstrap_source: default_bootstrap_source(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig =
            json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON5 string (with pretty formatting)
    pub fn to_json5(&self) -> String {
        // json5 crate doesn't have pretty printing, so we use serde_json for
        // output and rely on json5 for input (which handles comments and
        // trailing commas)
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5();
        std::fs::write(path, content)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                field: "queue_capacity",
            });
        }
        if self.main_queue_capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                field: "main_queue_capacity",
            });
        }
        for source in self.sources.keys() {
            if source.is_empty() {
                return Err(ConfigError::EmptySourceName);
            }
        }
        if self.bootstrap_source.is_empty() {
            return Err(ConfigError::EmptySourceName);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(std::path::PathBuf, String),
    ParseError(String),
    InvalidCapacity { field: &'static str },
    EmptySourceName,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, msg) => {
                write!(
                    f,
                    "failed to access config file '{}': {}",
                    path.display(),
                    msg
                )
            }
            ConfigError::ParseError(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::InvalidCapacity { field } => {
                write!(f, "{} must be non-zero", field)
            }
            ConfigError::EmptySourceName => write!(f, "source names cannot be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}
