//! Dataset subsystem configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zkit_nv::{ByteOrder, NvConfig};

use crate::command::COMMAND_VERSION;
use crate::error::{ZfsError, ZfsResult};

/// Settings for the dataset subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZfsConfig {
    /// Byte order of encoded commands. Must match the kernel ABI.
    pub byte_order: ByteOrder,
    /// Version field sent with every command.
    pub command_version: u64,
    /// Deadline applied to each operation when the caller supplies none.
    pub default_timeout_ms: Option<u64>,
}

impl Default for ZfsConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Native,
            command_version: COMMAND_VERSION,
            default_timeout_ms: None,
        }
    }
}

impl ZfsConfig {
    /// Loads and validates a config from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> ZfsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ZfsConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| ZfsError::Config {
                reason: e.to_string(),
            })?,
            "json" => serde_json::from_str(&contents).map_err(|e| ZfsError::Config {
                reason: e.to_string(),
            })?,
            _ => {
                return Err(ZfsError::Config {
                    reason: format!("Unsupported config file extension: {}", ext),
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the command version and timeout.
    pub fn validate(&self) -> ZfsResult<()> {
        if self.command_version != COMMAND_VERSION {
            return Err(ZfsError::Config {
                reason: format!(
                    "unsupported command version {} (supported: {})",
                    self.command_version, COMMAND_VERSION
                ),
            });
        }
        if self.default_timeout_ms == Some(0) {
            return Err(ZfsError::Config {
                reason: "default_timeout_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Codec settings for command lists.
    pub fn nv_config(&self) -> NvConfig {
        NvConfig::with_byte_order(self.byte_order)
    }

    /// Per-operation timeout, if one is configured.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}
