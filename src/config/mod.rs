//! Configuration module for gstpl-rs
//!
//! A small TOML file controls the ambient behaviour of the bridge: the log
//! filter used by the command line tool, the run loop thread name, and the
//! defaults of the reference engine.
//!
//! # Location
//!
//! [`BridgeConfig::load_or_default`] reads `config.toml` from the
//! platform-appropriate config directory under `gstpl-rs`:
//!
//! - **Linux**: `~/.config/gstpl-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/gstpl-rs/config.toml`
//! - **Windows**: `%APPDATA%\gstpl-rs\config.toml`
//!
//! # Example
//!
//! ```toml
//! log_filter = "info,gstpl_rs=trace"
//! run_loop_thread_name = "media-bus"
//!
//! [sim]
//! default_width = 640
//! default_height = 480
//! ```

pub mod settings;

pub use settings::*;

use crate::context::DEFAULT_RUN_LOOP_THREAD_NAME;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "gstpl-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default tracing filter for the command line tool
pub const DEFAULT_LOG_FILTER: &str = "info,gstpl_rs=debug";

/// Get the path to the default config file
pub fn config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// `tracing` env-filter directive used when `RUST_LOG` is unset
    pub log_filter: String,

    /// Name given to the shared run loop thread
    pub run_loop_thread_name: String,

    /// Reference engine defaults
    pub sim: SimConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            run_loop_thread_name: DEFAULT_RUN_LOOP_THREAD_NAME.to_string(),
            sim: SimConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        match config_path() {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring config at {:?}: {}", path, e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Save the config as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Apply process-wide settings (the run loop thread name)
    pub fn apply(&self) {
        crate::context::set_thread_name(self.run_loop_thread_name.clone());
    }
}
