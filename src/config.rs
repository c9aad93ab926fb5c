// src/config.rs
//! Tap configuration
//!
//! Everything here is fixed once a [`MediaKeyTap`](crate::MediaKeyTap) is
//! built. Hosts usually construct it directly; the demo binary also reads it
//! from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::app_types::ApplicationIdentity;
use crate::core::key_event::KeyPressMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// Which key transitions reach the delegate
    pub press_mode: KeyPressMode,
    /// Extra applications treated like the built-in media players
    pub additional_whitelist: Vec<ApplicationIdentity>,
    /// Identity to use instead of the bundle identifier (unbundled executables)
    pub application_id: Option<ApplicationIdentity>,
}

impl TapConfig {
    pub fn with_press_mode(press_mode: KeyPressMode) -> Self {
        Self {
            press_mode,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
