//! Configuration - Load Paths and Engine Selection

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engines::EngineRegistry;
use crate::filesystem::FileEnvironment;

pub const DEFAULT_CONFIG_FILE: &str = "assetcat.config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetConfig {
    /// Directories searched for `<name>` requires, in order.
    pub load_paths: Vec<PathBuf>,
    /// Register the built-in engines (`tera`).
    pub builtin_engines: bool,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            load_paths: vec![],
            builtin_engines: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AssetConfig {
    /// Load `assetcat.config.json` from `dir`, falling back to defaults when it
    /// is missing or unreadable.
    pub fn discover(dir: &Path) -> Self {
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        match Self::from_path(&candidate) {
            Ok(config) => config,
            Err(ConfigError::Read { .. }) => Self::default(),
            Err(err) => {
                tracing::warn!("{err}; using defaults");
                Self::default()
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        // Relative load paths are taken from the config file's directory.
        if let Some(base) = path.parent() {
            config.load_paths = config
                .load_paths
                .into_iter()
                .map(|p| if p.is_relative() { base.join(p) } else { p })
                .collect();
        }
        Ok(config)
    }

    pub fn environment(&self) -> FileEnvironment {
        FileEnvironment::new(self.load_paths.clone())
    }

    pub fn engines(&self) -> EngineRegistry {
        if self.builtin_engines {
            EngineRegistry::with_builtins()
        } else {
            EngineRegistry::new()
        }
    }
}
