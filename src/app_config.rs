//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file. Unlike the
//! cache itself, the binary never writes one; a missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vfs_dircache::config::CacheConfig;

fn default_case_sensitive() -> bool {
    !cfg!(any(target_os = "macos", target_os = "windows"))
}

/// Application configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    /// Whether names on the browsed file system are case sensitive. Defaults
    /// to the platform convention.
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,

    /// Directory to browse when `--root` is not given. Falls back to the
    /// current directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            case_sensitive: default_case_sensitive(),
            root: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing a list of validation error messages otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.cache.batch_merge_threshold == 0 {
            errors.push("cache.batch-merge-threshold must be at least 1.".to_owned());
        }

        if let Some(root) = &self.root
            && !root.is_dir()
        {
            errors.push(format!(
                "Root '{}' is not an existing directory.",
                root.display()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("vfs-dircache").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("vfs-dircache").join("config.toml"));
        }

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads config from the external path if given, else from the first found
    /// config file, else defaults. Errors if a config file exists but is
    /// malformed or invalid.
    pub fn load_or_default(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let found = match external_config_path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        };
        let Some(path) = found else {
            debug!("No configuration file found, using defaults.");
            return Ok(Self::default());
        };

        let config = Self::load_from_file(&path)?;
        config.validate().map_err(ConfigError::ValidationErrors)?;
        debug!("Loaded configuration successfully.");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache.batch_merge_threshold, 3);
    }

    #[test]
    fn kebab_case_keys_are_read() {
        let config = Config::from_toml(
            "case-sensitive = false\n\n[cache]\ncheck-consistency = true\nbatch-merge-threshold = 8\n",
        )
        .unwrap();
        assert!(!config.case_sensitive);
        assert!(config.cache.check_consistency);
        assert_eq!(config.cache.batch_merge_threshold, 8);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let mut config = Config::default();
        config.cache.batch_merge_threshold = 0;
        assert_eq!(config.validate().unwrap_err().len(), 1);
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\nmark-new-files-dirty = true\n").unwrap();
        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.cache.mark_new_files_dirty, Some(true));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "case-sensitive = \"maybe\"").unwrap();
        assert!(matches!(
            Config::load_or_default(Some(&path)),
            Err(ConfigError::DeserializationError(_))
        ));
    }
}
