//! Configuration File Loading
//!
//! Finds, parses and saves engine configuration files. TOML and JSON are
//! both accepted; the format follows the file extension.

use super::EngineConfig;
use crate::error::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MOSAICTERM_SESSION_CONFIG";

/// Directory name under the user's config dir
const APP_DIR: &str = "mosaicterm-session";

/// Configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Format implied by a path's extension; TOML when unknown
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Configuration file loader
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Candidate files, in priority order
    search_paths: Vec<PathBuf>,
    /// File the last successful load came from
    current_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader with the default search paths
    pub fn new() -> Self {
        Self {
            search_paths: Self::default_search_paths(),
            current_path: None,
        }
    }

    /// Load the first readable config from the search paths, or defaults
    pub fn load(&mut self) -> Result<EngineConfig> {
        for path in self.search_paths.clone() {
            if !path.is_file() {
                continue;
            }
            match Self::load_from_path(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    self.current_path = Some(path);
                    return Ok(config);
                }
                Err(e) => {
                    // Keep searching
                    warn!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }

        debug!("No configuration file found, using defaults");
        let config = EngineConfig::default();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate one specific file
    pub fn load_from_path(path: &Path) -> Result<EngineConfig> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = Self::parse(&content, ConfigFormat::from_path(path))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config text in the given format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<EngineConfig> {
        let parse_failed = |reason: String| Error::ConfigParseFailed {
            format: format.name().to_string(),
            reason,
        };
        match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_failed(e.to_string())),
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| parse_failed(e.to_string()))
            }
        }
    }

    /// Save configuration to a specific path, format by extension
    pub fn save_to_path(config: &EngineConfig, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let format = ConfigFormat::from_path(path);
        let serialization_failed = |reason: String| Error::ConfigSerializationFailed {
            format: format.name().to_string(),
            reason,
        };
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(config)
                .map_err(|e| serialization_failed(e.to_string()))?,
            ConfigFormat::Toml => toml::to_string_pretty(config)
                .map_err(|e| serialization_failed(e.to_string()))?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Default search paths
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(explicit) = env::var(CONFIG_ENV_VAR) {
            if !explicit.is_empty() {
                paths.push(PathBuf::from(explicit));
            }
        }

        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join(format!("{}.toml", APP_DIR)));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let dir = config_dir.join(APP_DIR);
            paths.push(dir.join("config.toml"));
            paths.push(dir.join("config.json"));
        }

        paths
    }

    /// Default location for a saved config
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// File the last successful load came from
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    /// Clear all search paths and add a single path
    pub fn set_search_path(&mut self, path: PathBuf) {
        self.search_paths = vec![path];
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
