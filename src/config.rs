//! Configuration file handling for mark-scanner.
//!
//! Loads configuration from `<config_dir>/mark-scanner/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::artifact::{default_handle_dir, DEFAULT_FILENAME};
use crate::camera::{CameraSettings, Resolution};
use crate::remote::{GridParams, DEFAULT_BASE_URL, DEFAULT_CROP_PATH, DEFAULT_GRID_PATH};

/// Configuration file structure for mark-scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub artifact: ArtifactConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub grid_path: String,
    pub crop_path: String,
    pub timeout_secs: u64,
    /// Retries after a connection failure; other failures are never retried
    pub connect_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            grid_path: DEFAULT_GRID_PATH.to_string(),
            crop_path: DEFAULT_CROP_PATH.to_string(),
            timeout_secs: 60,
            connect_retries: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index or platform device name
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// How long to wait for the first frame
    pub warmup_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let settings = CameraSettings::default();
        Self {
            device: settings.device,
            width: settings.resolution.width,
            height: settings.resolution.height,
            framerate: settings.framerate,
            warmup_ms: settings.warmup_ms,
        }
    }
}

impl CameraConfig {
    pub fn to_settings(&self) -> CameraSettings {
        CameraSettings {
            device: self.device.clone(),
            resolution: Resolution {
                width: self.width,
                height: self.height,
            },
            framerate: self.framerate,
            warmup_ms: self.warmup_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub rows: u32,
    pub cols: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        let grid = GridParams::default();
        Self {
            rows: grid.rows(),
            cols: grid.cols(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Filename used when no spreadsheet was uploaded
    pub default_filename: String,
    /// Where download handles are written
    pub handle_dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            default_filename: DEFAULT_FILENAME.to_string(),
            handle_dir: default_handle_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// With no explicit path, a missing default file yields the defaults. An
    /// explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound { path });
            }
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        config.grid_params().map_err(|message| ConfigError::Invalid {
            path: path.clone(),
            message,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validated grid dimensions from the `[grid]` section.
    pub fn grid_params(&self) -> Result<GridParams, String> {
        GridParams::new(self.grid.rows, self.grid.cols)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Write this config to `path`, creating parent directories.
    ///
    /// Refuses to overwrite an existing file.
    pub fn write_new(&self, path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let content = self.to_toml().map_err(|e| ConfigError::SerializeError {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    NotFound {
        path: PathBuf,
    },
    AlreadyExists {
        path: PathBuf,
    },
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    SerializeError {
        path: PathBuf,
        source: toml::ser::Error,
    },
    Invalid {
        path: PathBuf,
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "Config file '{}' does not exist", path.display())
            }
            ConfigError::AlreadyExists { path } => {
                write!(f, "Config file '{}' already exists", path.display())
            }
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::SerializeError { path, source } => {
                write!(
                    f,
                    "Failed to serialize config for '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Invalid { path, message } => {
                write!(f, "Invalid config file '{}': {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::SerializeError { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("mark-scanner").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/mark-scanner/config.toml")
        })
}
