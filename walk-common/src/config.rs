//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a small TOML file. Everything in it is
//! optional: a missing file or a missing field falls back to compiled defaults
//! so the tracker always starts.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "WALK_ROOT_FOLDER";

/// Default HTTP port for the tracker service
pub const DEFAULT_PORT: u16 = 5740;

/// Flickr REST endpoint used when the TOML file does not name one
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.flickr.com/services/rest/";

/// Platform defaults used when neither CLI, environment nor TOML say otherwise
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("walk"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\walk"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("walk"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/walk"))
        } else {
            // ~/.local/share/walk (or /var/lib/walk for system-wide)
            dirs::data_local_dir()
                .map(|d| d.join("walk"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/walk"))
        };

        Self {
            root_folder,
            log_level: "info".to_string(),
            log_file: None,
            port: DEFAULT_PORT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Location filter tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Samples older than this (relative to receipt) are dropped
    pub staleness_secs: u64,
    /// Quiet period a sample must survive before it is considered
    pub quiet_period_ms: u64,
    /// Minimum distance from the last accepted location, in meters
    pub min_displacement_m: f64,
    /// Samples with a coarser horizontal accuracy radius are dropped
    pub max_accuracy_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 10,
            quiet_period_ms: 3000,
            min_displacement_m: 80.0,
            max_accuracy_m: 100.0,
        }
    }
}

/// Photo search service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// REST endpoint of the photo service
    pub endpoint: String,
    /// Search radius around the checkpoint, in kilometers
    pub radius_km: f64,
    /// Sort criterion passed to the service
    pub sort: String,
    /// Image URL fields, tried in order on the first result
    pub size_preference: Vec<String>,
    /// Per-request timeout; `None` keeps the transport default (no timeout)
    pub timeout_secs: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            radius_km: 0.05,
            sort: "interestingness-desc".to_string(),
            size_preference: vec![
                "url_o".to_string(),
                "url_l".to_string(),
                "url_c".to_string(),
                "url_z".to_string(),
                "url_m".to_string(),
            ],
            timeout_secs: None,
        }
    }
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Folder holding the database and downloaded photos
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Flickr API key for photo search
    #[serde(default)]
    pub flickr_api_key: Option<String>,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Path of the TOML file for a module: `<config dir>/walk/<module>.toml`
pub fn config_file_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("walk").join(format!("{}.toml", module_name)))
}

/// Load a TOML config file
///
/// A missing file is not an error: a warning is logged and defaults are
/// returned. A file that exists but does not parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!("Loaded TOML configuration from {}", path.display());
    Ok(config)
}

/// Write a TOML config file atomically (temp file + rename)
///
/// On Unix the file is restricted to the owner because it may hold an API key.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a TOML config file, seeding it with defaults on first run
///
/// An existing file is never rewritten.
pub fn load_or_create_toml_config(path: &Path) -> Result<TomlConfig> {
    if path.exists() {
        return load_toml_config(path);
    }

    let config = TomlConfig::default();
    write_toml_config(&config, path)?;
    info!("Wrote default configuration to {}", path.display());
    Ok(config)
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. `WALK_ROOT_FOLDER` environment variable
/// 3. `root_folder` in the module's TOML file
/// 4. OS-dependent compiled default
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            cli_arg: None,
            config_path: config_file_path(module_name),
        }
    }

    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Read `root_folder` from this file instead of the module default
    pub fn with_config_path(mut self, config_path: Option<PathBuf>) -> Self {
        if config_path.is_some() {
            self.config_path = config_path;
        }
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("Root folder: {} (from command line)", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!("Root folder: {} (from {})", path, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(config_path) = &self.config_path {
            if config_path.exists() {
                match load_toml_config(config_path) {
                    Ok(TomlConfig {
                        root_folder: Some(root),
                        ..
                    }) => {
                        info!("Root folder: {} (from {})", root.display(), config_path.display());
                        return root;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Ignoring unreadable config file: {}", e),
                }
            } else {
                debug!("No config file at {}", config_path.display());
            }
        }

        let root = CompiledDefaults::for_current_platform().root_folder;
        info!("Root folder: {} (compiled default)", root.display());
        root
    }
}

/// Creates the root folder layout on first start
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder and the photo directory (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.photos_path())?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("walk.db")
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Directory holding downloaded photos
    pub fn photos_path(&self) -> PathBuf {
        self.root_folder.join("photos")
    }
}
