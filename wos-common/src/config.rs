//! Service configuration loading and root folder resolution
//!
//! Configuration is built once at process start and handed to every component
//! constructor. Resolution order for the config file:
//! 1. Command-line argument (highest priority)
//! 2. `WOS_CONFIG` environment variable
//! 3. `~/.config/wos/config.toml`, then `/etc/wos/config.toml`
//! 4. Compiled defaults rooted at the resolved root folder (fallback)
//!
//! A missing config file is not fatal: a warning is logged and defaults are
//! used. A config file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "WOS_CONFIG";

/// Environment variable overriding the data root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "WOS_ROOT_FOLDER";

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    pub content_store: ContentStoreConfig,
    pub blob_mirror: BlobMirrorConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path prefix for all object routes (`/v1/...`)
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Maximum accepted request body (archives, batch files)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
}

/// Staging settings for uploaded media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Root under which staging directories are created
    pub upload_temp_path: PathBuf,
    /// Relative path of the index document inside every object tree
    #[serde(default = "default_index_filename")]
    pub index_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentStoreConfig {
    /// Root directory of the local content-addressed store
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMirrorConfig {
    /// Object store URL (`file:///...` or `s3://bucket/prefix`)
    pub url: String,
    /// Public URL prefix used to resolve cover image references
    #[serde(default)]
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Longest edge of generated thumbnails, in pixels
    #[serde(default = "default_thumbnail_max_edge")]
    pub max_edge: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline applied to every pipeline step
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_max_body_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_index_filename() -> String {
    "index.json".to_string()
}

fn default_thumbnail_max_edge() -> u32 {
    256
}

fn default_store_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_version: default_api_version(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_edge: default_thumbnail_max_edge(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServiceConfig {
    /// Defaults with every path placed under `root`
    pub fn with_root(root: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                path: root.join("wos.db"),
            },
            media: MediaConfig {
                upload_temp_path: root.join("tmp"),
                index_filename: default_index_filename(),
            },
            content_store: ContentStoreConfig {
                path: root.join("content"),
            },
            blob_mirror: BlobMirrorConfig {
                url: format!("file://{}", root.join("blobs").display()),
                public_base_url: None,
            },
            thumbnails: ThumbnailConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve configuration following the documented priority order
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_path {
            return Self::load(path);
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        // Priority 3: Well-known config file locations
        if let Some(path) = default_config_file() {
            return Self::load(&path);
        }

        // Priority 4: Compiled defaults
        let root = resolve_root_folder(None);
        warn!(
            "No configuration file found, using defaults rooted at {}",
            root.display()
        );
        Ok(Self::with_root(&root))
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.media.index_filename.trim().is_empty() {
            return Err(Error::Config("media.index_filename must not be empty".to_string()));
        }
        if Path::new(&self.media.index_filename).is_absolute()
            || self.media.index_filename.split('/').any(|part| part == "..")
        {
            return Err(Error::Config(format!(
                "media.index_filename must be a relative path inside the object tree: {}",
                self.media.index_filename
            )));
        }
        if self.pipeline.store_timeout_secs == 0 {
            return Err(Error::Config("pipeline.store_timeout_secs must be > 0".to_string()));
        }
        if self.server.max_body_bytes == 0 {
            return Err(Error::Config("server.max_body_bytes must be > 0".to_string()));
        }
        if !(self.blob_mirror.url.starts_with("file://") || self.blob_mirror.url.starts_with("s3://")) {
            return Err(Error::Config(format!(
                "blob_mirror.url must be a file:// or s3:// URL: {}",
                self.blob_mirror.url
            )));
        }
        Ok(())
    }

    /// Deadline for a single pipeline step
    pub fn store_deadline(&self) -> Duration {
        Duration::from_secs(self.pipeline.store_timeout_secs)
    }

    /// Directories that must exist before the service starts
    pub fn required_directories(&self) -> Vec<PathBuf> {
        let mut dirs = vec![
            self.media.upload_temp_path.clone(),
            self.content_store.path.clone(),
        ];
        if let Some(parent) = self.database.path.parent() {
            dirs.push(parent.to_path_buf());
        }
        if let Some(local) = self.blob_mirror.url.strip_prefix("file://") {
            dirs.push(PathBuf::from(local));
        }
        dirs
    }
}

/// Root folder resolution: explicit argument, then `WOS_ROOT_FOLDER`, then
/// the OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        return PathBuf::from(path);
    }

    get_default_root_folder()
}

/// First existing config file in the well-known locations
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("wos").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/wos/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("wos"))
        .unwrap_or_else(|| PathBuf::from("./wos_data"))
}
