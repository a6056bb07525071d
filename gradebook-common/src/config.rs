//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default bind host for the web service
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port for the web service
pub const DEFAULT_PORT: u16 = 5860;

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Folder holding the database and any service-managed files
    pub root_folder: PathBuf,
    pub host: String,
    pub port: u16,
}

/// On-disk TOML configuration file contents (all keys optional)
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    root_folder: Option<String>,
    host: Option<String>,
    port: Option<u16>,
}

impl AppConfig {
    /// Load configuration following the priority order:
    /// 1. Command-line argument / environment variable (resolved by clap)
    /// 2. TOML config file
    /// 3. OS-dependent compiled default (fallback)
    ///
    /// A missing config file is not an error; a malformed one is.
    pub fn load(cli_root: Option<&Path>, cli_port: Option<u16>) -> Result<AppConfig> {
        let file = match config_file_path() {
            Some(path) => read_config_file(&path)?,
            None => ConfigFile::default(),
        };
        Ok(resolve(cli_root, cli_port, file))
    }

    /// Path of the SQLite database inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("gradebook.db")
    }

    /// Create the root folder if it does not exist yet
    pub fn ensure_root_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn resolve(cli_root: Option<&Path>, cli_port: Option<u16>, file: ConfigFile) -> AppConfig {
    let root_folder = match cli_root {
        Some(path) => path.to_path_buf(),
        None => file
            .root_folder
            .map(PathBuf::from)
            .unwrap_or_else(default_root_folder),
    };

    AppConfig {
        root_folder,
        host: file.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: cli_port.or(file.port).unwrap_or(DEFAULT_PORT),
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
}

/// Find the configuration file for the platform, if one exists
fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("gradebook").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/gradebook/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("gradebook"))
        .unwrap_or_else(|| PathBuf::from("./gradebook_data"))
}
