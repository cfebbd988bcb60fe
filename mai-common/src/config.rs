//! Configuration loading and root folder resolution
//!
//! Root folder resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`MAI_ROOT_FOLDER`, then `MAI_ROOT`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed TOML file never terminates a service. [`load_toml`]
//! reports the problem and the caller logs it and carries on with defaults.

use crate::fs::ensure_dir;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Primary root folder environment variable
pub const ENV_ROOT_FOLDER: &str = "MAI_ROOT_FOLDER";

/// Alternative root folder environment variable
pub const ENV_ROOT: &str = "MAI_ROOT";

/// Compiled defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
        }
    }
}

/// `[logging]` section of a TOML config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Optional log file; stdout is used when absent
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Locate the config file for `module_name`
///
/// Search order: `~/.config/mai/<module>.toml`, then `/etc/mai/<module>.toml`
/// (Linux only). Returns `None` when no file exists.
pub fn find_config_file(module_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module_name);

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("mai").join(&file_name)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mai").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_value: None,
        }
    }

    /// Root folder given on the command line
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// `root_folder` value read from the module's TOML file
    pub fn with_toml_value(mut self, toml_value: Option<PathBuf>) -> Self {
        self.toml_value = toml_value;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        // Priority 2: Environment variables
        for var in [ENV_ROOT_FOLDER, ENV_ROOT] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    debug!(module = %self.module_name, var, "Root folder from environment");
                    return PathBuf::from(path);
                }
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml_value {
            debug!(module = %self.module_name, "Root folder from TOML config");
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and exposes the well-known paths beneath it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder if missing
    ///
    /// Failure here is a startup error; services must not continue without it.
    pub fn ensure_directory_exists(&self) -> Result<()> {
        ensure_dir(&self.root_folder)
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// `<root>/queue`
    pub fn queue_dir(&self) -> PathBuf {
        self.root_folder.join("queue")
    }

    /// `<root>/uploads`
    pub fn uploads_dir(&self) -> PathBuf {
        self.root_folder.join("uploads")
    }
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/mai (or /var/lib/mai for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("mai"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/mai"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/mai
        dirs::data_dir()
            .map(|d| d.join("mai"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mai"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\mai
        dirs::data_local_dir()
            .map(|d| d.join("mai"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mai"))
    } else {
        PathBuf::from("./mai_data")
    }
}
