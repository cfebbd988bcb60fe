//! Configuration resolution for mai-worker
//!
//! Resolves the TOML file, root folder and environment overrides into one
//! explicit [`WorkerConfig`] handed to the worker at construction.
//!
//! **Priority:** CLI → ENV → TOML → compiled default

use crate::pipeline::{OcrEngine, PipelineConfig};
use crate::queue::QueuePaths;
use mai_common::config::{
    find_config_file, load_toml, LoggingConfig, RootFolderInitializer,
    RootFolderResolver,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Module name used for config file lookup (`mai/worker.toml`)
pub const MODULE_NAME: &str = "worker";

/// Overrides `[pipeline] ocr_engine`
pub const ENV_OCR_ENGINE: &str = "MAI_OCR_ENGINE";

/// Overrides `[pipeline] candidates_file`
pub const ENV_CANDIDATES_FILE: &str = "MAI_CANDIDATES_FILE";

/// `[worker]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Sleep after a cycle that processed a job
    pub busy_interval_ms: u64,
    /// Sleep after an idle cycle or a queue error
    pub idle_interval_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            busy_interval_ms: 500,
            idle_interval_ms: 1000,
        }
    }
}

/// Contents of `worker.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerToml {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub worker: LoopConfig,
    pub pipeline: PipelineConfig,
}

impl WorkerToml {
    /// Load from `explicit`, else from the standard config locations
    ///
    /// No file at all yields defaults. A file that cannot be read or parsed is
    /// returned as an error so the caller can report it once logging is up and
    /// continue with defaults.
    pub fn load(explicit: Option<&Path>) -> mai_common::Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| find_config_file(MODULE_NAME));
        match path {
            Some(path) => load_toml(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Resolved worker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub root_folder: PathBuf,
    pub queue: QueuePaths,
    pub uploads_dir: PathBuf,
    pub busy_interval: Duration,
    pub idle_interval: Duration,
    pub pipeline: PipelineConfig,
}

impl WorkerConfig {
    /// Standard layout under `root_folder` with default intervals and pipeline
    pub fn for_root(root_folder: impl Into<PathBuf>) -> Self {
        let initializer = RootFolderInitializer::new(root_folder.into());
        let loop_config = LoopConfig::default();
        Self {
            queue: QueuePaths::under(&initializer.queue_dir()),
            uploads_dir: initializer.uploads_dir(),
            root_folder: initializer.root_folder().to_path_buf(),
            busy_interval: Duration::from_millis(loop_config.busy_interval_ms),
            idle_interval: Duration::from_millis(loop_config.idle_interval_ms),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Resolve from CLI root folder, environment and TOML
    pub fn resolve(cli_root_folder: Option<PathBuf>, toml: &WorkerToml) -> Self {
        let root_folder = RootFolderResolver::new(MODULE_NAME)
            .with_cli_arg(cli_root_folder)
            .with_toml_value(toml.root_folder.clone())
            .resolve();

        let mut config = Self::for_root(root_folder);
        config.busy_interval = Duration::from_millis(toml.worker.busy_interval_ms);
        config.idle_interval = Duration::from_millis(toml.worker.idle_interval_ms);
        config.pipeline = toml.pipeline.clone();
        apply_env_overrides(&mut config.pipeline);

        info!(
            root_folder = %config.root_folder.display(),
            ocr_engine = ?config.pipeline.ocr_engine,
            "Worker configuration resolved"
        );
        config
    }

    /// Create the root folder
    pub fn ensure_root_folder(&self) -> mai_common::Result<()> {
        RootFolderInitializer::new(self.root_folder.clone()).ensure_directory_exists()
    }
}

fn apply_env_overrides(pipeline: &mut PipelineConfig) {
    if let Ok(value) = std::env::var(ENV_OCR_ENGINE) {
        match value.parse::<OcrEngine>() {
            Ok(engine) => {
                info!(engine = ?engine, "OCR engine from environment");
                pipeline.ocr_engine = engine;
            }
            Err(e) => warn!(var = ENV_OCR_ENGINE, "{} (keeping {:?})", e, pipeline.ocr_engine),
        }
    }

    if let Ok(value) = std::env::var(ENV_CANDIDATES_FILE) {
        if !value.trim().is_empty() {
            info!(path = %value, "Candidate directory from environment");
            pipeline.candidates_file = Some(PathBuf::from(value));
        }
    }
}
