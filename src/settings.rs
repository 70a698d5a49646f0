use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::compute::InstanceSpec;

pub const DEFAULT_SETTINGS_PATH: &str = "config/worker.toml";

/// Everything the solve pipeline needs to lay out scratch files and build
/// tool invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveContext {
    pub scratch_root: PathBuf,
    pub preprocess_script: PathBuf,
    pub postprocess_script: PathBuf,
    pub res_script: PathBuf,
    pub dry_run_delay: Duration,
}

impl Default for SolveContext {
    fn default() -> Self {
        Self {
            scratch_root: PathBuf::from("/tmp/gridsolve"),
            preprocess_script: PathBuf::from("scripts/preprocess_data.py"),
            postprocess_script: PathBuf::from("scripts/process_results.py"),
            res_script: PathBuf::from("scripts/generate_res.py"),
            dry_run_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read worker settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse worker settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
}

/// Optional TOML settings file for the worker binary. Every field is
/// optional; unset fields fall back to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkerSettings {
    pub scratch_root: Option<PathBuf>,
    pub blob_root: Option<PathBuf>,
    pub preprocess_script: Option<PathBuf>,
    pub postprocess_script: Option<PathBuf>,
    pub res_script: Option<PathBuf>,
    pub dry_run_delay_secs: Option<u64>,
    pub instance_type: Option<String>,
}

impl WorkerSettings {
    /// Load from `explicit_path`, or from [`DEFAULT_SETTINGS_PATH`] when no
    /// path is given. A missing file yields the defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path.as_path()).map_err(|error| SettingsError::ReadFile {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        toml::from_str(raw.as_str()).map_err(|error| SettingsError::ParseToml {
            path: path.display().to_string(),
            message: error.to_string(),
        })
    }

    pub fn solve_context(&self) -> SolveContext {
        let defaults = SolveContext::default();
        SolveContext {
            scratch_root: self.scratch_root.clone().unwrap_or(defaults.scratch_root),
            preprocess_script: self
                .preprocess_script
                .clone()
                .unwrap_or(defaults.preprocess_script),
            postprocess_script: self
                .postprocess_script
                .clone()
                .unwrap_or(defaults.postprocess_script),
            res_script: self.res_script.clone().unwrap_or(defaults.res_script),
            dry_run_delay: self
                .dry_run_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.dry_run_delay),
        }
    }

    pub fn blob_root(&self) -> PathBuf {
        self.blob_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("var/blobs"))
    }

    pub fn instance_spec(&self) -> InstanceSpec {
        self.instance_type
            .clone()
            .map(|instance_type| InstanceSpec { instance_type })
            .unwrap_or_default()
    }
}
