//! Root project configuration (`root.json`)
//!
//! Declares where build outputs go, which platform is being targeted and
//! which toolchain drives compilation. Loaded once per invocation.

use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::ConfigError;

/// Filename of the root configuration
pub const ROOT_CONFIG_FILE: &str = "root.json";

/// Filename of the append-only log file, placed in the log output dir
pub const LOG_FILE_NAME: &str = "kiln.log";

const REQUIRED_SECTIONS: [&str; 3] = ["outputDirectories", "platform", "toolchain"];

/// Output directory paths, each relative to the project root
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDirectories {
    pub target: PathBuf,
    pub object: PathBuf,
    pub debug_symbols: PathBuf,
    pub log: PathBuf,
}

/// Root-level project settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    output_directories: OutputDirectories,
    platform: String,
    toolchain: String,
}

impl ProjectConfig {
    /// Loads and validates `root.json` from the configuration directory
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(ROOT_CONFIG_FILE);
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }

        let content = fs::read_to_string(&path)?;
        let raw: Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        check_required_sections(&raw)?;

        serde_json::from_value(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn toolchain(&self) -> &str {
        &self.toolchain
    }

    pub fn output_directories(&self) -> &OutputDirectories {
        &self.output_directories
    }

    /// Target binary output dir, rooted at the project root
    pub fn target_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.output_directories.target)
    }

    /// Intermediate object output dir, rooted at the project root
    pub fn object_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.output_directories.object)
    }

    /// Debug symbol output dir, rooted at the project root
    pub fn debug_symbols_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.output_directories.debug_symbols)
    }

    /// Log output dir, rooted at the project root
    pub fn log_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.output_directories.log)
    }

    /// Full path of the append-only log file
    pub fn log_path(&self, project_root: &Path) -> PathBuf {
        self.log_dir(project_root).join(LOG_FILE_NAME)
    }
}

/// Rejects a root config missing any of the three required sections
fn check_required_sections(raw: &Value) -> Result<(), ConfigError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ConfigError::Invalid("root config must be a JSON object".to_string()))?;

    for section in REQUIRED_SECTIONS {
        if !object.contains_key(section) {
            return Err(ConfigError::Invalid(format!(
                "missing required section '{section}'"
            )));
        }
    }
    Ok(())
}
