//! # Configuration Layer
//!
//! Layered, file-based project configuration.
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Root config | JSON | `<projectRoot>/config/root.json` |
//! | Build configs | JSON | `<projectRoot>/config/<name>.b.json` |
//! | Root locator | empty marker file | `kiln.root` in an ancestor of the CWD |
//!
//! The root config is loaded once per invocation and is immutable. A build
//! config contributes an ordered map of build steps plus a pool of shared
//! resources that steps opt into via the `"kiln_lookup"` marker value.
//!
//! Absence of an optional step value is reported as `None`, never as an
//! error; only missing required sections make a file [`ConfigError::Invalid`].

mod build;
mod project;
mod root;

use std::path::PathBuf;
use thiserror::Error;

pub use build::{
    AppliesTo, BuildConfig, SharedResource, StepContext, TargetType, LOOKUP_MARKER,
};
pub use project::{RunLock, Workspace, WorkspaceError, BUILD_FILE_SUFFIX, ROOT_LOCATOR};
pub use root::{OutputDirectories, ProjectConfig, ROOT_CONFIG_FILE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
