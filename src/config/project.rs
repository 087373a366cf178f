//! Workspace discovery
//!
//! A kiln project is marked by a zero-content locator file named
//! `kiln.root`. Discovery walks ancestor directories from the starting
//! point until the marker is found; the configuration directory lives at
//! `<projectRoot>/config`.

use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marker file identifying the project root
pub const ROOT_LOCATOR: &str = "kiln.root";

/// Directory under the project root holding all configuration files
pub const CONFIG_DIR_NAME: &str = "config";

/// Filename suffix of build configuration files
pub const BUILD_FILE_SUFFIX: &str = ".b.json";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Could not find '{ROOT_LOCATOR}' in the current directory or any ancestor")]
    RootLocatorNotFound,

    #[error("Could not find the configuration directory '{0}'")]
    ConfigDirNotFound(PathBuf),

    #[error("Another build is already running against this project")]
    AlreadyLocked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A discovered kiln project
#[derive(Debug, Clone)]
pub struct Workspace {
    project_root: PathBuf,
    config_dir: PathBuf,
}

impl Workspace {
    /// Discovers the workspace containing the current directory
    pub fn discover() -> Result<Self, WorkspaceError> {
        let cwd = std::env::current_dir()?;
        Self::discover_from(&cwd)
    }

    /// Discovers the workspace containing `start`
    ///
    /// Walks ancestors of `start` looking for the root locator file.
    pub fn discover_from(start: &Path) -> Result<Self, WorkspaceError> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(ROOT_LOCATOR).is_file() {
                let config_dir = current.join(CONFIG_DIR_NAME);
                if !config_dir.is_dir() {
                    return Err(WorkspaceError::ConfigDirNotFound(config_dir));
                }
                return Ok(Self {
                    project_root: current,
                    config_dir,
                });
            }

            if !current.pop() {
                return Err(WorkspaceError::RootLocatorNotFound);
            }
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Enumerates the names of available build configurations
    ///
    /// A build config is any `<name>.b.json` file in the config directory.
    pub fn available_builds(&self) -> Result<Vec<String>, WorkspaceError> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.config_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let file_name = match file_name.to_str() {
                Some(name) => name,
                None => continue,
            };

            if let Some(name) = file_name.strip_suffix(BUILD_FILE_SUFFIX) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Takes an exclusive advisory lock on the project for the duration of
    /// a build run
    ///
    /// The output tree is single-writer; a second concurrent build against
    /// the same project root must fail fast instead of corrupting outputs.
    /// The lock is held on the root locator file, which is guaranteed to
    /// exist once discovery succeeded.
    pub fn lock(&self) -> Result<RunLock, WorkspaceError> {
        let file = File::open(self.project_root.join(ROOT_LOCATOR))?;
        file.try_lock_exclusive()
            .map_err(|_| WorkspaceError::AlreadyLocked)?;
        Ok(RunLock { file })
    }
}

/// Exclusive project lock, released on drop
#[derive(Debug)]
pub struct RunLock {
    file: File,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
