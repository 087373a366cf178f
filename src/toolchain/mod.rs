//! # Toolchain Adapters
//!
//! Converts a resolved build step into a concrete, toolchain-specific
//! command line. The supported toolchains are a closed set of variants
//! behind one capability surface: adding a toolchain means adding a
//! variant, not editing a dispatch chain.
//!
//! Each variant also exposes the substrings used to classify its own
//! diagnostic output; the process runner matches them against every line
//! the subprocess emits.

mod gnu;
mod msvc;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::config::StepContext;

#[derive(Debug, Error, PartialEq)]
pub enum ToolchainError {
    #[error("Unsupported toolchain '{0}' (supported: msvc, clang, gcc)")]
    Unsupported(String),
}

/// The supported toolchain variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    Msvc,
    Clang,
    Gcc,
}

impl Toolchain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Toolchain::Msvc => "msvc",
            Toolchain::Clang => "clang",
            Toolchain::Gcc => "gcc",
        }
    }

    /// The compiler driver program to invoke
    pub fn program(&self) -> &'static str {
        match self {
            Toolchain::Msvc => "cl",
            Toolchain::Clang => "clang",
            Toolchain::Gcc => "gcc",
        }
    }

    /// Substring marking a diagnostic line as an error
    pub fn error_indicator(&self) -> Option<&'static str> {
        match self {
            Toolchain::Msvc => Some("error"),
            Toolchain::Clang | Toolchain::Gcc => Some("error:"),
        }
    }

    /// Substring marking a diagnostic line as a warning
    pub fn warning_indicator(&self) -> Option<&'static str> {
        match self {
            Toolchain::Msvc => Some("warning"),
            Toolchain::Clang | Toolchain::Gcc => Some("warning:"),
        }
    }

    /// Name of the intermediate object file produced for a source file
    /// stem, for toolchains that emit per-file objects
    pub fn object_file_name(&self, stem: &str) -> Option<String> {
        match self {
            Toolchain::Msvc => Some(format!("{stem}.obj")),
            // The GNU drivers compile and link in one invocation; there is
            // no per-file artifact to reuse
            Toolchain::Clang | Toolchain::Gcc => None,
        }
    }

    /// Synthesizes the full compiler invocation for one step
    ///
    /// `sources` is the already-enumerated list of files to hand to the
    /// compiler (the pipeline owns source discovery and staleness pruning).
    /// Include directories that do not exist on disk are skipped and
    /// reported as warnings, not hard failures.
    pub fn synthesize(
        &self,
        ctx: &StepContext,
        layout: &OutputLayout,
        sources: &[PathBuf],
    ) -> SynthesizedCommand {
        match self {
            Toolchain::Msvc => msvc::synthesize(ctx, layout, sources),
            Toolchain::Clang => gnu::synthesize("clang", ctx, layout, sources),
            Toolchain::Gcc => gnu::synthesize("gcc", ctx, layout, sources),
        }
    }
}

impl FromStr for Toolchain {
    type Err = ToolchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "msvc" => Ok(Toolchain::Msvc),
            "clang" => Ok(Toolchain::Clang),
            "gcc" => Ok(Toolchain::Gcc),
            other => Err(ToolchainError::Unsupported(other.to_string())),
        }
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved output directories for one build name, rooted at the project
/// root (each already ends in `<dir>/<build-name>`)
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub target_dir: PathBuf,
    pub object_dir: PathBuf,
    pub debug_symbols_dir: PathBuf,
}

/// An ordered compiler invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Single-line rendering for logs and dry runs
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// A synthesized command plus any non-fatal warnings raised while
/// building it (e.g. skipped include directories)
#[derive(Debug)]
pub struct SynthesizedCommand {
    pub command: CommandLine,
    pub warnings: Vec<String>,
}

/// Renders a directory path with a trailing separator, as required for
/// directory-valued compiler outputs
pub(crate) fn dir_with_separator(path: &Path) -> String {
    format!("{}{}", path.display(), std::path::MAIN_SEPARATOR)
}
