//! Kiln - An incremental build orchestrator for native C/C++ projects
//!
//! Kiln discovers a project root by its `kiln.root` marker, resolves
//! layered JSON build configurations, tracks source-file identity in a
//! dependency graph to skip unchanged translation units, and drives the
//! configured toolchain (msvc, clang or gcc) step by step until the build
//! completes or the first step fails.

pub mod cli;
pub mod config;
pub mod domain;
pub mod pipeline;
pub mod toolchain;

pub use config::{BuildConfig, ProjectConfig, Workspace};
pub use domain::{DependencyGraph, Fingerprint, NodeId};
pub use pipeline::BuildPipeline;
pub use toolchain::Toolchain;
