//! Domain models for kiln
//!
//! Contains the core incremental-build logic without any I/O policy.

mod fingerprint;
mod graph;

pub use fingerprint::Fingerprint;
pub use graph::{DependencyGraph, FileNode, GraphError, NodeId};
