//! Dependency graph for tracked build files
//!
//! Nodes carry a content fingerprint and a file path; edges point from a
//! file to the files derived from it. Node IDs are stable across mutations
//! (petgraph indices are not), allocated from a monotonic counter so they
//! are deterministic and can never collide within one graph instance.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::fingerprint::Fingerprint;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Graph persistence is not supported yet")]
    PersistenceNotSupported,
}

/// Stable identifier for a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A tracked file: identity plus the evidence used for staleness decisions
#[derive(Debug, Clone)]
pub struct FileNode {
    id: NodeId,
    pub fingerprint: Fingerprint,
    pub path: PathBuf,
}

impl FileNode {
    pub fn id(&self) -> NodeId {
        self.id
    }
}

/// A dependency graph over tracked files
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph
    graph: DiGraph<FileNode, ()>,

    /// Map from stable NodeId to petgraph index
    node_map: HashMap<NodeId, NodeIndex>,

    /// Next ID to hand out; never decremented, so IDs are never reused
    next_id: u64,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Adds a node and returns its freshly allocated ID
    pub fn add_node(&mut self, fingerprint: Fingerprint, path: PathBuf) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let idx = self.graph.add_node(FileNode {
            id,
            fingerprint,
            path,
        });
        self.node_map.insert(id, idx);
        id
    }

    /// Creates a new node and links it as a child of `parent`
    pub fn add_child(
        &mut self,
        parent: NodeId,
        fingerprint: Fingerprint,
        path: PathBuf,
    ) -> Result<NodeId, GraphError> {
        let parent_idx = *self
            .node_map
            .get(&parent)
            .ok_or(GraphError::NodeNotFound(parent))?;

        let child = self.add_node(fingerprint, path);
        let child_idx = self.node_map[&child];
        self.graph.add_edge(parent_idx, child_idx, ());
        Ok(child)
    }

    /// Removes a node and every edge referencing it
    ///
    /// Returns false if the node did not exist. No remaining node keeps a
    /// dangling reference to a removed ID.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if let Some(idx) = self.node_map.remove(&id) {
            self.graph.remove_node(idx);
            // petgraph may reuse indices after removal, so rebuild the map
            self.rebuild_node_map();
            true
        } else {
            false
        }
    }

    /// Rebuilds the node map after removal
    fn rebuild_node_map(&mut self) {
        self.node_map.clear();
        for idx in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(idx) {
                self.node_map.insert(node.id, idx);
            }
        }
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.node_map.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&FileNode> {
        let idx = self.node_map.get(&id)?;
        self.graph.node_weight(*idx)
    }

    /// Returns the IDs of a node's children, in insertion order
    ///
    /// The list is an owned copy; callers cannot mutate graph state through
    /// it. An unknown ID yields an empty list.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let idx = match self.node_map.get(&id) {
            Some(idx) => *idx,
            None => return vec![],
        };

        // petgraph iterates neighbors most-recently-added first
        let mut ids: Vec<NodeId> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n))
            .map(|node| node.id)
            .collect();
        ids.reverse();
        ids
    }

    /// Looks up the node tracking `path`, if any
    pub fn find_by_path(&self, path: &Path) -> Option<NodeId> {
        self.graph
            .node_weights()
            .find(|node| node.path == path)
            .map(|node| node.id)
    }

    /// Records the current fingerprint for `path`, inserting a node if the
    /// path is not tracked yet
    pub fn record(&mut self, path: &Path, fingerprint: Fingerprint) -> NodeId {
        match self.find_by_path(path) {
            Some(id) => {
                let idx = self.node_map[&id];
                if let Some(node) = self.graph.node_weight_mut(idx) {
                    node.fingerprint = fingerprint;
                }
                id
            }
            None => self.add_node(fingerprint, path.to_path_buf()),
        }
    }

    /// Decides whether a tracked source file needs recompilation
    ///
    /// True when no node exists for the path or the stored fingerprint
    /// differs from `current`. Missing evidence always resolves to stale;
    /// a false "not stale" would silently drop a required recompilation,
    /// while a false "stale" only costs extra work.
    pub fn is_stale(&self, path: &Path, current: &Fingerprint) -> bool {
        match self.find_by_path(path).and_then(|id| self.node(id)) {
            Some(node) => node.fingerprint != *current,
            None => true,
        }
    }

    /// Serializes the graph to disk. Not supported yet.
    pub fn save_to(&self, _path: &Path) -> Result<(), GraphError> {
        Err(GraphError::PersistenceNotSupported)
    }

    /// Loads a serialized graph from disk. Not supported yet.
    pub fn load_from(_path: &Path) -> Result<Self, GraphError> {
        Err(GraphError::PersistenceNotSupported)
    }
}
