use indexmap::IndexMap;
use std::collections::HashMap;

use crate::model::path::{NodeKind, NodePath, PathError};
use crate::model::tree::TreeNode;

/// Error type for path lookups against a tree or step list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("invalid path {path:?}: {source}")]
    InvalidPath { path: String, source: PathError },
    #[error("node not found: {0}")]
    NotFound(String),
    #[error("{path} is not a {expected} node")]
    WrongKind { path: String, expected: &'static str },
}

impl TreeError {
    pub fn wrong_kind(path: &NodePath, expected: NodeKind) -> Self {
        TreeError::WrongKind {
            path: path.to_string(),
            expected: expected.as_str(),
        }
    }
}

/// Parse a path string, mapping failures into `TreeError::InvalidPath`
pub fn parse_path(raw: &str) -> Result<NodePath, TreeError> {
    NodePath::parse(raw).map_err(|source| TreeError::InvalidPath {
        path: raw.to_string(),
        source,
    })
}

/// Lookup maps over a built tree.
///
/// Borrows the tree it was built from; rebuild the index whenever the
/// tree is rebuilt.
#[derive(Debug, Default)]
pub struct NodeIndex<'a> {
    nodes: IndexMap<NodePath, &'a TreeNode>,
    parents: HashMap<NodePath, Option<NodePath>>,
    ids: HashMap<&'a str, NodePath>,
}

impl<'a> NodeIndex<'a> {
    pub fn build(roots: &'a [TreeNode]) -> Self {
        let mut index = NodeIndex::default();
        for root in roots {
            index.visit(root, None);
        }
        index
    }

    fn visit(&mut self, node: &'a TreeNode, parent: Option<&NodePath>) {
        let path = node.path().clone();
        if let Some(id) = node.id() {
            self.ids.entry(id).or_insert_with(|| path.clone());
        }
        self.parents.insert(path.clone(), parent.cloned());
        self.nodes.insert(path.clone(), node);
        for child in node.children() {
            self.visit(child, Some(&path));
        }
    }

    pub fn get(&self, path: &NodePath) -> Result<&'a TreeNode, TreeError> {
        self.nodes
            .get(path)
            .copied()
            .ok_or_else(|| TreeError::NotFound(path.to_string()))
    }

    /// Look up by wire string. Malformed strings are reported, not panicked on.
    pub fn get_str(&self, raw: &str) -> Result<&'a TreeNode, TreeError> {
        self.get(&parse_path(raw)?)
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.nodes.contains_key(path)
    }

    /// Parent path (`Ok(None)` for a root step)
    pub fn parent(&self, path: &NodePath) -> Result<Option<&NodePath>, TreeError> {
        self.parents
            .get(path)
            .map(Option::as_ref)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))
    }

    /// Ancestors of `path`, nearest first
    pub fn ancestors(&self, path: &NodePath) -> Result<Vec<&'a TreeNode>, TreeError> {
        let mut out = Vec::new();
        let mut current = self.parent(path)?;
        while let Some(p) = current {
            out.push(self.get(p)?);
            current = self.parent(p)?;
        }
        Ok(out)
    }

    /// Resolve a stable node id to its current path
    pub fn path_of_id(&self, id: &str) -> Option<&NodePath> {
        self.ids.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in pre-order
    pub fn iter(&self) -> impl Iterator<Item = (&NodePath, &'a TreeNode)> + '_ {
        self.nodes.iter().map(|(p, n)| (p, *n))
    }
}
