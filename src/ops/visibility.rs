use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::model::path::NodePath;
use crate::model::step::StatusCode;
use crate::model::tree::TreeNode;
use crate::ops::status::node_status_code;

/// Status filter for tree views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(StatusCode),
}

impl StatusFilter {
    pub fn is_active(self) -> bool {
        self != StatusFilter::All
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status filter {0:?} (expected ALL, TODO, ACTIVE or DONE)")]
pub struct FilterParseError(String);

impl FromStr for StatusFilter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        StatusCode::parse(s)
            .map(StatusFilter::Only)
            .ok_or_else(|| FilterParseError(s.to_string()))
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => f.write_str("ALL"),
            StatusFilter::Only(code) => f.write_str(code.as_str()),
        }
    }
}

/// Per-node visibility under a status filter
#[derive(Debug, Clone, Default)]
pub struct Visibility {
    filter: StatusFilter,
    visible: HashMap<NodePath, bool>,
    matches: HashSet<NodePath>,
}

impl Visibility {
    pub fn filter(&self) -> StatusFilter {
        self.filter
    }

    /// Absent entries are visible only when no filter is active
    pub fn is_visible(&self, path: &NodePath) -> bool {
        match self.filter {
            StatusFilter::All => true,
            StatusFilter::Only(_) => self.visible.get(path).copied().unwrap_or(false),
        }
    }

    /// True if the node matches the filter itself, as opposed to being
    /// kept visible by a matching descendant
    pub fn is_match(&self, path: &NodePath) -> bool {
        match self.filter {
            StatusFilter::All => true,
            StatusFilter::Only(_) => self.matches.contains(path),
        }
    }

    pub fn visible_count(&self) -> usize {
        self.visible.values().filter(|v| **v).count()
    }
}

/// Compute which nodes to show for `filter`. A node is visible if it
/// matches or if anything beneath it is visible.
pub fn compute_visibility(roots: &[TreeNode], filter: StatusFilter) -> Visibility {
    let mut visibility = Visibility {
        filter,
        ..Default::default()
    };
    if let StatusFilter::Only(code) = filter {
        for root in roots {
            mark(root, code, &mut visibility);
        }
    }
    visibility
}

fn mark(node: &TreeNode, code: StatusCode, out: &mut Visibility) -> bool {
    // Every child must be visited, so no short-circuiting `any`
    let mut child_visible = false;
    for child in node.children() {
        child_visible |= mark(child, code, out);
    }
    let matches = node_status_code(node) == code;
    if matches {
        out.matches.insert(node.path().clone());
    }
    let visible = matches || child_visible;
    out.visible.insert(node.path().clone(), visible);
    visible
}

// ---------------------------------------------------------------------------
// Flattening for display
// ---------------------------------------------------------------------------

/// Caller-held expand/collapse state, keyed by path
#[derive(Debug, Clone, Copy)]
pub enum Expansion<'e> {
    All,
    Only(&'e HashSet<NodePath>),
}

impl Expansion<'_> {
    fn is_expanded(&self, path: &NodePath) -> bool {
        match self {
            Expansion::All => true,
            Expansion::Only(set) => set.contains(path),
        }
    }
}

/// A row in a flattened tree view
#[derive(Debug, Clone)]
pub struct VisibleRow<'a> {
    pub node: &'a TreeNode,
    pub depth: usize,
    /// Has at least one visible child
    pub has_children: bool,
    pub is_expanded: bool,
    /// Last among its visible siblings
    pub is_last_sibling: bool,
    /// For building tree continuation lines: whether each ancestor is the last sibling
    pub ancestor_last: Vec<bool>,
    /// Shown only because a descendant matches the filter
    pub is_context: bool,
}

/// Flatten the visible part of the tree into display rows (pre-order).
pub fn flatten_visible<'a>(
    roots: &'a [TreeNode],
    visibility: &Visibility,
    expansion: Expansion<'_>,
) -> Vec<VisibleRow<'a>> {
    let mut rows = Vec::new();
    flatten_inner(roots, visibility, expansion, 0, &[], &mut rows);
    rows
}

fn flatten_inner<'a>(
    nodes: &'a [TreeNode],
    visibility: &Visibility,
    expansion: Expansion<'_>,
    depth: usize,
    ancestor_last: &[bool],
    rows: &mut Vec<VisibleRow<'a>>,
) {
    let shown: Vec<&TreeNode> = nodes
        .iter()
        .filter(|n| visibility.is_visible(n.path()))
        .collect();
    let count = shown.len();

    for (i, node) in shown.into_iter().enumerate() {
        let is_last = i + 1 == count;
        let has_children = node
            .children()
            .iter()
            .any(|c| visibility.is_visible(c.path()));
        let is_expanded = has_children && expansion.is_expanded(node.path());

        rows.push(VisibleRow {
            node,
            depth,
            has_children,
            is_expanded,
            is_last_sibling: is_last,
            ancestor_last: ancestor_last.to_vec(),
            is_context: !visibility.is_match(node.path()),
        });

        if is_expanded {
            let mut child_ancestor_last = ancestor_last.to_vec();
            child_ancestor_last.push(is_last);
            flatten_inner(
                node.children(),
                visibility,
                expansion,
                depth + 1,
                &child_ancestor_last,
                rows,
            );
        }
    }
}
