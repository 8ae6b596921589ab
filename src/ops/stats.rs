use indexmap::IndexMap;
use serde::Serialize;

use crate::model::path::NodePath;
use crate::model::tree::TreeNode;

/// Completion counters for a subtree. Only step nodes are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub done: usize,
    pub total: usize,
}

impl NodeStats {
    /// Integer percentage, 0 for an empty subtree
    pub fn percent(self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.done * 100) / self.total) as u8
    }

    pub fn is_complete(self) -> bool {
        self.total > 0 && self.done == self.total
    }
}

impl std::ops::Add for NodeStats {
    type Output = NodeStats;

    fn add(self, rhs: NodeStats) -> NodeStats {
        NodeStats {
            done: self.done + rhs.done,
            total: self.total + rhs.total,
        }
    }
}

impl std::iter::Sum for NodeStats {
    fn sum<I: Iterator<Item = NodeStats>>(iter: I) -> NodeStats {
        iter.fold(NodeStats::default(), |acc, s| acc + s)
    }
}

/// Subtree-inclusive counters for every node, keyed by path (pre-order keys).
///
/// A step contributes itself (total 1, done if completed) plus its children;
/// a task only forwards the sum of its nested steps.
pub fn build_stats(roots: &[TreeNode]) -> IndexMap<NodePath, NodeStats> {
    let mut out = IndexMap::new();
    for root in roots {
        aggregate(root, &mut out);
    }
    out
}

fn aggregate(node: &TreeNode, out: &mut IndexMap<NodePath, NodeStats>) -> NodeStats {
    // Reserve the slot so keys stay in pre-order while totals are computed post-order
    out.insert(node.path().clone(), NodeStats::default());

    let own = match node {
        TreeNode::Step { step, .. } => NodeStats {
            done: usize::from(step.completed),
            total: 1,
        },
        TreeNode::Task { .. } => NodeStats::default(),
    };
    let stats = own + node.children().iter().map(|c| aggregate(c, out)).sum::<NodeStats>();

    out.insert(node.path().clone(), stats);
    stats
}

/// Totals across all root steps
pub fn tree_totals(roots: &[TreeNode]) -> NodeStats {
    let stats = build_stats(roots);
    roots.iter().filter_map(|r| stats.get(r.path()).copied()).sum()
}
