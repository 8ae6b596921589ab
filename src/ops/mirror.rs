use serde::Serialize;

use crate::model::path::{NodeKind, NodePath};
use crate::model::step::{StatusCode, Step};
use crate::model::tree::{TreeNode, build_tree};
use crate::ops::checkpoint::task_is_done;
use crate::ops::index::{NodeIndex, TreeError};
use crate::ops::lens::{self, NodeRef};
use crate::ops::stats::{NodeStats, build_stats};
use crate::ops::status::{StepStatus, step_status, task_status};

/// One row of a mirror: an immediate child of the mirrored scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorItem {
    pub kind: NodeKind,
    pub path: NodePath,
    pub id: String,
    pub title: String,
    pub status: StepStatus,
    pub progress: u8,
    /// Completed steps strictly below this item
    pub children_done: usize,
    /// Steps strictly below this item
    pub children_total: usize,
    pub criteria_confirmed: bool,
    pub tests_confirmed: bool,
    pub criteria_auto_confirmed: bool,
    pub tests_auto_confirmed: bool,
    pub blocked: bool,
}

/// Flattened projection of the immediate children of `scope`: the root
/// step list for `None`, a step's plan tasks, or a task's nested steps.
pub fn mirror_items(steps: &[Step], scope: Option<&NodePath>) -> Result<Vec<MirrorItem>, TreeError> {
    let tree = build_tree(steps);
    let stats = build_stats(&tree);
    let children: &[TreeNode] = match scope {
        None => tree.as_slice(),
        Some(path) => NodeIndex::build(&tree).get(path)?.children(),
    };

    let mut items = children
        .iter()
        .map(|node| {
            let subtree = stats.get(node.path()).copied().unwrap_or_default();
            mirror_item(steps, node, subtree)
        })
        .collect::<Result<Vec<_>, _>>()?;
    normalize_progress(&mut items);
    Ok(items)
}

fn mirror_item(steps: &[Step], node: &TreeNode, subtree: NodeStats) -> Result<MirrorItem, TreeError> {
    let item = match node {
        TreeNode::Step { path, step, .. } => {
            let below = NodeStats {
                done: subtree.done - usize::from(step.completed),
                total: subtree.total - 1,
            };
            let status = step_status(step);
            let progress = if status == StepStatus::Completed {
                100
            } else {
                below.percent()
            };
            MirrorItem {
                kind: NodeKind::Step,
                path: path.clone(),
                id: step.id.clone(),
                title: step.title.clone(),
                status,
                progress,
                children_done: below.done,
                children_total: below.total,
                criteria_confirmed: step.criteria_confirmed,
                tests_confirmed: step.tests_confirmed,
                criteria_auto_confirmed: step.criteria_auto_confirmed,
                tests_auto_confirmed: step.tests_auto_confirmed,
                blocked: step.blocked,
            }
        }
        TreeNode::Task { path, task, .. } => {
            // Tree nodes do not carry nested data; the done rule needs the raw task
            let done = match lens::resolve(steps, path)? {
                NodeRef::Task(raw) => task_is_done(raw),
                NodeRef::Step(_) => false,
            };
            let code = task_status(task);
            let status = if done || (code == StatusCode::Done && !task.blocked) {
                StepStatus::Completed
            } else if task.blocked {
                StepStatus::Blocked
            } else if code == StatusCode::Active {
                StepStatus::InProgress
            } else {
                StepStatus::Pending
            };
            MirrorItem {
                kind: NodeKind::Task,
                path: path.clone(),
                id: task.id.clone(),
                title: task.title.clone(),
                status,
                progress: subtree.percent(),
                children_done: subtree.done,
                children_total: subtree.total,
                criteria_confirmed: false,
                tests_confirmed: false,
                criteria_auto_confirmed: false,
                tests_auto_confirmed: false,
                blocked: task.blocked,
            }
        }
    };
    Ok(item)
}

/// Keep only the first `in_progress` item; with none, promote the first pending one.
fn normalize_progress(items: &mut [MirrorItem]) {
    let mut seen_active = false;
    for item in items.iter_mut() {
        if item.status == StepStatus::InProgress {
            if seen_active {
                item.status = StepStatus::Pending;
            }
            seen_active = true;
        }
    }
    if !seen_active {
        if let Some(item) = items.iter_mut().find(|i| i.status == StepStatus::Pending) {
            item.status = StepStatus::InProgress;
        }
    }
}
