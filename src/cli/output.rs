use indexmap::IndexMap;
use serde::Serialize;

use crate::model::path::{NodeKind, NodePath};
use crate::model::step::StatusCode;
use crate::model::tree::TreeNode;
use crate::ops::checkpoint::{Checkpoint, GateRejection};
use crate::ops::mirror::MirrorItem;
use crate::ops::stats::NodeStats;
use crate::ops::status::{StepStatus, step_status, task_status};
use crate::ops::visibility::VisibleRow;
use crate::util::unicode::{pad_to_width, truncate_to_width};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct RowJson {
    pub path: NodePath,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub status: String,
    pub depth: usize,
    pub done: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub context: bool,
}

#[derive(Serialize)]
pub struct ShowJson {
    pub task: String,
    pub title: String,
    pub revision: u64,
    pub filter: String,
    pub rows: Vec<RowJson>,
}

#[derive(Serialize)]
pub struct StatsEntryJson {
    pub path: NodePath,
    pub done: usize,
    pub total: usize,
    pub percent: u8,
}

#[derive(Serialize)]
pub struct StatsJson {
    pub task: String,
    pub nodes: Vec<StatsEntryJson>,
    pub totals: TotalsJson,
}

#[derive(Serialize)]
pub struct TotalsJson {
    pub done: usize,
    pub total: usize,
    pub percent: u8,
}

#[derive(Serialize)]
pub struct MirrorJson<'a> {
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<NodePath>,
    pub items: &'a [MirrorItem],
}

#[derive(Serialize)]
pub struct GateJson<'a> {
    pub path: NodePath,
    pub ok: bool,
    pub missing: &'a [Checkpoint],
    pub blockers: Vec<BlockerJson>,
}

#[derive(Serialize)]
pub struct BlockerJson {
    pub path: NodePath,
    pub reason: String,
}

#[derive(Serialize)]
pub struct WriteJson {
    pub task: String,
    pub revision: u64,
    pub path: NodePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Status label of a node: step statuses in snake case, task codes upper case
pub fn node_status_label(node: &TreeNode) -> String {
    match node {
        TreeNode::Step { step, .. } => step_status(step).as_str().to_string(),
        TreeNode::Task { task, .. } if task.blocked => "BLOCKED".to_string(),
        TreeNode::Task { task, .. } => task_status(task).as_str().to_string(),
    }
}

pub fn row_to_json(row: &VisibleRow<'_>, stats: &IndexMap<NodePath, NodeStats>) -> RowJson {
    let counts = stats.get(row.node.path()).copied().unwrap_or_default();
    RowJson {
        path: row.node.path().clone(),
        kind: row.node.kind(),
        id: row.node.id().map(str::to_string),
        title: row.node.title().to_string(),
        status: node_status_label(row.node),
        depth: row.depth,
        done: counts.done,
        total: counts.total,
        context: row.is_context,
    }
}

pub fn stats_entry(path: &NodePath, stats: NodeStats) -> StatsEntryJson {
    StatsEntryJson {
        path: path.clone(),
        done: stats.done,
        total: stats.total,
        percent: stats.percent(),
    }
}

pub fn gate_to_json<'a>(path: &NodePath, rejection: Option<&'a GateRejection>) -> GateJson<'a> {
    match rejection {
        None => GateJson {
            path: path.clone(),
            ok: true,
            missing: &[],
            blockers: Vec::new(),
        },
        Some(r) => GateJson {
            path: path.clone(),
            ok: false,
            missing: &r.missing,
            blockers: r
                .blockers
                .iter()
                .map(|b| BlockerJson {
                    path: b.path.clone(),
                    reason: b.reason.to_string(),
                })
                .collect(),
        },
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

fn step_marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "[ ]",
        StepStatus::InProgress => "[>]",
        StepStatus::Blocked => "[-]",
        StepStatus::Completed => "[x]",
    }
}

fn task_marker(code: StatusCode, blocked: bool) -> &'static str {
    if blocked {
        return "(-)";
    }
    match code {
        StatusCode::Todo => "( )",
        StatusCode::Active => "(>)",
        StatusCode::Done => "(x)",
    }
}

pub fn node_marker(node: &TreeNode) -> &'static str {
    match node {
        TreeNode::Step { step, .. } => step_marker(step_status(step)),
        TreeNode::Task { task, .. } => task_marker(task_status(task), task.blocked),
    }
}

/// Render flattened rows as an indented tree.
///
/// Roots sit at column zero; deeper rows get `├─`/`└─` connectors and `│`
/// continuation lines. Nodes with descendants show their done/total counts.
pub fn render_tree(
    rows: &[VisibleRow<'_>],
    stats: &IndexMap<NodePath, NodeStats>,
    max_title_width: usize,
) -> Vec<String> {
    rows.iter()
        .map(|row| {
            let mut line = String::new();
            if row.depth > 0 {
                for &last in row.ancestor_last.iter().skip(1) {
                    line.push_str(if last { "   " } else { "│  " });
                }
                line.push_str(if row.is_last_sibling { "└─ " } else { "├─ " });
            }
            line.push_str(node_marker(row.node));
            line.push(' ');
            line.push_str(&truncate_to_width(row.node.title(), max_title_width));
            line.push_str(&format!("  {}", row.node.path()));
            if !row.node.children().is_empty() {
                let counts = stats.get(row.node.path()).copied().unwrap_or_default();
                line.push_str(&format!("  {}/{}", counts.done, counts.total));
            }
            line
        })
        .collect()
}

/// Format per-node counters, one line per node, titles aligned
pub fn format_stats(
    rows: &[(&TreeNode, NodeStats)],
    max_title_width: usize,
) -> Vec<String> {
    let path_width = rows
        .iter()
        .map(|(n, _)| n.path().to_string().len())
        .max()
        .unwrap_or(0);
    rows.iter()
        .map(|(node, stats)| {
            format!(
                "{}  {:>3}/{:<3} {:>3}%  {}",
                pad_to_width(&node.path().to_string(), path_width),
                stats.done,
                stats.total,
                stats.percent(),
                truncate_to_width(node.title(), max_title_width)
            )
        })
        .collect()
}

pub fn format_mirror_item(item: &MirrorItem, max_title_width: usize) -> String {
    let marker = match item.kind {
        NodeKind::Step => step_marker(item.status),
        NodeKind::Task => match item.status {
            StepStatus::Completed => "(x)",
            StepStatus::InProgress => "(>)",
            StepStatus::Blocked => "(-)",
            StepStatus::Pending => "( )",
        },
    };
    let mut flags = String::new();
    if item.kind == NodeKind::Step {
        flags.push_str(if item.criteria_confirmed { " C" } else { " c" });
        flags.push_str(if item.tests_confirmed { "T" } else { "t" });
    }
    format!(
        "{} {}  {}  {}/{} {}%{}",
        marker,
        item.path,
        truncate_to_width(&item.title, max_title_width),
        item.children_done,
        item.children_total,
        item.progress,
        flags
    )
}

/// Explain a gate decision
pub fn format_gate(path: &NodePath, rejection: Option<&GateRejection>) -> Vec<String> {
    match rejection {
        None => vec![format!("{} can be completed", path)],
        Some(r) => {
            let mut lines = vec![r.to_string()];
            for blocker in &r.blockers {
                lines.push(format!("  {}: {}", blocker.path, blocker.reason));
            }
            lines
        }
    }
}
