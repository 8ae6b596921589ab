use serde::{Deserialize, Serialize};

use crate::model::step::{StatusCode, Step, TaskNode};
use crate::model::tree::TreeNode;

/// Effective lifecycle status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Blocked,
    Completed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Blocked => "blocked",
            StepStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<StepStatus> {
        match raw.trim() {
            "pending" => Some(StepStatus::Pending),
            "in_progress" => Some(StepStatus::InProgress),
            "blocked" => Some(StepStatus::Blocked),
            "completed" => Some(StepStatus::Completed),
            _ => None,
        }
    }

    /// Project onto the task status space used by filters
    pub fn as_status_code(self) -> StatusCode {
        match self {
            StepStatus::Completed => StatusCode::Done,
            StepStatus::InProgress => StatusCode::Active,
            StepStatus::Pending | StepStatus::Blocked => StatusCode::Todo,
        }
    }
}

/// Derive a step's status.
///
/// A recognized `computed_status` from the store wins. Otherwise, in order:
/// completed, blocked, started, pending.
pub fn step_status(step: &Step) -> StepStatus {
    if let Some(status) = step.computed_status.as_deref().and_then(StepStatus::parse) {
        return status;
    }
    if step.completed {
        StepStatus::Completed
    } else if step.blocked {
        StepStatus::Blocked
    } else if step.started_at.is_some() {
        StepStatus::InProgress
    } else {
        StepStatus::Pending
    }
}

/// Normalized status of a task node
pub fn task_status(task: &TaskNode) -> StatusCode {
    StatusCode::normalize(task.raw_status())
}

/// Status of any tree node, in the task status space
pub fn node_status_code(node: &TreeNode) -> StatusCode {
    match node {
        TreeNode::Step { step, .. } => step_status(step).as_status_code(),
        TreeNode::Task { task, .. } => task_status(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_priority() {
        let mut step = Step::new("s");
        assert_eq!(step_status(&step), StepStatus::Pending);

        step.started_at = Some("2025-05-01 10:00".into());
        assert_eq!(step_status(&step), StepStatus::InProgress);

        step.blocked = true;
        assert_eq!(step_status(&step), StepStatus::Blocked);

        step.completed = true;
        assert_eq!(step_status(&step), StepStatus::Completed);
    }

    #[test]
    fn test_computed_status_wins() {
        let mut step = Step::new("s");
        step.completed = true;
        step.computed_status = Some("in_progress".into());
        assert_eq!(step_status(&step), StepStatus::InProgress);
    }

    #[test]
    fn test_unrecognized_computed_status_falls_back() {
        let mut step = Step::new("s");
        step.blocked = true;
        step.computed_status = Some("mystery".into());
        assert_eq!(step_status(&step), StepStatus::Blocked);
    }

    #[test]
    fn test_status_code_projection() {
        assert_eq!(StepStatus::Completed.as_status_code(), StatusCode::Done);
        assert_eq!(StepStatus::InProgress.as_status_code(), StatusCode::Active);
        assert_eq!(StepStatus::Blocked.as_status_code(), StatusCode::Todo);
        assert_eq!(StepStatus::Pending.as_status_code(), StatusCode::Todo);
    }

    #[test]
    fn test_task_status_normalizes() {
        let mut task = TaskNode::new("t");
        assert_eq!(task_status(&task), StatusCode::Todo);
        task.status_code = Some("active".into());
        assert_eq!(task_status(&task), StatusCode::Active);
        task.status_code = Some("bogus".into());
        assert_eq!(task_status(&task), StatusCode::Todo);
    }

    #[test]
    fn test_derivation_does_not_mutate() {
        let mut step = Step::new("s");
        step.started_at = Some("2025-05-01 10:00".into());
        let before = step.clone();
        let _ = step_status(&step);
        assert_eq!(step, before);
    }
}
