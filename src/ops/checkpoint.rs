use std::fmt;

use serde::Serialize;

use crate::model::path::NodePath;
use crate::model::step::{StatusCode, Step, TaskNode};

/// A confirmable condition that must hold before a step can be completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Checkpoint {
    Criteria,
    Tests,
    Children,
}

impl Checkpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Checkpoint::Criteria => "criteria",
            Checkpoint::Tests => "tests",
            Checkpoint::Children => "children",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outstanding checkpoints, in the order criteria, tests, children
pub fn missing_checkpoints(step: &Step) -> Vec<Checkpoint> {
    let mut missing = Vec::new();
    if !step.success_criteria.is_empty() && !step.criteria_confirmed {
        missing.push(Checkpoint::Criteria);
    }
    if !step.tests.is_empty() && !step.tests_confirmed && !step.tests_auto_confirmed {
        missing.push(Checkpoint::Tests);
    }
    if !children_all_done(step) {
        missing.push(Checkpoint::Children);
    }
    missing
}

/// True when every task of the step's plan counts as done.
/// A step without plan tasks has nothing outstanding.
pub fn children_all_done(step: &Step) -> bool {
    step.plan_tasks().iter().all(task_is_done)
}

/// A task is done when it is not blocked and either carries a manual DONE
/// status or has nested steps that are all completed with their own
/// children done.
pub fn task_is_done(task: &TaskNode) -> bool {
    if task.blocked {
        return false;
    }
    let manual_done =
        task.status_manual && StatusCode::normalize(task.raw_status()) == StatusCode::Done;
    manual_done || steps_all_done(&task.steps)
}

fn steps_all_done(steps: &[Step]) -> bool {
    !steps.is_empty() && steps.iter().all(|s| s.completed && children_all_done(s))
}

// ---------------------------------------------------------------------------
// Blockers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    TaskBlocked,
    TaskEmpty,
    StepIncomplete,
    ManualNotDone,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockReason::TaskBlocked => "task is blocked",
            BlockReason::TaskEmpty => "task has no steps",
            BlockReason::StepIncomplete => "step is not completed",
            BlockReason::ManualNotDone => "task status is not DONE",
        };
        f.write_str(text)
    }
}

/// A concrete child node holding up a step's completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blocker {
    pub path: NodePath,
    pub reason: BlockReason,
}

/// Children responsible for a `children` miss on the step at `path`.
///
/// Descends through completed steps whose own children are outstanding, so
/// the deepest responsible node is reported. A manual task that is not DONE
/// is reported itself only when it has no nested steps to blame.
pub fn blocking_nodes(step: &Step, path: &NodePath) -> Vec<Blocker> {
    let mut out = Vec::new();
    collect_step_blockers(step, path, &mut out);
    out
}

fn collect_step_blockers(step: &Step, path: &NodePath, out: &mut Vec<Blocker>) {
    for (j, task) in step.plan_tasks().iter().enumerate() {
        let task_path = path.child(j);
        if task.blocked {
            out.push(Blocker {
                path: task_path,
                reason: BlockReason::TaskBlocked,
            });
        } else if task_is_done(task) {
            continue;
        } else if task.steps.is_empty() {
            let reason = if task.status_manual {
                BlockReason::ManualNotDone
            } else {
                BlockReason::TaskEmpty
            };
            out.push(Blocker {
                path: task_path,
                reason,
            });
        } else {
            for (k, nested) in task.steps.iter().enumerate() {
                let nested_path = task_path.child(k);
                if !nested.completed {
                    out.push(Blocker {
                        path: nested_path,
                        reason: BlockReason::StepIncomplete,
                    });
                } else {
                    collect_step_blockers(nested, &nested_path, out);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// A completion request refused by the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{path} cannot be completed: missing {}", join_missing(.missing))]
pub struct GateRejection {
    pub path: NodePath,
    pub missing: Vec<Checkpoint>,
    pub blockers: Vec<Blocker>,
}

fn join_missing(missing: &[Checkpoint]) -> String {
    missing
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check whether the step at `path` may be marked completed
pub fn check_completion(step: &Step, path: &NodePath) -> Result<(), GateRejection> {
    let missing = missing_checkpoints(step);
    if missing.is_empty() {
        return Ok(());
    }
    let blockers = if missing.contains(&Checkpoint::Children) {
        blocking_nodes(step, path)
    } else {
        Vec::new()
    };
    Err(GateRejection {
        path: path.clone(),
        missing,
        blockers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::step::StepPlan;

    fn manual_done_task() -> TaskNode {
        let mut task = TaskNode::new("manual");
        task.status_manual = true;
        task.status_code = Some("DONE".into());
        task
    }

    fn step_with_tasks(tasks: Vec<TaskNode>) -> Step {
        let mut step = Step::new("parent");
        step.plan = Some(StepPlan {
            title: String::new(),
            tasks,
        });
        step
    }

    #[test]
    fn test_only_criteria_missing() {
        let mut step = step_with_tasks(vec![manual_done_task()]);
        step.success_criteria = vec!["a".into()];
        assert_eq!(missing_checkpoints(&step), vec![Checkpoint::Criteria]);
    }

    #[test]
    fn test_blocked_task_adds_children() {
        let mut task = manual_done_task();
        task.blocked = true;
        let mut step = step_with_tasks(vec![task]);
        step.success_criteria = vec!["a".into()];
        assert_eq!(
            missing_checkpoints(&step),
            vec![Checkpoint::Criteria, Checkpoint::Children]
        );
    }

    #[test]
    fn test_tests_auto_confirmed_counts() {
        let mut step = Step::new("s");
        step.tests = vec!["cargo test".into()];
        assert_eq!(missing_checkpoints(&step), vec![Checkpoint::Tests]);
        step.tests_auto_confirmed = true;
        assert!(missing_checkpoints(&step).is_empty());
    }

    #[test]
    fn test_empty_lists_need_no_confirmation() {
        let step = Step::new("s");
        assert!(missing_checkpoints(&step).is_empty());
        assert!(children_all_done(&step));
    }

    #[test]
    fn test_task_rules() {
        assert!(task_is_done(&manual_done_task()));

        let mut manual_active = manual_done_task();
        manual_active.status_code = Some("ACTIVE".into());
        assert!(!task_is_done(&manual_active));

        // Completed nested steps finish a manual task whatever its status
        let mut finished = Step::new("finished");
        finished.completed = true;
        manual_active.steps = vec![finished];
        assert!(task_is_done(&manual_active));

        // Non-manual DONE status does not count by itself
        let mut derived = TaskNode::new("derived");
        derived.status_code = Some("DONE".into());
        assert!(!task_is_done(&derived));

        let mut done_step = Step::new("x");
        done_step.completed = true;
        derived.steps = vec![done_step.clone()];
        assert!(task_is_done(&derived));

        // A completed nested step with an unfinished plan keeps the task open
        done_step.plan = Some(StepPlan {
            title: String::new(),
            tasks: vec![TaskNode::new("empty")],
        });
        derived.steps = vec![done_step];
        assert!(!task_is_done(&derived));
    }

    #[test]
    fn test_blocking_nodes_report_deepest_cause() {
        let mut inner_done = Step::new("inner");
        inner_done.completed = true;
        inner_done.plan = Some(StepPlan {
            title: String::new(),
            tasks: vec![TaskNode::new("empty")],
        });
        let mut busy = TaskNode::new("busy");
        busy.steps = vec![inner_done, Step::new("open")];
        let mut blocked = TaskNode::new("blocked");
        blocked.blocked = true;

        let step = step_with_tasks(vec![busy, blocked, manual_done_task()]);
        let path = NodePath::root(2);
        let blockers: Vec<(String, BlockReason)> = blocking_nodes(&step, &path)
            .into_iter()
            .map(|b| (b.path.to_string(), b.reason))
            .collect();
        assert_eq!(
            blockers,
            vec![
                ("s:2.t:0.s:0.t:0".to_string(), BlockReason::TaskEmpty),
                ("s:2.t:0.s:1".to_string(), BlockReason::StepIncomplete),
                ("s:2.t:1".to_string(), BlockReason::TaskBlocked),
            ]
        );
    }

    #[test]
    fn test_manual_task_blockers() {
        let mut idle = manual_done_task();
        idle.status_code = Some("TODO".into());
        let mut active = manual_done_task();
        active.status_code = Some("ACTIVE".into());
        active.steps = vec![Step::new("open")];

        let step = step_with_tasks(vec![idle, active]);
        let blockers: Vec<(String, BlockReason)> = blocking_nodes(&step, &NodePath::root(0))
            .into_iter()
            .map(|b| (b.path.to_string(), b.reason))
            .collect();
        assert_eq!(
            blockers,
            vec![
                ("s:0.t:0".to_string(), BlockReason::ManualNotDone),
                ("s:0.t:1.s:0".to_string(), BlockReason::StepIncomplete),
            ]
        );

        let mut step = step;
        step.plan_tasks_mut()[1].steps[0].completed = true;
        step.plan_tasks_mut()[0].status_code = Some("done".into());
        assert!(check_completion(&step, &NodePath::root(0)).is_ok());
    }

    #[test]
    fn test_check_completion() {
        let mut step = step_with_tasks(vec![TaskNode::new("empty")]);
        step.success_criteria = vec!["works".into()];
        let path = NodePath::root(0);

        let err = check_completion(&step, &path).unwrap_err();
        assert_eq!(err.missing, vec![Checkpoint::Criteria, Checkpoint::Children]);
        assert_eq!(err.blockers.len(), 1);
        assert_eq!(
            err.to_string(),
            "s:0 cannot be completed: missing criteria, children"
        );

        step.criteria_confirmed = true;
        step.plan = None;
        assert!(check_completion(&step, &path).is_ok());
    }

    #[test]
    fn test_gate_ignores_step_blocked_flag() {
        let mut step = Step::new("s");
        step.blocked = true;
        assert!(check_completion(&step, &NodePath::root(0)).is_ok());
    }
}
