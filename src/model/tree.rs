use super::path::{NodeKind, NodePath};
use super::step::{Step, TaskNode};

/// A node of the addressed step/task tree.
///
/// Children of a step are the task nodes of its embedded plan; children of
/// a task are its nested steps. Each node owns a copy of its own fields only:
/// `step.plan` is always `None` and `task.steps` always empty, since that
/// data lives in `children`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Step {
        path: NodePath,
        step: Step,
        children: Vec<TreeNode>,
    },
    Task {
        path: NodePath,
        task: TaskNode,
        children: Vec<TreeNode>,
    },
}

impl TreeNode {
    pub fn path(&self) -> &NodePath {
        match self {
            TreeNode::Step { path, .. } | TreeNode::Task { path, .. } => path,
        }
    }

    pub fn children(&self) -> &[TreeNode] {
        match self {
            TreeNode::Step { children, .. } | TreeNode::Task { children, .. } => children,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            TreeNode::Step { .. } => NodeKind::Step,
            TreeNode::Task { .. } => NodeKind::Task,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            TreeNode::Step { step, .. } => &step.title,
            TreeNode::Task { task, .. } => &task.title,
        }
    }

    /// Stable node id, if the store assigned one
    pub fn id(&self) -> Option<&str> {
        let id = match self {
            TreeNode::Step { step, .. } => step.id.as_str(),
            TreeNode::Task { task, .. } => task.id.as_str(),
        };
        (!id.is_empty()).then_some(id)
    }

    pub fn as_step(&self) -> Option<&Step> {
        match self {
            TreeNode::Step { step, .. } => Some(step),
            TreeNode::Task { .. } => None,
        }
    }

    pub fn as_task(&self) -> Option<&TaskNode> {
        match self {
            TreeNode::Task { task, .. } => Some(task),
            TreeNode::Step { .. } => None,
        }
    }
}

/// Build the addressed tree for a root-level step list.
pub fn build_tree(steps: &[Step]) -> Vec<TreeNode> {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| build_step(step, NodePath::root(i)))
        .collect()
}

fn build_step(step: &Step, path: NodePath) -> TreeNode {
    let children = step
        .plan_tasks()
        .iter()
        .enumerate()
        .map(|(j, task)| build_task(task, path.child(j)))
        .collect();
    TreeNode::Step {
        path,
        step: detach_step(step),
        children,
    }
}

fn build_task(task: &TaskNode, path: NodePath) -> TreeNode {
    let children = task
        .steps
        .iter()
        .enumerate()
        .map(|(k, step)| build_step(step, path.child(k)))
        .collect();
    TreeNode::Task {
        path,
        task: detach_task(task),
        children,
    }
}

fn detach_step(step: &Step) -> Step {
    Step {
        id: step.id.clone(),
        title: step.title.clone(),
        completed: step.completed,
        success_criteria: step.success_criteria.clone(),
        tests: step.tests.clone(),
        blockers: step.blockers.clone(),
        criteria_confirmed: step.criteria_confirmed,
        tests_confirmed: step.tests_confirmed,
        criteria_auto_confirmed: step.criteria_auto_confirmed,
        tests_auto_confirmed: step.tests_auto_confirmed,
        criteria_notes: step.criteria_notes.clone(),
        tests_notes: step.tests_notes.clone(),
        blocked: step.blocked,
        block_reason: step.block_reason.clone(),
        created_at: step.created_at.clone(),
        started_at: step.started_at.clone(),
        completed_at: step.completed_at.clone(),
        progress_notes: step.progress_notes.clone(),
        computed_status: step.computed_status.clone(),
        plan: None,
    }
}

fn detach_task(task: &TaskNode) -> TaskNode {
    TaskNode {
        id: task.id.clone(),
        title: task.title.clone(),
        status_code: task.status_code.clone(),
        status: task.status.clone(),
        status_manual: task.status_manual,
        blocked: task.blocked,
        steps: Vec::new(),
    }
}

/// Visit every node in pre-order
pub fn walk<'a>(nodes: &'a [TreeNode], f: &mut dyn FnMut(&'a TreeNode)) {
    for node in nodes {
        f(node);
        walk(node.children(), f);
    }
}

/// An immutable tree snapshot rebuilt from a step list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTree {
    pub roots: Vec<TreeNode>,
}

impl TaskTree {
    pub fn build(steps: &[Step]) -> Self {
        TaskTree {
            roots: build_tree(steps),
        }
    }

    pub fn index(&self) -> crate::ops::index::NodeIndex<'_> {
        crate::ops::index::NodeIndex::build(&self.roots)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::step::StepPlan;

    fn nested_steps() -> Vec<Step> {
        let mut inner_task = TaskNode::new("Inner task");
        inner_task.steps = vec![Step::new("Deep step")];

        let mut mid = Step::new("Mid step");
        mid.plan = Some(StepPlan {
            title: String::new(),
            tasks: vec![inner_task],
        });

        let mut task_a = TaskNode::new("Task A");
        task_a.steps = vec![Step::new("A.0"), mid];

        let mut root0 = Step::new("Root 0");
        root0.plan = Some(StepPlan {
            title: "plan".into(),
            tasks: vec![task_a, TaskNode::new("Task B")],
        });
        vec![root0, Step::new("Root 1")]
    }

    fn paths(nodes: &[TreeNode]) -> Vec<String> {
        let mut out = Vec::new();
        walk(nodes, &mut |n| out.push(n.path().to_string()));
        out
    }

    #[test]
    fn test_build_tree_assigns_alternating_paths() {
        let tree = build_tree(&nested_steps());
        assert_eq!(
            paths(&tree),
            vec![
                "s:0",
                "s:0.t:0",
                "s:0.t:0.s:0",
                "s:0.t:0.s:1",
                "s:0.t:0.s:1.t:0",
                "s:0.t:0.s:1.t:0.s:0",
                "s:0.t:1",
                "s:1",
            ]
        );
    }

    #[test]
    fn test_node_kinds_follow_path_kinds() {
        let tree = build_tree(&nested_steps());
        walk(&tree, &mut |n| assert_eq!(n.kind(), n.path().kind()));
    }

    #[test]
    fn test_build_tree_does_not_borrow_input() {
        let tree = {
            let steps = nested_steps();
            TaskTree::build(&steps)
        };
        assert_eq!(tree.roots[0].title(), "Root 0");
        assert_eq!(tree.roots[0].children()[0].title(), "Task A");
    }

    #[test]
    fn test_nodes_hold_only_their_own_fields() {
        let tree = build_tree(&nested_steps());
        walk(&tree, &mut |n| match n {
            TreeNode::Step { step, .. } => assert!(step.plan.is_none()),
            TreeNode::Task { task, .. } => assert!(task.steps.is_empty()),
        });
        assert_eq!(tree[0].children().len(), 2);
        assert_eq!(tree[0].children()[0].children().len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(TaskTree::build(&[]).is_empty());
    }
}
