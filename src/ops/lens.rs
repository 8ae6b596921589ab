//! Path-addressed access into a raw step list.
//!
//! Every mutation walks its path through here, so a path that does not
//! resolve is reported once, the same way, before anything is changed.

use crate::model::path::{NodeKind, NodePath, Segment};
use crate::model::step::{Step, TaskNode};
use crate::ops::index::TreeError;

#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Step(&'a Step),
    Task(&'a TaskNode),
}

#[derive(Debug)]
pub enum NodeMut<'a> {
    Step(&'a mut Step),
    Task(&'a mut TaskNode),
}

/// A node detached from its parent by `remove`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedNode {
    Step(Step),
    Task(TaskNode),
}

fn not_found(path: &NodePath) -> TreeError {
    TreeError::NotFound(path.to_string())
}

fn split_root(path: &NodePath) -> Result<(&Segment, &[Segment]), TreeError> {
    path.segments()
        .split_first()
        .ok_or_else(|| not_found(path))
}

pub fn resolve<'a>(steps: &'a [Step], path: &NodePath) -> Result<NodeRef<'a>, TreeError> {
    let (first, mut rest) = split_root(path)?;
    let mut step = steps.get(first.index).ok_or_else(|| not_found(path))?;
    loop {
        let Some((task_seg, tail)) = rest.split_first() else {
            return Ok(NodeRef::Step(step));
        };
        let task = step
            .plan_tasks()
            .get(task_seg.index)
            .ok_or_else(|| not_found(path))?;
        let Some((step_seg, tail)) = tail.split_first() else {
            return Ok(NodeRef::Task(task));
        };
        step = task.steps.get(step_seg.index).ok_or_else(|| not_found(path))?;
        rest = tail;
    }
}

pub fn resolve_mut<'a>(steps: &'a mut [Step], path: &NodePath) -> Result<NodeMut<'a>, TreeError> {
    let (first, mut rest) = split_root(path)?;
    let mut step = steps.get_mut(first.index).ok_or_else(|| not_found(path))?;
    loop {
        let Some((task_seg, tail)) = rest.split_first() else {
            return Ok(NodeMut::Step(step));
        };
        let task = step
            .plan
            .as_mut()
            .and_then(|plan| plan.tasks.get_mut(task_seg.index))
            .ok_or_else(|| not_found(path))?;
        let Some((step_seg, tail)) = tail.split_first() else {
            return Ok(NodeMut::Task(task));
        };
        step = task
            .steps
            .get_mut(step_seg.index)
            .ok_or_else(|| not_found(path))?;
        rest = tail;
    }
}

pub fn step_at<'a>(steps: &'a [Step], path: &NodePath) -> Result<&'a Step, TreeError> {
    match resolve(steps, path)? {
        NodeRef::Step(step) => Ok(step),
        NodeRef::Task(_) => Err(TreeError::wrong_kind(path, NodeKind::Step)),
    }
}

pub fn step_mut<'a>(steps: &'a mut [Step], path: &NodePath) -> Result<&'a mut Step, TreeError> {
    match resolve_mut(steps, path)? {
        NodeMut::Step(step) => Ok(step),
        NodeMut::Task(_) => Err(TreeError::wrong_kind(path, NodeKind::Step)),
    }
}

pub fn task_mut<'a>(steps: &'a mut [Step], path: &NodePath) -> Result<&'a mut TaskNode, TreeError> {
    match resolve_mut(steps, path)? {
        NodeMut::Task(task) => Ok(task),
        NodeMut::Step(_) => Err(TreeError::wrong_kind(path, NodeKind::Task)),
    }
}

/// Detach the node at `path` from its parent. Later siblings shift down,
/// so paths captured before the removal are stale afterwards.
pub fn remove(steps: &mut Vec<Step>, path: &NodePath) -> Result<RemovedNode, TreeError> {
    let index = path.last().index;
    match path.parent() {
        None => {
            if index >= steps.len() {
                return Err(not_found(path));
            }
            Ok(RemovedNode::Step(steps.remove(index)))
        }
        Some(parent) => match resolve_mut(steps, &parent)? {
            NodeMut::Step(step) => {
                let tasks = step
                    .plan
                    .as_mut()
                    .map(|plan| &mut plan.tasks)
                    .filter(|tasks| index < tasks.len())
                    .ok_or_else(|| not_found(path))?;
                Ok(RemovedNode::Task(tasks.remove(index)))
            }
            NodeMut::Task(task) => {
                if index >= task.steps.len() {
                    return Err(not_found(path));
                }
                Ok(RemovedNode::Step(task.steps.remove(index)))
            }
        },
    }
}
