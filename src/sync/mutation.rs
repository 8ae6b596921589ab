use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

use crate::model::path::{NodeKind, NodePath};
use crate::model::step::{StatusCode, Step, now_timestamp};
use crate::ops::checkpoint::{GateRejection, check_completion};
use crate::ops::index::TreeError;
use crate::ops::lens::{self, NodeMut};
use crate::sync::intent::{Intent, IntentError, IntentRequest};

/// Error type for building, applying or syncing a mutation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MutationError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Rejected(#[from] GateRejection),
    #[error("invalid mutation: {0}")]
    Invalid(String),
    #[error("task {0} is not loaded")]
    NotLoaded(String),
    #[error("remote store rejected the change: {0}")]
    Remote(#[from] IntentError),
}

/// Confirmation state for one checkpoint, with an optional note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMark {
    #[serde(default = "default_true")]
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CheckpointMark {
    pub fn confirm() -> Self {
        CheckpointMark {
            confirmed: true,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Fields of a step to overwrite. `None` leaves the field as is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockers: Option<Vec<String>>,
}

impl StepPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.success_criteria.is_none()
            && self.tests.is_none()
            && self.blockers.is_none()
    }
}

/// Fields of a task node to overwrite
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_status"
    )]
    pub status: Option<StatusCode>,
}

/// Task status codes are accepted in any case, like everywhere else they are read
fn deserialize_status<'de, D>(deserializer: D) -> Result<Option<StatusCode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|r| {
        StatusCode::parse(&r)
            .ok_or_else(|| de::Error::custom(format!("unknown task status {:?}", r)))
    })
    .transpose()
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.status.is_none()
    }
}

/// A change to one node of a task document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetCompleted {
        path: NodePath,
        completed: bool,
    },
    Verify {
        path: NodePath,
        criteria: Option<CheckpointMark>,
        tests: Option<CheckpointMark>,
    },
    DefineStep {
        path: NodePath,
        patch: StepPatch,
    },
    DefineTask {
        path: NodePath,
        patch: TaskPatch,
    },
    SetBlocked {
        path: NodePath,
        blocked: bool,
        reason: Option<String>,
    },
    AddNote {
        path: NodePath,
        note: String,
    },
    Delete {
        path: NodePath,
    },
}

// Wire params, one struct per intent

#[derive(Deserialize)]
struct ProgressParams {
    #[serde(default)]
    completed: bool,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct CheckpointParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    criteria: Option<CheckpointMark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tests: Option<CheckpointMark>,
}

#[derive(Deserialize)]
struct VerifyParams {
    #[serde(default)]
    checkpoints: CheckpointParams,
}

#[derive(Deserialize)]
struct BlockParams {
    #[serde(default = "default_true")]
    blocked: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct NoteParams {
    #[serde(default)]
    note: String,
}

impl Mutation {
    pub fn path(&self) -> &NodePath {
        match self {
            Mutation::SetCompleted { path, .. }
            | Mutation::Verify { path, .. }
            | Mutation::DefineStep { path, .. }
            | Mutation::DefineTask { path, .. }
            | Mutation::SetBlocked { path, .. }
            | Mutation::AddNote { path, .. }
            | Mutation::Delete { path } => path,
        }
    }

    pub fn intent(&self) -> Intent {
        match self {
            Mutation::SetCompleted { .. } => Intent::Progress,
            Mutation::Verify { .. } => Intent::Verify,
            Mutation::DefineStep { .. } => Intent::Define,
            Mutation::DefineTask { .. } => Intent::TaskDefine,
            Mutation::SetBlocked { .. } => Intent::Block,
            Mutation::AddNote { .. } => Intent::Note,
            Mutation::Delete { path } => match path.kind() {
                NodeKind::Step => Intent::Delete,
                NodeKind::Task => Intent::TaskDelete,
            },
        }
    }

    /// True for requests that would mark a step completed
    pub fn is_completion(&self) -> bool {
        matches!(self, Mutation::SetCompleted { completed: true, .. })
    }

    /// Apply the change to a step list in place.
    ///
    /// Completion runs the checkpoint gate first. On error the list is left
    /// untouched, except that a failed `Delete` never partially removes.
    pub fn apply(&self, steps: &mut Vec<Step>) -> Result<(), MutationError> {
        match self {
            Mutation::SetCompleted { path, completed } => {
                let step = lens::step_mut(steps, path)?;
                if *completed {
                    if !step.completed {
                        check_completion(step, path)?;
                        let now = now_timestamp();
                        step.started_at.get_or_insert_with(|| now.clone());
                        step.completed_at = Some(now);
                        step.completed = true;
                    }
                } else {
                    step.completed = false;
                    step.completed_at = None;
                }
                step.computed_status = None;
            }
            Mutation::Verify {
                path,
                criteria,
                tests,
            } => {
                if criteria.is_none() && tests.is_none() {
                    return Err(MutationError::Invalid(
                        "verify needs at least one of criteria or tests".into(),
                    ));
                }
                let step = lens::step_mut(steps, path)?;
                if let Some(mark) = criteria {
                    step.criteria_confirmed = mark.confirmed;
                    push_note(&mut step.criteria_notes, mark.note.as_deref());
                }
                if let Some(mark) = tests {
                    step.tests_confirmed = mark.confirmed;
                    push_note(&mut step.tests_notes, mark.note.as_deref());
                }
                step.started_at.get_or_insert_with(now_timestamp);
                step.computed_status = None;
            }
            Mutation::DefineStep { path, patch } => {
                if patch.is_empty() {
                    return Err(MutationError::Invalid("nothing to update".into()));
                }
                let title = patch.title.as_deref().map(required_title).transpose()?;
                let step = lens::step_mut(steps, path)?;
                if let Some(title) = title {
                    step.title = title;
                }
                if let Some(criteria) = &patch.success_criteria {
                    let criteria = clean_list(criteria);
                    if criteria != step.success_criteria {
                        step.criteria_confirmed = false;
                    }
                    step.success_criteria = criteria;
                }
                if let Some(tests) = &patch.tests {
                    let tests = clean_list(tests);
                    if tests != step.tests {
                        step.tests_confirmed = false;
                    }
                    step.tests_auto_confirmed = tests.is_empty();
                    step.tests = tests;
                }
                if let Some(blockers) = &patch.blockers {
                    step.blockers = clean_list(blockers);
                }
                step.computed_status = None;
            }
            Mutation::DefineTask { path, patch } => {
                if patch.is_empty() {
                    return Err(MutationError::Invalid("nothing to update".into()));
                }
                let title = patch.title.as_deref().map(required_title).transpose()?;
                let task = lens::task_mut(steps, path)?;
                if let Some(title) = title {
                    task.title = title;
                }
                if let Some(status) = patch.status {
                    task.status_code = Some(status.as_str().to_string());
                    task.status = None;
                    task.status_manual = true;
                }
            }
            Mutation::SetBlocked {
                path,
                blocked,
                reason,
            } => {
                let reason = reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(String::from);
                match lens::resolve_mut(steps, path)? {
                    NodeMut::Step(step) => {
                        step.blocked = *blocked;
                        step.block_reason = if *blocked { reason } else { None };
                        step.computed_status = None;
                    }
                    NodeMut::Task(task) => task.blocked = *blocked,
                }
            }
            Mutation::AddNote { path, note } => {
                let note = note.trim();
                if note.is_empty() {
                    return Err(MutationError::Invalid("note must not be empty".into()));
                }
                let step = lens::step_mut(steps, path)?;
                step.progress_notes.push(note.to_string());
                step.started_at.get_or_insert_with(now_timestamp);
                step.computed_status = None;
            }
            Mutation::Delete { path } => {
                lens::remove(steps, path)?;
            }
        }
        Ok(())
    }

    /// Encode as an intent call against `task_id`
    pub fn to_request(&self, task_id: &str) -> IntentRequest {
        let mut params = Map::new();
        match self {
            Mutation::SetCompleted { completed, .. } => {
                params.insert("completed".into(), Value::Bool(*completed));
            }
            Mutation::Verify {
                criteria, tests, ..
            } => {
                let checkpoints = CheckpointParams {
                    criteria: criteria.clone(),
                    tests: tests.clone(),
                };
                if let Ok(value) = serde_json::to_value(checkpoints) {
                    params.insert("checkpoints".into(), value);
                }
            }
            Mutation::DefineStep { patch, .. } => extend_with(&mut params, patch),
            Mutation::DefineTask { patch, .. } => extend_with(&mut params, patch),
            Mutation::SetBlocked {
                blocked, reason, ..
            } => {
                params.insert("blocked".into(), Value::Bool(*blocked));
                if let Some(reason) = reason {
                    params.insert("reason".into(), Value::String(reason.clone()));
                }
            }
            Mutation::AddNote { note, .. } => {
                params.insert("note".into(), Value::String(note.clone()));
            }
            Mutation::Delete { .. } => {}
        }
        IntentRequest {
            intent: self.intent(),
            task: task_id.to_string(),
            path: self.path().clone(),
            params,
        }
    }

    /// Decode an intent call back into a mutation
    pub fn from_request(request: &IntentRequest) -> Result<Mutation, MutationError> {
        let path = request.path.clone();
        let params = Value::Object(request.params.clone());
        let mutation = match request.intent {
            Intent::Progress => {
                let p: ProgressParams = decode(request.intent, params)?;
                Mutation::SetCompleted {
                    path,
                    completed: p.completed,
                }
            }
            Intent::Verify => {
                let p: VerifyParams = decode(request.intent, params)?;
                Mutation::Verify {
                    path,
                    criteria: p.checkpoints.criteria,
                    tests: p.checkpoints.tests,
                }
            }
            Intent::Define => Mutation::DefineStep {
                path,
                patch: decode(request.intent, params)?,
            },
            Intent::TaskDefine => Mutation::DefineTask {
                path,
                patch: decode(request.intent, params)?,
            },
            Intent::Block => {
                let p: BlockParams = decode(request.intent, params)?;
                Mutation::SetBlocked {
                    path,
                    blocked: p.blocked,
                    reason: p.reason,
                }
            }
            Intent::Note => {
                let p: NoteParams = decode(request.intent, params)?;
                Mutation::AddNote { path, note: p.note }
            }
            Intent::Delete | Intent::TaskDelete => Mutation::Delete { path },
        };
        if mutation.intent() != request.intent {
            return Err(MutationError::Invalid(format!(
                "{} does not apply to {}",
                request.intent, request.path
            )));
        }
        Ok(mutation)
    }
}

fn decode<T: serde::de::DeserializeOwned>(intent: Intent, params: Value) -> Result<T, MutationError> {
    serde_json::from_value(params)
        .map_err(|e| MutationError::Invalid(format!("bad {} params: {}", intent, e)))
}

fn extend_with<T: Serialize>(params: &mut Map<String, Value>, fields: &T) {
    if let Ok(Value::Object(map)) = serde_json::to_value(fields) {
        params.extend(map);
    }
}

fn required_title(raw: &str) -> Result<String, MutationError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(MutationError::Invalid("title must not be empty".into()));
    }
    Ok(title.to_string())
}

fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn push_note(notes: &mut Vec<String>, note: Option<&str>) {
    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        notes.push(note.to_string());
    }
}
