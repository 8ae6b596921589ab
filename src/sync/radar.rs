use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::path::NodePath;
use crate::sync::intent::{Intent, IntentRequest};
use crate::sync::mutation::{Mutation, MutationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

/// A suggested next action from the radar feed.
///
/// `target` is the task id; `params` carries the node `path` plus the
/// intent's own parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub action: String,
    pub target: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

/// A suggestion the user has explicitly approved. Only these can be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedSuggestion(Suggestion);

impl Suggestion {
    pub fn confirm(self) -> ConfirmedSuggestion {
        ConfirmedSuggestion(self)
    }
}

impl ConfirmedSuggestion {
    pub fn suggestion(&self) -> &Suggestion {
        &self.0
    }

    pub fn task_id(&self) -> &str {
        &self.0.target
    }

    /// Translate into the mutation it proposes
    pub fn to_mutation(&self) -> Result<Mutation, MutationError> {
        let suggestion = &self.0;
        let mut params = suggestion.params.clone();
        let intent = match suggestion.action.as_str() {
            "progress" => Intent::Progress,
            "done" => {
                params.insert("completed".into(), Value::Bool(true));
                Intent::Progress
            }
            "verify" => Intent::Verify,
            "block" => Intent::Block,
            "note" => Intent::Note,
            other => {
                return Err(MutationError::Invalid(format!(
                    "unsupported suggestion action {:?}",
                    other
                )));
            }
        };

        let raw_path = params
            .remove("path")
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| MutationError::Invalid("suggestion has no path".into()))?;
        let path = NodePath::parse(&raw_path)
            .map_err(|e| MutationError::Invalid(format!("suggestion path {:?}: {}", raw_path, e)))?;

        Mutation::from_request(&IntentRequest {
            intent,
            task: suggestion.target.clone(),
            path,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn suggestion(value: Value) -> Suggestion {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_done_becomes_completion() {
        let s = suggestion(json!({
            "action": "done",
            "target": "TASK-1",
            "reason": "all checkpoints confirmed",
            "params": {"path": "s:0"}
        }));
        assert_eq!(s.priority, Priority::Normal);
        let mutation = s.confirm().to_mutation().unwrap();
        assert_eq!(
            mutation,
            Mutation::SetCompleted {
                path: NodePath::root(0),
                completed: true
            }
        );
    }

    #[test]
    fn test_note_suggestion() {
        let s = suggestion(json!({
            "action": "note",
            "target": "TASK-1",
            "priority": "high",
            "params": {"path": "s:0.t:0.s:1", "note": "started"}
        }));
        let confirmed = s.confirm();
        assert_eq!(confirmed.task_id(), "TASK-1");
        assert!(matches!(
            confirmed.to_mutation().unwrap(),
            Mutation::AddNote { note, .. } if note == "started"
        ));
    }

    #[test]
    fn test_unsupported_and_malformed() {
        let s = suggestion(json!({"action": "delete", "target": "TASK-1", "params": {"path": "s:0"}}));
        assert!(matches!(s.confirm().to_mutation(), Err(MutationError::Invalid(_))));

        let s = suggestion(json!({"action": "note", "target": "TASK-1", "params": {"note": "x"}}));
        assert!(s.confirm().to_mutation().is_err());

        let s = suggestion(json!({"action": "note", "target": "TASK-1", "params": {"path": "t:1"}}));
        assert!(s.confirm().to_mutation().is_err());
    }
}
