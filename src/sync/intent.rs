use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::path::NodePath;
use crate::model::step::TaskDocument;

/// Error codes shared by stores and the mutator
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const PATH_NOT_FOUND: &str = "PATH_NOT_FOUND";
    pub const PATH_TOO_DEEP: &str = "PATH_TOO_DEEP";
    pub const PATH_TOO_LONG: &str = "PATH_TOO_LONG";
    pub const INVALID_PATH: &str = "INVALID_PATH";
    pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
    pub const CHECKPOINTS_MISSING: &str = "CHECKPOINTS_MISSING";
    pub const STORE_ERROR: &str = "STORE_ERROR";
}

/// Named remote operations understood by an intent store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Progress,
    Verify,
    Define,
    TaskDefine,
    Block,
    Note,
    Delete,
    TaskDelete,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Progress => "progress",
            Intent::Verify => "verify",
            Intent::Define => "define",
            Intent::TaskDefine => "task_define",
            Intent::Block => "block",
            Intent::Note => "note",
            Intent::Delete => "delete",
            Intent::TaskDelete => "task_delete",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single intent call: `{"intent": ..., "task": ..., "path": ..., ...params}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub intent: Intent,
    pub task: String,
    pub path: NodePath,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Successful intent response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentPayload {
    /// Updated document, for stores that return it inline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskDocument>,
    pub result: Value,
}

/// Failure reported by an intent store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct IntentError {
    pub code: String,
    pub message: String,
}

impl IntentError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        IntentError {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

/// The remote store that owns task documents.
///
/// `execute` applies an intent and reports success or a coded failure;
/// `fetch` returns the authoritative document.
#[async_trait]
pub trait IntentStore: Send + Sync {
    async fn execute(&self, request: &IntentRequest) -> Result<IntentPayload, IntentError>;

    async fn fetch(&self, task_id: &str) -> Result<TaskDocument, IntentError>;
}
