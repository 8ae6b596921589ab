use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::io::config_io::LoadedConfig;
use crate::io::lock::{FileLock, LockError};
use crate::model::config::LimitsConfig;
use crate::model::path::NodePath;
use crate::model::step::TaskDocument;
use crate::ops::index::TreeError;
use crate::sync::intent::{IntentError, IntentPayload, IntentRequest, IntentStore, codes};
use crate::sync::mutation::{Mutation, MutationError};

/// Error type for task document I/O
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(String),
    #[error("invalid task id {0:?}")]
    InvalidId(String),
    #[error("could not read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl From<StoreError> for IntentError {
    fn from(err: StoreError) -> Self {
        let code = match err {
            StoreError::NotFound(_) => codes::NOT_FOUND,
            StoreError::InvalidId(_) => codes::INVALID_PARAMS,
            _ => codes::STORE_ERROR,
        };
        IntentError::new(code, err.to_string())
    }
}

/// An intent store over a directory of `<TASK_ID>.json` documents
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    limits: LimitsConfig,
    lock_timeout: Duration,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            dir: dir.into(),
            limits: LimitsConfig::default(),
            lock_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(loaded: &LoadedConfig) -> Self {
        JsonFileStore {
            dir: loaded.store_dir(),
            limits: loaded.config.limits.clone(),
            lock_timeout: Duration::from_millis(loaded.config.store.lock_timeout_ms),
        }
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `task_id`. Ids are restricted to ASCII letters, digits,
    /// `-` and `_` so they cannot escape the store directory.
    pub fn document_path(&self, task_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !task_id.is_empty()
            && task_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(task_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", task_id)))
    }

    pub fn read_document(&self, task_id: &str) -> Result<TaskDocument, StoreError> {
        let path = self.document_path(task_id)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(task_id.to_string()));
            }
            Err(e) => return Err(StoreError::ReadError { path, source: e }),
        };
        let mut document: TaskDocument =
            serde_json::from_str(&text).map_err(|e| StoreError::ParseError {
                path: path.clone(),
                source: e,
            })?;
        if document.id.is_empty() {
            document.id = task_id.to_string();
        }
        Ok(document)
    }

    /// Write a document atomically, creating the store directory if needed
    pub fn write_document(&self, document: &TaskDocument) -> Result<(), StoreError> {
        let path = self.document_path(&document.id)?;
        let write_err = |e: io::Error| StoreError::WriteError {
            path: path.clone(),
            source: e,
        };
        fs::create_dir_all(&self.dir).map_err(write_err)?;
        let mut content = serde_json::to_string_pretty(document).map_err(|e| write_err(e.into()))?;
        content.push('\n');
        atomic_write(&path, content.as_bytes()).map_err(write_err)?;
        debug!(task = %document.id, revision = document.revision, "wrote task document");
        Ok(())
    }

    fn check_limits(&self, path: &NodePath) -> Result<(), IntentError> {
        if path.depth() > self.limits.max_path_depth {
            return Err(IntentError::new(
                codes::PATH_TOO_DEEP,
                format!(
                    "path {} has {} segments (max {})",
                    path,
                    path.depth(),
                    self.limits.max_path_depth
                ),
            ));
        }
        let len = path.to_string().len();
        if len > self.limits.max_path_len {
            return Err(IntentError::new(
                codes::PATH_TOO_LONG,
                format!("path is {} characters long (max {})", len, self.limits.max_path_len),
            ));
        }
        Ok(())
    }

    /// Apply an intent to the stored document under the directory lock
    pub fn execute_blocking(&self, request: &IntentRequest) -> Result<IntentPayload, IntentError> {
        self.check_limits(&request.path)?;
        let mutation = Mutation::from_request(request).map_err(mutation_error)?;
        if !self.document_path(&request.task)?.is_file() {
            return Err(StoreError::NotFound(request.task.clone()).into());
        }

        let _lock = FileLock::acquire(&self.dir, self.lock_timeout).map_err(StoreError::from)?;
        let mut document = self.read_document(&request.task)?;
        mutation.apply(&mut document.steps).map_err(mutation_error)?;
        document.revision += 1;
        self.write_document(&document)?;

        info!(
            task = %request.task,
            intent = %request.intent,
            path = %request.path,
            revision = document.revision,
            "applied intent"
        );
        let result = json!({ "revision": document.revision });
        Ok(IntentPayload {
            task: Some(document),
            result,
        })
    }
}

fn mutation_error(err: MutationError) -> IntentError {
    let code = match &err {
        MutationError::Tree(TreeError::NotFound(_)) => codes::PATH_NOT_FOUND,
        MutationError::Tree(_) => codes::INVALID_PATH,
        MutationError::Rejected(_) => codes::CHECKPOINTS_MISSING,
        MutationError::Invalid(_) => codes::INVALID_PARAMS,
        MutationError::NotLoaded(_) => codes::NOT_FOUND,
        MutationError::Remote(inner) => return inner.clone(),
    };
    IntentError::new(code, err.to_string())
}

/// Write `content` to `path` atomically using a temp file + rename.
fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn join_error(err: tokio::task::JoinError) -> IntentError {
    IntentError::new(codes::STORE_ERROR, format!("store worker failed: {}", err))
}

#[async_trait]
impl IntentStore for JsonFileStore {
    async fn execute(&self, request: &IntentRequest) -> Result<IntentPayload, IntentError> {
        let store = self.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || store.execute_blocking(&request))
            .await
            .map_err(join_error)?
    }

    async fn fetch(&self, task_id: &str) -> Result<TaskDocument, IntentError> {
        let store = self.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || store.read_document(&task_id))
            .await
            .map_err(join_error)?
            .map_err(IntentError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::step::{Step, StepPlan, TaskNode};
    use crate::sync::intent::Intent;
    use serde_json::Map;
    use tempfile::TempDir;

    fn document() -> TaskDocument {
        let mut gated = Step::new("gated");
        gated.success_criteria = vec!["works".into()];
        let mut task = TaskNode::new("task");
        task.steps = vec![Step::new("leaf")];
        gated.plan = Some(StepPlan {
            title: String::new(),
            tasks: vec![task],
        });
        TaskDocument {
            id: "TASK-1".into(),
            title: "Ship it".into(),
            revision: 0,
            steps: vec![gated, Step::new("free")],
        }
    }

    fn store() -> (TempDir, JsonFileStore) {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("tasks"));
        store.write_document(&document()).unwrap();
        (tmp, store)
    }

    fn request(intent: Intent, path: &str, params: serde_json::Value) -> IntentRequest {
        let params: Map<String, serde_json::Value> = serde_json::from_value(params).unwrap();
        IntentRequest {
            intent,
            task: "TASK-1".into(),
            path: NodePath::parse(path).unwrap(),
            params,
        }
    }

    #[test]
    fn test_write_then_read() {
        let (_tmp, store) = store();
        assert_eq!(store.read_document("TASK-1").unwrap(), document());
        assert!(matches!(
            store.read_document("TASK-2"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.document_path("../etc/passwd"),
            Err(StoreError::InvalidId(_))
        ));
    }

    #[test]
    fn test_execute_bumps_revision_and_persists() {
        let (_tmp, store) = store();
        let payload = store
            .execute_blocking(&request(Intent::Note, "s:1", json!({"note": "started"})))
            .unwrap();
        assert_eq!(payload.result, json!({"revision": 1}));
        let stored = store.read_document("TASK-1").unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.steps[1].progress_notes, vec!["started"]);
        assert!(!store.dir().join(".lock").exists());
    }

    #[test]
    fn test_rejects_completion_with_outstanding_checkpoints() {
        let (_tmp, store) = store();
        let err = store
            .execute_blocking(&request(Intent::Progress, "s:0", json!({"completed": true})))
            .unwrap_err();
        assert_eq!(err.code, codes::CHECKPOINTS_MISSING);
        assert!(err.message.contains("criteria"));
        assert_eq!(store.read_document("TASK-1").unwrap().revision, 0);
    }

    #[test]
    fn test_error_codes() {
        let (_tmp, store) = store();
        let missing_node = store
            .execute_blocking(&request(Intent::Note, "s:5", json!({"note": "x"})))
            .unwrap_err();
        assert_eq!(missing_node.code, codes::PATH_NOT_FOUND);

        let mut unknown_task = request(Intent::Note, "s:0", json!({"note": "x"}));
        unknown_task.task = "TASK-404".into();
        assert_eq!(
            store.execute_blocking(&unknown_task).unwrap_err().code,
            codes::NOT_FOUND
        );

        let empty_note = store
            .execute_blocking(&request(Intent::Note, "s:0", json!({"note": ""})))
            .unwrap_err();
        assert_eq!(empty_note.code, codes::INVALID_PARAMS);
    }

    #[test]
    fn test_unknown_task_without_store_dir() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("missing"));
        let err = store
            .execute_blocking(&request(Intent::Note, "s:0", json!({"note": "x"})))
            .unwrap_err();
        assert_eq!(err.code, codes::NOT_FOUND);
        assert!(!tmp.path().join("missing").exists());
    }

    #[test]
    fn test_path_limits() {
        let (_tmp, store) = store();
        let store = store.with_limits(LimitsConfig {
            max_path_depth: 2,
            max_path_len: 10,
        });
        let deep = store
            .execute_blocking(&request(Intent::Note, "s:0.t:0.s:0", json!({"note": "x"})))
            .unwrap_err();
        assert_eq!(deep.code, codes::PATH_TOO_DEEP);

        let long = store
            .execute_blocking(&request(Intent::Note, "s:100.t:200", json!({"note": "x"})))
            .unwrap_err();
        assert_eq!(long.code, codes::PATH_TOO_LONG);
    }

    #[tokio::test]
    async fn test_async_trait_roundtrip() {
        let (_tmp, store) = store();
        store
            .execute(&request(Intent::Block, "s:0.t:0", json!({"reason": "waiting"})))
            .await
            .unwrap();
        let fetched = store.fetch("TASK-1").await.unwrap();
        assert!(fetched.steps[0].plan_tasks()[0].blocked);
        assert_eq!(fetched.revision, 1);

        let err = store.fetch("TASK-2").await.unwrap_err();
        assert_eq!(err.code, codes::NOT_FOUND);
    }
}
