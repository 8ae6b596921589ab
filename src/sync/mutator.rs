//! Optimistic mutation protocol.
//!
//! Each attempt moves Idle → Applying(snapshot) → Committed | RolledBack.
//! `MutationAttempt` is the Applying state: it is created by `begin`,
//! consumed by `commit` or `rollback`, and never outlives the task's
//! settle lock.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::model::path::NodePath;
use crate::model::step::TaskDocument;
use crate::ops::checkpoint::GateRejection;
use crate::ops::lens;
use crate::sync::cache::{Phase, TaskCache};
use crate::sync::intent::{IntentError, IntentRequest, IntentStore};
use crate::sync::mutation::{Mutation, MutationError};
use crate::sync::radar::ConfirmedSuggestion;

/// An optimistic change that has been published locally but not settled
#[derive(Debug)]
pub struct MutationAttempt {
    task_id: String,
    mutation: Mutation,
    snapshot: Arc<TaskDocument>,
    optimistic_generation: u64,
}

/// How a commit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Optimistic copy replaced by the store's document
    Refreshed(Arc<TaskDocument>),
    /// Store accepted the change but the follow-up fetch failed
    Stale(Arc<TaskDocument>),
    /// Another writer got there first; this result was dropped
    Superseded,
}

impl MutationAttempt {
    /// Snapshot the cached document, apply `mutation` to a deep copy and
    /// publish the copy as the optimistic state.
    ///
    /// Nothing is published when the mutation fails to apply.
    pub fn begin(cache: &TaskCache, task_id: &str, mutation: Mutation) -> Result<Self, MutationError> {
        let entry = cache
            .get(task_id)
            .ok_or_else(|| MutationError::NotLoaded(task_id.to_string()))?;
        let snapshot = entry.document;

        let mut working = TaskDocument::clone(&snapshot);
        mutation.apply(&mut working.steps)?;

        let optimistic_generation = cache
            .replace_if(task_id, entry.generation, Arc::new(working), Phase::Optimistic)
            .ok_or_else(|| {
                MutationError::Invalid(format!("task {} changed while applying", task_id))
            })?;

        debug!(
            task = task_id,
            intent = %mutation.intent(),
            path = %mutation.path(),
            generation = optimistic_generation,
            "applied optimistic change"
        );
        Ok(MutationAttempt {
            task_id: task_id.to_string(),
            mutation,
            snapshot,
            optimistic_generation,
        })
    }

    pub fn request(&self) -> IntentRequest {
        self.mutation.to_request(&self.task_id)
    }

    pub fn snapshot(&self) -> &Arc<TaskDocument> {
        &self.snapshot
    }

    /// Settle a change the store accepted, using the result of the
    /// follow-up fetch.
    pub fn commit(self, cache: &TaskCache, refreshed: Result<TaskDocument, IntentError>) -> CommitOutcome {
        match refreshed {
            Ok(document) => {
                let document = Arc::new(document);
                match cache.replace_if(
                    &self.task_id,
                    self.optimistic_generation,
                    document.clone(),
                    Phase::Fresh,
                ) {
                    Some(_) => CommitOutcome::Refreshed(document),
                    None => {
                        info!(task = %self.task_id, "discarding superseded commit");
                        CommitOutcome::Superseded
                    }
                }
            }
            Err(err) => {
                warn!(
                    task = %self.task_id,
                    error = %err,
                    "refresh after commit failed, keeping optimistic copy"
                );
                if cache.mark_stale(&self.task_id, self.optimistic_generation) {
                    match cache.document(&self.task_id) {
                        Some(document) => CommitOutcome::Stale(document),
                        None => CommitOutcome::Superseded,
                    }
                } else {
                    CommitOutcome::Superseded
                }
            }
        }
    }

    /// Restore the snapshot. Returns false if a later write already
    /// replaced the optimistic copy, in which case nothing is restored.
    pub fn rollback(self, cache: &TaskCache) -> bool {
        let restored = cache
            .replace_if(
                &self.task_id,
                self.optimistic_generation,
                self.snapshot,
                Phase::Fresh,
            )
            .is_some();
        if restored {
            info!(task = %self.task_id, path = %self.mutation.path(), "rolled back optimistic change");
        } else {
            info!(task = %self.task_id, "discarding superseded rollback");
        }
        restored
    }
}

/// Result of toggling a step's completion
#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    Toggled {
        completed: bool,
        document: Arc<TaskDocument>,
    },
    /// The gate refused completion; nothing was changed
    NeedsCheckpoints(GateRejection),
}

/// Drives mutations through the cache and the remote store
#[derive(Clone)]
pub struct OptimisticMutator {
    cache: Arc<TaskCache>,
    store: Arc<dyn IntentStore>,
}

impl OptimisticMutator {
    pub fn new(store: Arc<dyn IntentStore>) -> Self {
        Self::with_cache(Arc::new(TaskCache::new()), store)
    }

    pub fn with_cache(cache: Arc<TaskCache>, store: Arc<dyn IntentStore>) -> Self {
        OptimisticMutator { cache, store }
    }

    pub fn cache(&self) -> &Arc<TaskCache> {
        &self.cache
    }

    /// Current cached document for `task_id`
    pub fn document(&self, task_id: &str) -> Option<Arc<TaskDocument>> {
        self.cache.document(task_id)
    }

    /// Fetch a task into the cache (same as `refresh`)
    pub async fn load(&self, task_id: &str) -> Result<Arc<TaskDocument>, MutationError> {
        self.refresh(task_id).await
    }

    /// Reload a task from the store, waiting for any in-flight mutation
    pub async fn refresh(&self, task_id: &str) -> Result<Arc<TaskDocument>, MutationError> {
        let lock = self.cache.settle_lock(task_id);
        let _guard = lock.lock().await;
        let document = self.store.fetch(task_id).await?;
        self.cache.insert(task_id, document, Phase::Fresh);
        self.cache
            .document(task_id)
            .ok_or_else(|| MutationError::NotLoaded(task_id.to_string()))
    }

    /// Apply `mutation` optimistically and sync it with the store
    pub async fn apply(&self, task_id: &str, mutation: Mutation) -> Result<Arc<TaskDocument>, MutationError> {
        let lock = self.cache.settle_lock(task_id);
        let _guard = lock.lock().await;
        self.run_settled(task_id, mutation).await
    }

    /// Flip a step's completion. A gate rejection is reported as
    /// `NeedsCheckpoints` rather than an error.
    pub async fn toggle_completion(&self, task_id: &str, path: &NodePath) -> Result<ToggleOutcome, MutationError> {
        let lock = self.cache.settle_lock(task_id);
        let _guard = lock.lock().await;

        let current = self
            .cache
            .document(task_id)
            .ok_or_else(|| MutationError::NotLoaded(task_id.to_string()))?;
        let completed = !lens::step_at(&current.steps, path)?.completed;

        let mutation = Mutation::SetCompleted {
            path: path.clone(),
            completed,
        };
        match self.run_settled(task_id, mutation).await {
            Ok(document) => Ok(ToggleOutcome::Toggled {
                completed,
                document,
            }),
            Err(MutationError::Rejected(rejection)) => Ok(ToggleOutcome::NeedsCheckpoints(rejection)),
            Err(e) => Err(e),
        }
    }

    /// Execute a radar suggestion the user confirmed
    pub async fn execute_suggestion(
        &self,
        suggestion: &ConfirmedSuggestion,
    ) -> Result<Arc<TaskDocument>, MutationError> {
        let mutation = suggestion.to_mutation()?;
        let task_id = suggestion.task_id();
        if self.cache.get(task_id).is_none() {
            self.load(task_id).await?;
        }
        self.apply(task_id, mutation).await
    }

    /// The protocol body. Callers hold the task's settle lock.
    async fn run_settled(&self, task_id: &str, mutation: Mutation) -> Result<Arc<TaskDocument>, MutationError> {
        let attempt = MutationAttempt::begin(&self.cache, task_id, mutation)?;
        let request = attempt.request();

        match self.store.execute(&request).await {
            Ok(_) => {
                let refreshed = self.store.fetch(task_id).await;
                match attempt.commit(&self.cache, refreshed) {
                    CommitOutcome::Refreshed(document) | CommitOutcome::Stale(document) => Ok(document),
                    CommitOutcome::Superseded => self
                        .cache
                        .document(task_id)
                        .ok_or_else(|| MutationError::NotLoaded(task_id.to_string())),
                }
            }
            Err(err) => {
                warn!(
                    task = task_id,
                    intent = %request.intent,
                    path = %request.path,
                    error = %err,
                    "remote intent failed"
                );
                attempt.rollback(&self.cache);
                Err(MutationError::Remote(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::step::{Step, StepPlan, TaskNode};
    use crate::sync::intent::{Intent, IntentPayload, codes};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory store that applies intents for real, with switchable failures
    struct FakeStore {
        document: Mutex<TaskDocument>,
        fail_intent: Mutex<Option<Intent>>,
        fail_fetch_after_execute: Mutex<bool>,
        delay: Duration,
    }

    impl FakeStore {
        fn new(document: TaskDocument) -> Self {
            FakeStore {
                document: Mutex::new(document),
                fail_intent: Mutex::new(None),
                fail_fetch_after_execute: Mutex::new(false),
                delay: Duration::from_millis(5),
            }
        }
    }

    #[async_trait]
    impl IntentStore for FakeStore {
        async fn execute(&self, request: &IntentRequest) -> Result<IntentPayload, IntentError> {
            tokio::time::sleep(self.delay).await;
            if *self.fail_intent.lock().unwrap() == Some(request.intent) {
                return Err(IntentError::new(codes::STORE_ERROR, "store is unavailable"));
            }
            let mutation = Mutation::from_request(request)
                .map_err(|e| IntentError::new(codes::INVALID_PARAMS, e.to_string()))?;
            let mut doc = self.document.lock().unwrap();
            mutation
                .apply(&mut doc.steps)
                .map_err(|e| IntentError::new(codes::PATH_NOT_FOUND, e.to_string()))?;
            doc.revision += 1;
            Ok(IntentPayload::default())
        }

        async fn fetch(&self, task_id: &str) -> Result<TaskDocument, IntentError> {
            if *self.fail_fetch_after_execute.lock().unwrap() {
                return Err(IntentError::new(codes::STORE_ERROR, "read timed out"));
            }
            let doc = self.document.lock().unwrap().clone();
            if doc.id != task_id {
                return Err(IntentError::new(codes::NOT_FOUND, format!("task {} not found", task_id)));
            }
            Ok(doc)
        }
    }

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
            revision: 1,
            steps: vec![gated, Step::new("free")],
        }
    }

    fn p(raw: &str) -> NodePath {
        NodePath::parse(raw).unwrap()
    }

    async fn setup() -> (Arc<FakeStore>, OptimisticMutator) {
        let store = Arc::new(FakeStore::new(document()));
        let mutator = OptimisticMutator::new(store.clone());
        mutator.load("TASK-1").await.unwrap();
        (store, mutator)
    }

    #[tokio::test]
    async fn test_commit_replaces_with_store_document() {
        let (_store, mutator) = setup().await;
        let doc = mutator
            .apply(
                "TASK-1",
                Mutation::AddNote {
                    path: p("s:1"),
                    note: "started".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(doc.revision, 2);
        assert_eq!(doc.steps[1].progress_notes, vec!["started"]);
        let entry = mutator.cache().get("TASK-1").unwrap();
        assert_eq!(entry.phase, Phase::Fresh);
        assert!(Arc::ptr_eq(&entry.document, &doc));
    }

    #[tokio::test]
    async fn test_remote_failure_restores_snapshot() {
        let (store, mutator) = setup().await;
        let before = mutator.document("TASK-1").unwrap();
        *store.fail_intent.lock().unwrap() = Some(Intent::Progress);

        let err = mutator.toggle_completion("TASK-1", &p("s:1")).await.unwrap_err();
        match &err {
            MutationError::Remote(e) => assert!(!e.message.is_empty()),
            other => panic!("expected remote error, got {other:?}"),
        }
        assert!(!err.to_string().is_empty());

        let after = mutator.document("TASK-1").unwrap();
        assert_eq!(*after, *before);
        assert!(Arc::ptr_eq(&after, &before));
    }

    #[tokio::test]
    async fn test_toggle_reports_missing_checkpoints() {
        let (_store, mutator) = setup().await;
        let before = mutator.cache().get("TASK-1").unwrap();
        let outcome = mutator.toggle_completion("TASK-1", &p("s:0")).await.unwrap();
        match outcome {
            ToggleOutcome::NeedsCheckpoints(rejection) => {
                assert_eq!(rejection.path, p("s:0"));
                assert!(!rejection.missing.is_empty());
            }
            other => panic!("expected NeedsCheckpoints, got {other:?}"),
        }
        // Untouched: same document, same generation
        let after = mutator.cache().get("TASK-1").unwrap();
        assert_eq!(after.generation, before.generation);
    }

    #[tokio::test]
    async fn test_toggle_flips_both_ways() {
        let (_store, mutator) = setup().await;
        let outcome = mutator.toggle_completion("TASK-1", &p("s:1")).await.unwrap();
        assert!(matches!(outcome, ToggleOutcome::Toggled { completed: true, .. }));
        let outcome = mutator.toggle_completion("TASK-1", &p("s:1")).await.unwrap();
        match outcome {
            ToggleOutcome::Toggled { completed, document } => {
                assert!(!completed);
                assert!(!document.steps[1].completed);
                assert_eq!(document.revision, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unresolvable_path_fails_before_remote_call() {
        let (store, mutator) = setup().await;
        let generation = mutator.cache().generation("TASK-1");
        let err = mutator
            .apply(
                "TASK-1",
                Mutation::AddNote {
                    path: p("s:4"),
                    note: "x".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Tree(_)));
        assert_eq!(mutator.cache().generation("TASK-1"), generation);
        assert_eq!(store.document.lock().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_not_loaded() {
        let store = Arc::new(FakeStore::new(document()));
        let mutator = OptimisticMutator::new(store);
        let err = mutator
            .apply("TASK-1", Mutation::Delete { path: p("s:1") })
            .await
            .unwrap_err();
        assert_eq!(err, MutationError::NotLoaded("TASK-1".into()));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_optimistic_copy() {
        let (store, mutator) = setup().await;
        *store.fail_fetch_after_execute.lock().unwrap() = true;
        let doc = mutator
            .apply(
                "TASK-1",
                Mutation::AddNote {
                    path: p("s:1"),
                    note: "offline".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(doc.steps[1].progress_notes, vec!["offline"]);
        // Revision is the local one: the store's bump was never read back
        assert_eq!(doc.revision, 1);
        assert_eq!(mutator.cache().get("TASK-1").unwrap().phase, Phase::Stale);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_do_not_clobber() {
        let (store, mutator) = setup().await;
        *store.fail_intent.lock().unwrap() = Some(Intent::Block);

        let first = mutator.apply(
            "TASK-1",
            Mutation::AddNote {
                path: p("s:1"),
                note: "first".into(),
            },
        );
        let second = mutator.apply(
            "TASK-1",
            Mutation::SetBlocked {
                path: p("s:1"),
                blocked: true,
                reason: None,
            },
        );
        let (first, second) = tokio::join!(first, second);
        let committed = first.unwrap();
        assert!(matches!(second, Err(MutationError::Remote(_))));

        // The failed mutation rolled back onto the first one's refresh
        let current = mutator.document("TASK-1").unwrap();
        assert_eq!(*current, *committed);
        assert_eq!(current.steps[1].progress_notes, vec!["first"]);
        assert!(!current.steps[1].blocked);
        assert_eq!(current.revision, 2);
    }

    #[test]
    fn test_stale_attempt_is_inert() {
        let cache = TaskCache::new();
        cache.insert("TASK-1", document(), Phase::Fresh);
        let attempt = MutationAttempt::begin(
            &cache,
            "TASK-1",
            Mutation::AddNote {
                path: p("s:1"),
                note: "late".into(),
            },
        )
        .unwrap();

        // Someone else writes after the optimistic publish
        let mut newer = document();
        newer.revision = 7;
        let generation = cache.insert("TASK-1", newer, Phase::Fresh);

        assert!(!attempt.rollback(&cache));
        let entry = cache.get("TASK-1").unwrap();
        assert_eq!(entry.generation, generation);
        assert_eq!(entry.document.revision, 7);
    }

    #[tokio::test]
    async fn test_execute_confirmed_suggestion() {
        let (_store, mutator) = setup().await;
        let suggestion: crate::sync::radar::Suggestion = serde_json::from_value(serde_json::json!({
            "action": "block",
            "target": "TASK-1",
            "reason": "waiting",
            "params": {"path": "s:0.t:0", "reason": "upstream"}
        }))
        .unwrap();
        let doc = mutator.execute_suggestion(&suggestion.confirm()).await.unwrap();
        assert!(doc.steps[0].plan_tasks()[0].blocked);
    }
}
