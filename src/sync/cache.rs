use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;

use crate::model::step::TaskDocument;

/// How a cached document relates to the store's copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Last read from the store
    Fresh,
    /// Holds a local change the store has not confirmed yet
    Optimistic,
    /// Store accepted a change but the follow-up read failed
    Stale,
}

/// A cache entry: a shared, immutable document plus its write generation
#[derive(Debug, Clone)]
pub struct CachedTask {
    pub document: Arc<TaskDocument>,
    pub generation: u64,
    pub phase: Phase,
}

/// One entry per task id. Readers clone the `Arc`; writers go through
/// `insert` or the generation-checked `replace_if`.
#[derive(Debug, Default)]
pub struct TaskCache {
    entries: RwLock<HashMap<String, CachedTask>>,
    settle: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str) -> Option<CachedTask> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(task_id).cloned()
    }

    pub fn document(&self, task_id: &str) -> Option<Arc<TaskDocument>> {
        self.get(task_id).map(|entry| entry.document)
    }

    pub fn generation(&self, task_id: &str) -> Option<u64> {
        self.get(task_id).map(|entry| entry.generation)
    }

    /// Store a document unconditionally and return its new generation
    pub fn insert(&self, task_id: &str, document: TaskDocument, phase: Phase) -> u64 {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let generation = entries.get(task_id).map_or(1, |e| e.generation + 1);
        entries.insert(
            task_id.to_string(),
            CachedTask {
                document: Arc::new(document),
                generation,
                phase,
            },
        );
        generation
    }

    /// Compare-and-swap on the generation counter.
    ///
    /// Returns the new generation, or `None` (leaving the entry alone) when
    /// the entry was written since `expected` was observed.
    pub fn replace_if(
        &self,
        task_id: &str,
        expected: u64,
        document: Arc<TaskDocument>,
        phase: Phase,
    ) -> Option<u64> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get_mut(task_id)?;
        if entry.generation != expected {
            return None;
        }
        entry.document = document;
        entry.generation += 1;
        entry.phase = phase;
        Some(entry.generation)
    }

    /// Flag the entry stale if it is still at `expected`
    pub fn mark_stale(&self, task_id: &str, expected: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(task_id) {
            Some(entry) if entry.generation == expected => {
                entry.phase = Phase::Stale;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, task_id: &str) -> Option<CachedTask> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(task_id)
    }

    /// The async lock serializing optimistic windows for one task
    pub fn settle_lock(&self, task_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.settle.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(task_id.to_string()).or_default().clone()
    }

    pub fn task_ids(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str) -> TaskDocument {
        TaskDocument {
            id: "TASK-1".into(),
            title: title.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_bumps_generation() {
        let cache = TaskCache::new();
        assert_eq!(cache.insert("TASK-1", doc("a"), Phase::Fresh), 1);
        assert_eq!(cache.insert("TASK-1", doc("b"), Phase::Fresh), 2);
        assert_eq!(cache.document("TASK-1").unwrap().title, "b");
        assert_eq!(cache.task_ids(), vec!["TASK-1"]);
    }

    #[test]
    fn test_replace_if_rejects_outdated_generation() {
        let cache = TaskCache::new();
        let first = cache.insert("TASK-1", doc("a"), Phase::Fresh);
        let second = cache
            .replace_if("TASK-1", first, Arc::new(doc("b")), Phase::Optimistic)
            .unwrap();
        assert_eq!(second, first + 1);

        // A writer still holding `first` is discarded
        assert!(cache
            .replace_if("TASK-1", first, Arc::new(doc("stale")), Phase::Fresh)
            .is_none());
        let entry = cache.get("TASK-1").unwrap();
        assert_eq!(entry.document.title, "b");
        assert_eq!(entry.phase, Phase::Optimistic);

        assert!(!cache.mark_stale("TASK-1", first));
        assert!(cache.mark_stale("TASK-1", second));
        assert_eq!(cache.get("TASK-1").unwrap().phase, Phase::Stale);
    }

    #[test]
    fn test_replace_if_unknown_task() {
        let cache = TaskCache::new();
        assert!(cache
            .replace_if("TASK-9", 0, Arc::new(doc("x")), Phase::Fresh)
            .is_none());
    }

    #[test]
    fn test_snapshots_are_shared() {
        let cache = TaskCache::new();
        cache.insert("TASK-1", doc("a"), Phase::Fresh);
        let one = cache.document("TASK-1").unwrap();
        let two = cache.document("TASK-1").unwrap();
        assert!(Arc::ptr_eq(&one, &two));
    }

    #[test]
    fn test_settle_lock_is_per_task() {
        let cache = TaskCache::new();
        let a = cache.settle_lock("TASK-1");
        let b = cache.settle_lock("TASK-1");
        let c = cache.settle_lock("TASK-2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
