// SPDX-License-Identifier: MIT
//! In-memory task store.
//!
//! Owns the authoritative task collection: a by-id lookup and an
//! insertion-ordered sequence, kept consistent as one unit behind a single
//! reader/writer lock. Pagination is a decimal offset cursor into the
//! ordered sequence. A one-shot failure injector lives under the same lock
//! so callers can exercise their retry paths against a real `Unavailable`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Page size applied when the caller passes `page_size <= 0`.
const DEFAULT_PAGE_SIZE: i64 = 10;
/// Hard cap on page size.
const MAX_PAGE_SIZE: i64 = 100;

/// Lifecycle state of a task.
///
/// Tasks are created `Pending`; no transition operation is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
}

/// A unit of work tracked by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Equal to `created_at` — there is no update operation to advance it.
    pub updated_at: DateTime<Utc>,
}

/// Store failures, classified once at the point of detection and returned
/// verbatim to the caller. `Unavailable` is the only classification a caller
/// may retry on.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Both views of the collection plus the injector flag, guarded together.
///
/// `order` is append-only and is the ordering authority for pagination.
/// `by_id` maps task id → index into `order`; tasks are never removed, so
/// indices stay valid for the life of the store.
struct StoreInner {
    order: Vec<Task>,
    by_id: HashMap<String, usize>,
    /// One-shot failure injector. When set, the next `create` call fails
    /// `Unavailable` and clears the flag in the same critical section, so it
    /// never fires twice and cannot race a concurrent create.
    fail_next: bool,
}

impl StoreInner {
    fn insert(&mut self, task: Task) -> Task {
        self.by_id.insert(task.id.clone(), self.order.len());
        self.order.push(task.clone());
        task
    }
}

fn new_task(id: String, title: &str, description: &str) -> Task {
    let now = Utc::now();
    Task {
        id,
        title: title.to_string(),
        description: description.trim().to_string(),
        status: TaskStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

/// Decode the wire cursor: empty means start of the sequence, otherwise a
/// non-negative decimal offset. Anything else is the caller's fault.
fn decode_page_token(token: &str) -> Result<usize, StoreError> {
    if token.is_empty() {
        return Ok(0);
    }
    token
        .parse::<usize>()
        .map_err(|_| StoreError::InvalidArgument("invalid page_token".to_string()))
}

/// Concurrent in-memory task repository.
///
/// All handlers share one instance through `Arc<TaskStore>`; every operation
/// takes `&self` and synchronizes internally. Writers (both create variants,
/// `arm_failure`) take the lock exclusively; readers (`get`, `list`,
/// `count`) share it.
pub struct TaskStore {
    inner: RwLock<StoreInner>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                order: Vec::new(),
                by_id: HashMap::new(),
                fail_next: false,
            }),
        }
    }

    /// Create a task with a server-generated id.
    ///
    /// `title` is required after trimming; `description` is optional and
    /// trimmed. An armed failure injector fires before anything else: the
    /// call consumes the charge and fails `Unavailable` with no mutation.
    pub async fn create(&self, title: &str, description: &str) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.fail_next {
            inner.fail_next = false;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidArgument("title is required".to_string()));
        }
        let task = new_task(Uuid::new_v4().to_string(), title, description);
        Ok(inner.insert(task))
    }

    /// Create a task with a caller-supplied id.
    ///
    /// Fails `AlreadyExists` on an id collision, leaving the store
    /// unchanged. Not subject to the failure injector.
    pub async fn create_with_id(
        &self,
        id: &str,
        title: &str,
        description: &str,
    ) -> Result<Task, StoreError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(StoreError::InvalidArgument("task_id is required".to_string()));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidArgument("title is required".to_string()));
        }
        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(id) {
            return Err(StoreError::AlreadyExists(format!(
                "task with id {id} already exists"
            )));
        }
        let task = new_task(id.to_string(), title, description);
        Ok(inner.insert(task))
    }

    /// Fetch a task by id.
    pub async fn get(&self, id: &str) -> Result<Task, StoreError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(StoreError::InvalidArgument("task_id is required".to_string()));
        }
        let inner = self.inner.read().await;
        match inner.by_id.get(id) {
            Some(&idx) => Ok(inner.order[idx].clone()),
            None => Err(StoreError::NotFound(format!("task not found with id {id}"))),
        }
    }

    /// Return one page of tasks in insertion order plus the next-page token.
    ///
    /// `page_size <= 0` defaults to 10 and anything above 100 is clamped.
    /// An offset at or past the end yields an empty page and an empty token
    /// rather than an error. The length check and the slice happen under one
    /// read-lock hold, so a concurrently appended tail cannot tear the page.
    pub async fn list(
        &self,
        page_size: i64,
        page_token: &str,
    ) -> Result<(Vec<Task>, String), StoreError> {
        let size = if page_size <= 0 {
            DEFAULT_PAGE_SIZE as usize
        } else {
            page_size.min(MAX_PAGE_SIZE) as usize
        };
        let offset = decode_page_token(page_token)?;

        let inner = self.inner.read().await;
        let len = inner.order.len();
        if offset >= len {
            return Ok((Vec::new(), String::new()));
        }
        let end = (offset + size).min(len);
        let tasks = inner.order[offset..end].to_vec();
        let next_token = if end >= len {
            String::new()
        } else {
            end.to_string()
        };
        Ok((tasks, next_token))
    }

    /// Arm the one-shot failure injector: the next `create` call fails
    /// `Unavailable` and disarms it.
    pub async fn arm_failure(&self) {
        self.inner.write().await.fail_next = true;
    }

    /// Number of tasks currently stored.
    pub async fn count(&self) -> usize {
        self.inner.read().await.order.len()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let store = TaskStore::new();
        let created = store.create("buy milk", "tonight").await.unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.status, TaskStatus::Pending);
        assert_eq!(created.created_at, created.updated_at);

        let got = store.get(&created.id).await.unwrap();
        assert_eq!(got, created);
    }

    #[tokio::test]
    async fn create_trims_title_and_description() {
        let store = TaskStore::new();
        let task = store.create("  buy milk  ", "  tonight  ").await.unwrap();
        assert_eq!(task.title, "buy milk");
        assert_eq!(task.description, "tonight");
    }

    #[tokio::test]
    async fn create_rejects_blank_title() {
        let store = TaskStore::new();
        for title in ["", "   "] {
            let err = store.create(title, "").await.unwrap_err();
            assert!(matches!(&err, StoreError::InvalidArgument(_)), "title {title:?}: {err}");
        }
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn create_with_id_rejects_blank_inputs() {
        let store = TaskStore::new();
        let err = store.create_with_id("  ", "Test Task", "").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        let err = store.create_with_id("task-123", "   ", "").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected_and_store_unchanged() {
        let store = TaskStore::new();
        store
            .create_with_id("task-123", "Test Task", "first")
            .await
            .unwrap();

        let err = store
            .create_with_id("task-123", "Another Task", "second")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        assert_eq!(store.count().await, 1);
        let kept = store.get("task-123").await.unwrap();
        assert_eq!(kept.title, "Test Task");
        assert_eq!(kept.description, "first");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = TaskStore::new();
        let err = store.get("does-not-exist").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_blank_id_is_invalid_argument() {
        let store = TaskStore::new();
        for id in ["", "   "] {
            let err = store.get(id).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn pagination_walks_in_creation_order() {
        let store = TaskStore::new();
        let mut ids = Vec::new();
        for i in 1..=5 {
            let task = store.create(&format!("t{i}"), "").await.unwrap();
            ids.push(task.id);
        }

        let (page1, token1) = store.list(2, "").await.unwrap();
        assert_eq!(page1.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&ids[0], &ids[1]]);
        assert_eq!(token1, "2");

        let (page2, token2) = store.list(2, &token1).await.unwrap();
        assert_eq!(page2.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&ids[2], &ids[3]]);
        assert_eq!(token2, "4");

        let (page3, token3) = store.list(2, &token2).await.unwrap();
        assert_eq!(page3.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&ids[4]]);
        assert_eq!(token3, "");
    }

    #[tokio::test]
    async fn page_size_defaults_and_clamps() {
        let store = TaskStore::new();
        for i in 0..101 {
            store.create(&format!("task {i}"), "").await.unwrap();
        }

        // <= 0 defaults to 10
        let (page, token) = store.list(0, "").await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(token, "10");
        let (page, _) = store.list(-3, "").await.unwrap();
        assert_eq!(page.len(), 10);

        // > 100 is clamped to 100
        let (page, token) = store.list(1000, "").await.unwrap();
        assert_eq!(page.len(), 100);
        assert_eq!(token, "100");
    }

    #[tokio::test]
    async fn out_of_range_token_returns_empty_page() {
        let store = TaskStore::new();
        store.create("only", "").await.unwrap();
        let (tasks, token) = store.list(10, "99").await.unwrap();
        assert!(tasks.is_empty());
        assert_eq!(token, "");
    }

    #[tokio::test]
    async fn invalid_tokens_are_rejected() {
        let store = TaskStore::new();
        for token in ["abc", "-1", "1.5"] {
            let err = store.list(10, token).await.unwrap_err();
            assert!(matches!(&err, StoreError::InvalidArgument(_)), "token {token:?}: {err}");
        }
    }

    #[tokio::test]
    async fn injector_fires_once_then_disarms() {
        let store = TaskStore::new();
        store.arm_failure().await;

        let err = store.create("buy milk", "tonight").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.count().await, 0);

        // Disarmed: the very next create succeeds.
        store.create("buy milk", "tonight").await.unwrap();
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn injector_does_not_affect_explicit_id_create() {
        let store = TaskStore::new();
        store.arm_failure().await;

        store.create_with_id("task-1", "Test Task", "").await.unwrap();

        // The charge is still waiting for the next auto-id create.
        let err = store.create("buy milk", "").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn ids_are_unique_across_creates() {
        let store = TaskStore::new();
        let mut seen = HashSet::new();
        for i in 0..50 {
            let task = store.create(&format!("task {i}"), "").await.unwrap();
            assert!(seen.insert(task.id), "duplicate id generated");
        }
    }

    #[tokio::test]
    async fn concurrent_creates_stay_consistent() {
        let store = Arc::new(TaskStore::new());
        let mut handles = Vec::new();
        for w in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store.create(&format!("w{w} t{i}"), "").await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.count().await, 100);

        // Walk every page; both views must agree on membership.
        let mut seen = HashSet::new();
        let mut token = String::new();
        loop {
            let (tasks, next) = store.list(7, &token).await.unwrap();
            for task in tasks {
                assert!(seen.insert(task.id.clone()), "duplicate id in pagination");
                store.get(&task.id).await.unwrap();
            }
            if next.is_empty() {
                break;
            }
            token = next;
        }
        assert_eq!(seen.len(), 100);
    }
}
