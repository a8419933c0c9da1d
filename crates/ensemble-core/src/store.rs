//! Store module
//!
//! Persistence contract for tasks and steps. Implementations live in the
//! ensemble-stores crate; everything here is backend-agnostic.
//!
//! Two guarantees every implementation must uphold:
//! - `create_task_with_steps` is atomic: a failure mid-insert leaves no task
//!   and no step rows visible.
//! - Patches follow the single-writer discipline: load the row, apply the
//!   set fields, persist the whole row.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{StepPatch, Task, TaskPage, TaskPatch, TaskQuery, TaskStep};

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// TaskStore trait - async interface for task and step persistence
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task and all of its steps in one atomic commit.
    async fn create_task_with_steps(
        &self,
        task: &Task,
        steps: &[TaskStep],
    ) -> Result<(), StoreError>;

    /// Load a task by id.
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// Filtered, sorted, paged listing; `total` is computed under the same
    /// filter predicate as the returned page.
    async fn query_tasks(&self, query: &TaskQuery) -> Result<TaskPage, StoreError>;

    /// Apply a field patch to a task. `NotFound` if the id is absent.
    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<(), StoreError>;

    /// Hard-delete a task and its steps. Returns whether a row was removed.
    async fn delete_task(&self, task_id: &str) -> Result<bool, StoreError>;

    /// All steps of a task in execution order.
    async fn get_steps(&self, task_id: &str) -> Result<Vec<TaskStep>, StoreError>;

    /// Apply a field patch to a step. `NotFound` if the id is absent.
    async fn update_step(&self, step_id: &str, patch: StepPatch) -> Result<(), StoreError>;
}
