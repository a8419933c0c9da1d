//! Task and TaskStep entity definitions
//!
//! A Task is materialized once from a plan, owns an ordered collection of
//! steps, and is only mutated afterwards through field patches applied by
//! the store (load, apply, persist the whole row).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TaskStatus;

/// Type alias for Task ID
pub type TaskId = String;

/// Task - a persisted unit of work materialized from an execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task
    pub task_id: TaskId,
    /// Identifier of the requesting user, if any
    #[serde(default)]
    pub user_id: Option<String>,
    /// The free-text request this task was planned from
    pub description: String,
    /// Current status
    pub status: TaskStatus,
    /// Scheduling priority; higher runs first
    #[serde(default)]
    pub priority: i32,
    /// Serialized planner output this task was materialized from
    #[serde(default)]
    pub execution_plan: Option<Value>,
    /// Aggregated, ordered per-step outcomes (set on completion)
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure message, if the task terminated unsuccessfully
    #[serde(default)]
    pub error: Option<String>,
    /// Arbitrary side-channel metadata (e.g. the stage-A selection)
    #[serde(default)]
    pub extra: Option<Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Reserved: accepted-for-future-window timestamp
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Set when a scheduler pass claims the task
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the task reaches a terminal status
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task from a user request.
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            description: description.into(),
            status: TaskStatus::Pending,
            priority: 0,
            execution_plan: None,
            result: None,
            error: None,
            extra: None,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Attach the requesting user.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the scheduling priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attach the serialized planner output.
    pub fn with_execution_plan(mut self, plan: Value) -> Self {
        self.execution_plan = Some(plan);
        self
    }

    /// Attach side-channel metadata.
    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// TaskStep - one planned invocation of a single plugin function
///
/// Steps are created once, in plan order, at task-creation time; their order
/// is never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    /// Step identifier: `{task_id}_{1-based index}`
    pub step_id: String,
    /// Owning task
    pub task_id: TaskId,
    /// Registry id of the plugin to invoke
    pub plugin_id: String,
    /// Plugin name, used as a fallback lookup after hot reloads
    pub plugin_name: String,
    /// Function to invoke on the plugin
    pub function_name: String,
    /// Keyword arguments for the invocation
    pub params: Value,
    /// 1-based position within the task
    pub execution_order: i32,
    /// Current status
    pub status: TaskStatus,
    /// Invocation result value (set on completion)
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure message, if the invocation failed
    #[serde(default)]
    pub error: Option<String>,
    /// Re-attempt bookkeeping (data-model hook, not driven by the executor)
    #[serde(default)]
    pub retry_count: i32,
    #[serde(default)]
    pub max_retries: i32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskStep {
    /// Create a new pending step.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: impl Into<String>,
        step_id: impl Into<String>,
        plugin_id: impl Into<String>,
        plugin_name: impl Into<String>,
        function_name: impl Into<String>,
        params: Value,
        execution_order: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            step_id: step_id.into(),
            task_id: task_id.into(),
            plugin_id: plugin_id.into(),
            plugin_name: plugin_name.into(),
            function_name: function_name.into(),
            params,
            execution_order,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Field patch for a task: the only sanctioned post-creation mutation path.
///
/// `None` fields are left untouched; the store loads the row, applies the
/// set fields, refreshes `updated_at` and persists the whole row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub extra: Option<Value>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    /// Patch that only moves the status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }

    /// Apply the set fields to a task and refresh its update timestamp.
    pub fn apply(self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(result) = self.result {
            task.result = Some(result);
        }
        if let Some(error) = self.error {
            task.error = Some(error);
        }
        if let Some(extra) = self.extra {
            task.extra = Some(extra);
        }
        if let Some(at) = self.scheduled_at {
            task.scheduled_at = Some(at);
        }
        if let Some(at) = self.started_at {
            task.started_at = Some(at);
        }
        if let Some(at) = self.finished_at {
            task.finished_at = Some(at);
        }
        task.updated_at = Utc::now();
    }
}

/// Field patch for a step, mirroring [`TaskPatch`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepPatch {
    pub status: Option<TaskStatus>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub retry_count: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepPatch {
    /// Patch that only moves the status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }

    /// Apply the set fields to a step and refresh its update timestamp.
    pub fn apply(self, step: &mut TaskStep) {
        if let Some(status) = self.status {
            step.status = status;
        }
        if let Some(result) = self.result {
            step.result = Some(result);
        }
        if let Some(error) = self.error {
            step.error = Some(error);
        }
        if let Some(retry_count) = self.retry_count {
            step.retry_count = retry_count;
        }
        if let Some(at) = self.started_at {
            step.started_at = Some(at);
        }
        if let Some(at) = self.finished_at {
            step.finished_at = Some(at);
        }
        step.updated_at = Utc::now();
    }
}

/// Outcome of executing one step, produced by the executor and rolled into
/// the task's aggregated result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub step_id: String,
    pub plugin_id: String,
    pub plugin_name: String,
    pub function_name: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl StepExecutionResult {
    /// Terminal step status implied by this outcome.
    pub fn status(&self) -> TaskStatus {
        if self.success {
            TaskStatus::Success
        } else {
            TaskStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new("take a photo").with_priority(3);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, 3);
        assert!(task.started_at.is_none());
        assert!(task.result.is_none());
        assert_eq!(task.created_at, task.updated_at);
        assert!(!task.task_id.is_empty());
    }

    #[test]
    fn test_task_patch_applies_only_set_fields() {
        let mut task = Task::new("inspect").with_priority(7);
        let before = task.updated_at;

        TaskPatch::status(TaskStatus::Running)
            .with_started_at(Utc::now())
            .apply(&mut task);

        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.priority, 7);
        assert!(task.started_at.is_some());
        assert!(task.finished_at.is_none());
        assert!(task.updated_at >= before);
    }

    #[test]
    fn test_step_patch_records_outcome() {
        let mut step = TaskStep::new(
            "task-1",
            "task-1_1",
            "plugin-id",
            "camera",
            "take_photo",
            json!({"resolution": "4k"}),
            1,
        );
        assert_eq!(step.status, TaskStatus::Pending);
        assert_eq!(step.retry_count, 0);

        StepPatch::status(TaskStatus::Failed)
            .with_error("lens cap on")
            .with_finished_at(Utc::now())
            .apply(&mut step);

        assert_eq!(step.status, TaskStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("lens cap on"));
        assert!(step.finished_at.is_some());
    }

    #[test]
    fn test_step_execution_result_status() {
        let now = Utc::now();
        let outcome = StepExecutionResult {
            step_id: "t_1".to_string(),
            plugin_id: "p".to_string(),
            plugin_name: "camera".to_string(),
            function_name: "take_photo".to_string(),
            success: false,
            result: None,
            error: Some("boom".to_string()),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        };
        assert_eq!(outcome.status(), TaskStatus::Failed);
    }
}
