//! Task service: plan materialization and store-facing task operations.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use ensemble_core::store::{StoreError, TaskStore};
use ensemble_core::types::{
    PlanResult, StepPatch, Task, TaskPage, TaskPatch, TaskQuery, TaskStep,
};
use ensemble_planner::PluginRouter;

/// Outcome of a create-task request.
#[derive(Debug, Clone, Serialize)]
pub struct TaskCreation {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub step_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The full planner outcome, returned to the caller and then discarded.
    pub plan_result: PlanResult,
}

/// A task together with its ordered steps.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task: Task,
    pub steps: Vec<TaskStep>,
}

/// Store-facing task operations plus plan materialization.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Plan a free-text request and persist the resulting task.
    ///
    /// Planning failure is a normal outcome: nothing is persisted and the
    /// failed plan result (with its suggestion) is handed back.
    pub async fn create_task_from_input(
        &self,
        input: &str,
        router: &PluginRouter,
        user_id: Option<String>,
    ) -> Result<TaskCreation, StoreError> {
        let plan_result = router.analyze_and_plan(input).await;
        self.create_task_from_plan(input, plan_result, user_id).await
    }

    /// Materialize an already-computed plan into a persisted task.
    ///
    /// Step ids are `{task_id}_{1-based index}` in execution order; each
    /// step's params are the plan's suggested params for that invocation.
    pub async fn create_task_from_plan(
        &self,
        input: &str,
        plan_result: PlanResult,
        user_id: Option<String>,
    ) -> Result<TaskCreation, StoreError> {
        if !plan_result.success {
            warn!(
                error = plan_result.error.as_deref().unwrap_or("unknown"),
                "planning failed, no task created"
            );
            return Ok(TaskCreation {
                success: false,
                task_id: None,
                step_count: 0,
                error: plan_result.error.clone(),
                plan_result,
            });
        }

        let mut task = Task::new(input);
        if let Some(user_id) = user_id {
            task = task.with_user_id(user_id);
        }
        if let Some(plan) = &plan_result.plan {
            task = task.with_execution_plan(
                serde_json::to_value(plan)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            );
        }
        if let Some(selection) = &plan_result.selection {
            task = task.with_extra(json!({
                "selected_plugins": selection.selected_plugins,
            }));
        }

        let ordered = plan_result.ordered_functions();
        let steps: Vec<TaskStep> = ordered
            .iter()
            .enumerate()
            .map(|(i, function)| {
                TaskStep::new(
                    task.task_id.clone(),
                    format!("{}_{}", task.task_id, i + 1),
                    function.plugin_id.clone(),
                    function.plugin_name.clone(),
                    function.function_name.clone(),
                    serde_json::Value::Object(function.suggested_params.clone()),
                    (i + 1) as i32,
                )
            })
            .collect();

        self.store.create_task_with_steps(&task, &steps).await?;
        info!(
            task_id = %task.task_id,
            steps = steps.len(),
            "task created"
        );
        Ok(TaskCreation {
            success: true,
            task_id: Some(task.task_id),
            step_count: steps.len(),
            error: None,
            plan_result,
        })
    }

    /// Filtered, sorted, paged task listing.
    pub async fn query_tasks(&self, query: &TaskQuery) -> Result<TaskPage, StoreError> {
        self.store.query_tasks(query).await
    }

    /// A task with its ordered steps, or `None` when the id is unknown.
    pub async fn get_task_detail(&self, task_id: &str) -> Result<Option<TaskDetail>, StoreError> {
        let Some(task) = self.store.get_task(task_id).await? else {
            return Ok(None);
        };
        let steps = self.store.get_steps(task_id).await?;
        Ok(Some(TaskDetail { task, steps }))
    }

    /// Hard-delete a task and its steps. Returns whether it existed.
    pub async fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        self.store.delete_task(task_id).await
    }

    /// Apply a field patch to a task.
    pub async fn update_task_fields(
        &self,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<(), StoreError> {
        self.store.update_task(task_id, patch).await
    }

    /// Apply a field patch to a step.
    pub async fn update_step_fields(
        &self,
        step_id: &str,
        patch: StepPatch,
    ) -> Result<(), StoreError> {
        self.store.update_step(step_id, patch).await
    }
}
