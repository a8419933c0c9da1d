//! Periodic scheduler: claims pending tasks and drives them to a terminal
//! status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ensemble_config::SchedulerConfig;
use ensemble_core::store::{StoreError, TaskStore};
use ensemble_core::types::{
    SortField, SortSpec, StepPatch, Task, TaskPatch, TaskQuery, TaskStatus,
};

use crate::executor::TaskExecutor;

/// Lazy pager over pending tasks, highest priority first, oldest first
/// within a priority.
///
/// Pages are fetched on demand; tasks processed by the current pass leave
/// the pending set, so anything the shifting window skips is picked up by
/// the next tick.
struct PendingTaskPager {
    page: u32,
    size: u32,
    exhausted: bool,
}

impl PendingTaskPager {
    fn new(size: u32) -> Self {
        Self {
            page: 1,
            size,
            exhausted: false,
        }
    }

    async fn next_batch(&mut self, store: &dyn TaskStore) -> Result<Vec<Task>, StoreError> {
        if self.exhausted {
            return Ok(Vec::new());
        }
        let query = TaskQuery::default()
            .with_status(TaskStatus::Pending)
            .with_page(self.page, self.size)
            .with_sorts(vec![
                SortSpec::desc(SortField::Priority),
                SortSpec::asc(SortField::CreatedAt),
            ]);
        let page = store.query_tasks(&query).await?;
        if page.items.len() < self.size as usize {
            self.exhausted = true;
        }
        self.page += 1;
        Ok(page.items)
    }
}

/// Claims pending tasks on a fixed interval and executes them.
///
/// Claiming a task is persisting `running` plus `started_at`; only claimed
/// tasks are executed, so a crash between claim and completion leaves an
/// inspectable `running` row rather than a silent re-run.
pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    executor: TaskExecutor,
    config: SchedulerConfig,
    shutdown: CancellationToken,
}

impl TaskScheduler {
    pub fn new(store: Arc<dyn TaskStore>, executor: TaskExecutor, config: SchedulerConfig) -> Self {
        Self {
            store,
            executor,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Run scheduler passes until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        info!(
            interval_secs = self.config.interval_secs,
            page_size = self.config.page_size,
            "task scheduler started"
        );
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("task scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// One scheduler pass over the pending set.
    pub async fn run_once(&self) {
        let mut pager = PendingTaskPager::new(self.config.page_size);
        loop {
            let batch = match pager.next_batch(self.store.as_ref()).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "pending task query failed, pass aborted");
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }
            debug!(tasks = batch.len(), "processing pending batch");
            for task in &batch {
                if let Err(e) = self.process_task(task).await {
                    warn!(task_id = %task.task_id, error = %e, "task processing failed");
                }
            }
        }
    }

    /// Claim and execute one task.
    async fn process_task(&self, task: &Task) -> Result<(), StoreError> {
        self.store
            .update_task(
                &task.task_id,
                TaskPatch::status(TaskStatus::Running).with_started_at(Utc::now()),
            )
            .await?;

        let steps = self.store.get_steps(&task.task_id).await?;
        if steps.is_empty() {
            // nothing to execute counts as success
            self.store
                .update_task(
                    &task.task_id,
                    TaskPatch::status(TaskStatus::Success)
                        .with_result(serde_json::json!([]))
                        .with_finished_at(Utc::now()),
                )
                .await?;
            info!(task_id = %task.task_id, "task with no steps completed");
            return Ok(());
        }

        let results = self.executor.execute_steps(&steps).await;
        for result in &results {
            let mut patch = StepPatch::status(result.status())
                .with_started_at(result.started_at)
                .with_finished_at(result.finished_at);
            if let Some(value) = &result.result {
                patch = patch.with_result(value.clone());
            }
            if let Some(error) = &result.error {
                patch = patch.with_error(error.clone());
            }
            if let Err(e) = self.store.update_step(&result.step_id, patch).await {
                warn!(step_id = %result.step_id, error = %e, "step outcome not persisted");
            }
        }

        let failed = results.iter().filter(|r| !r.success).count();
        let status = if failed == 0 {
            TaskStatus::Success
        } else {
            TaskStatus::Failed
        };
        let aggregated = serde_json::to_value(&results)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut patch = TaskPatch::status(status)
            .with_result(aggregated)
            .with_finished_at(Utc::now());
        if failed > 0 {
            patch = patch.with_error(format!("{failed} of {} steps failed", results.len()));
        }
        self.store.update_task(&task.task_id, patch).await?;
        info!(
            task_id = %task.task_id,
            status = %status,
            steps = results.len(),
            failed,
            "task finished"
        );
        Ok(())
    }
}
