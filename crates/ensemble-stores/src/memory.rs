//! TaskStore in-memory implementation.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use ensemble_core::store::{StoreError, TaskStore};
use ensemble_core::types::{
    SortField, SortOrder, SortSpec, StepPatch, Task, TaskPage, TaskPatch, TaskQuery, TaskStep,
};

/// In-memory implementation for development and testing.
///
/// Atomicity of `create_task_with_steps` falls out of holding both write
/// locks across the whole insert.
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    /// Steps keyed by step id; ordering is recovered from `execution_order`.
    steps: RwLock<HashMap<String, TaskStep>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            steps: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(task: &Task, query: &TaskQuery) -> bool {
    if let Some(task_id) = &query.task_id {
        if &task.task_id != task_id {
            return false;
        }
    }
    if let Some(status) = query.status {
        if task.status != status {
            return false;
        }
    }
    if let Some(fragment) = &query.description {
        if !task.description.contains(fragment.as_str()) {
            return false;
        }
    }
    true
}

fn compare(a: &Task, b: &Task, sorts: &[SortSpec]) -> Ordering {
    for sort in sorts {
        let ordering = match sort.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Priority => a.priority.cmp(&b.priority),
            SortField::TaskId => a.task_id.cmp(&b.task_id),
            SortField::Description => a.description.cmp(&b.description),
        };
        let ordering = match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task_with_steps(
        &self,
        task: &Task,
        steps: &[TaskStep],
    ) -> Result<(), StoreError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut all_steps = self
            .steps
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        tasks.insert(task.task_id.clone(), task.clone());
        for step in steps {
            all_steps.insert(step.step_id.clone(), step.clone());
        }
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let tasks = self
            .tasks
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(tasks.get(task_id).cloned())
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<TaskPage, StoreError> {
        let query = query.normalized();
        let tasks = self
            .tasks
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut filtered: Vec<Task> = tasks.values().filter(|t| matches(t, &query)).cloned().collect();
        filtered.sort_by(|a, b| compare(a, b, &query.sorts));

        let total = filtered.len() as u64;
        let items = filtered
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.size as usize)
            .collect();
        Ok(TaskPage {
            total,
            page: query.page,
            size: query.size,
            items,
        })
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<(), StoreError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        match tasks.get_mut(task_id) {
            Some(task) => {
                patch.apply(task);
                Ok(())
            }
            None => Err(StoreError::NotFound(task_id.to_string())),
        }
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let removed = tasks.remove(task_id).is_some();
        if removed {
            let mut steps = self
                .steps
                .write()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            steps.retain(|_, step| step.task_id != task_id);
        }
        Ok(removed)
    }

    async fn get_steps(&self, task_id: &str) -> Result<Vec<TaskStep>, StoreError> {
        let steps = self
            .steps
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut found: Vec<TaskStep> = steps
            .values()
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.execution_order);
        Ok(found)
    }

    async fn update_step(&self, step_id: &str, patch: StepPatch) -> Result<(), StoreError> {
        let mut steps = self
            .steps
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        match steps.get_mut(step_id) {
            Some(step) => {
                patch.apply(step);
                Ok(())
            }
            None => Err(StoreError::NotFound(step_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_core::types::TaskStatus;
    use serde_json::json;

    fn task(description: &str, priority: i32) -> Task {
        Task::new(description).with_priority(priority)
    }

    fn step_for(task: &Task, index: i32) -> TaskStep {
        TaskStep::new(
            task.task_id.clone(),
            format!("{}_{index}", task.task_id),
            "plugin-id",
            "camera",
            "take_photo",
            json!({}),
            index,
        )
    }

    #[test]
    fn test_create_and_load_task_with_steps() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let t = task("take a photo", 0);
            let steps = vec![step_for(&t, 1), step_for(&t, 2)];
            store.create_task_with_steps(&t, &steps).await.unwrap();

            let loaded = store.get_task(&t.task_id).await.unwrap().unwrap();
            assert_eq!(loaded.description, "take a photo");

            let loaded_steps = store.get_steps(&t.task_id).await.unwrap();
            assert_eq!(loaded_steps.len(), 2);
            assert_eq!(loaded_steps[0].execution_order, 1);
            assert_eq!(loaded_steps[1].execution_order, 2);
        });
    }

    #[test]
    fn test_query_pages_past_the_end_are_short() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            for i in 0..15 {
                store
                    .create_task_with_steps(&task(&format!("task {i}"), 0), &[])
                    .await
                    .unwrap();
            }

            let page = store
                .query_tasks(&TaskQuery::default().with_page(2, 10))
                .await
                .unwrap();
            assert_eq!(page.total, 15);
            assert_eq!(page.items.len(), 5);

            let page = store
                .query_tasks(&TaskQuery::default().with_page(3, 10))
                .await
                .unwrap();
            assert_eq!(page.total, 15);
            assert!(page.items.is_empty());
        });
    }

    #[test]
    fn test_query_filters_by_status_and_description() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let done = task("photo archive", 0);
            store.create_task_with_steps(&done, &[]).await.unwrap();
            store
                .update_task(&done.task_id, TaskPatch::status(TaskStatus::Success))
                .await
                .unwrap();
            store
                .create_task_with_steps(&task("photo capture", 0), &[])
                .await
                .unwrap();
            store
                .create_task_with_steps(&task("send email", 0), &[])
                .await
                .unwrap();

            let page = store
                .query_tasks(&TaskQuery::default().with_status(TaskStatus::Pending))
                .await
                .unwrap();
            assert_eq!(page.total, 2);

            let page = store
                .query_tasks(&TaskQuery::default().with_description("photo"))
                .await
                .unwrap();
            assert_eq!(page.total, 2);

            let page = store
                .query_tasks(
                    &TaskQuery::default()
                        .with_status(TaskStatus::Pending)
                        .with_description("photo"),
                )
                .await
                .unwrap();
            assert_eq!(page.total, 1);
            assert_eq!(page.items[0].description, "photo capture");
        });
    }

    #[test]
    fn test_query_sorts_by_priority() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            for (name, priority) in [("low", 1), ("high", 9), ("mid", 5)] {
                store
                    .create_task_with_steps(&task(name, priority), &[])
                    .await
                    .unwrap();
            }

            let page = store
                .query_tasks(&TaskQuery::default().with_sorts(vec![SortSpec::desc(
                    SortField::Priority,
                )]))
                .await
                .unwrap();
            let names: Vec<&str> = page.items.iter().map(|t| t.description.as_str()).collect();
            assert_eq!(names, vec!["high", "mid", "low"]);
        });
    }

    #[test]
    fn test_update_missing_rows_is_not_found() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            assert!(matches!(
                store
                    .update_task("ghost", TaskPatch::status(TaskStatus::Running))
                    .await,
                Err(StoreError::NotFound(_))
            ));
            assert!(matches!(
                store
                    .update_step("ghost_1", StepPatch::status(TaskStatus::Running))
                    .await,
                Err(StoreError::NotFound(_))
            ));
        });
    }

    #[test]
    fn test_delete_removes_task_and_steps() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let t = task("to be deleted", 0);
            store
                .create_task_with_steps(&t, &[step_for(&t, 1)])
                .await
                .unwrap();

            assert!(store.delete_task(&t.task_id).await.unwrap());
            assert!(store.get_task(&t.task_id).await.unwrap().is_none());
            assert!(store.get_steps(&t.task_id).await.unwrap().is_empty());

            // second delete is a no-op
            assert!(!store.delete_task(&t.task_id).await.unwrap());
        });
    }
}
