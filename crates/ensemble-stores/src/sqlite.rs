//! TaskStore SQLite implementation.
//!
//! Schema is created on connect. Timestamps are stored as RFC 3339 text,
//! JSON columns as serialized text, status as its lowercase label.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use ensemble_core::store::{StoreError, TaskStore};
use ensemble_core::types::{
    SortOrder, StepPatch, Task, TaskPage, TaskPatch, TaskQuery, TaskStatus, TaskStep,
};

/// Durable single-node store backed by SQLite.
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Connect and initialize the schema.
    ///
    /// `database_url` is a sqlx SQLite URL (`sqlite:ensemble.db`,
    /// `sqlite::memory:`). An in-memory database is pinned to a single
    /// connection, otherwise each pooled connection would see its own
    /// empty database.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true);
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        debug!(url = %database_url, "sqlite task store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                user_id TEXT,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                execution_plan TEXT,
                result TEXT,
                error TEXT,
                extra TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                scheduled_at TEXT,
                started_at TEXT,
                finished_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_steps (
                step_id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                plugin_id TEXT NOT NULL,
                plugin_name TEXT NOT NULL,
                function_name TEXT NOT NULL,
                params TEXT NOT NULL,
                execution_order INTEGER NOT NULL,
                status TEXT NOT NULL,
                result TEXT,
                error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_steps_task_id ON task_steps(task_id)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn get_step(&self, step_id: &str) -> Result<Option<TaskStep>, StoreError> {
        let row = sqlx::query("SELECT * FROM task_steps WHERE step_id = ?")
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| step_from_row(&r)).transpose()
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Internal(e.to_string())
}

fn json_to_text(value: &Value) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn opt_json_to_text(value: &Option<Value>) -> Result<Option<String>, StoreError> {
    value.as_ref().map(json_to_text).transpose()
}

fn text_to_json(text: &str) -> Result<Value, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn status_from_row(row: &SqliteRow) -> Result<TaskStatus, StoreError> {
    let label: String = row.try_get("status").map_err(db_err)?;
    TaskStatus::from_str(&label).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn task_from_row(row: &SqliteRow) -> Result<Task, StoreError> {
    let execution_plan: Option<String> = row.try_get("execution_plan").map_err(db_err)?;
    let result: Option<String> = row.try_get("result").map_err(db_err)?;
    let extra: Option<String> = row.try_get("extra").map_err(db_err)?;
    Ok(Task {
        task_id: row.try_get("task_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        status: status_from_row(row)?,
        priority: row.try_get("priority").map_err(db_err)?,
        execution_plan: execution_plan.as_deref().map(text_to_json).transpose()?,
        result: result.as_deref().map(text_to_json).transpose()?,
        error: row.try_get("error").map_err(db_err)?,
        extra: extra.as_deref().map(text_to_json).transpose()?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
        scheduled_at: row.try_get("scheduled_at").map_err(db_err)?,
        started_at: row.try_get("started_at").map_err(db_err)?,
        finished_at: row.try_get("finished_at").map_err(db_err)?,
    })
}

fn step_from_row(row: &SqliteRow) -> Result<TaskStep, StoreError> {
    let params: String = row.try_get("params").map_err(db_err)?;
    let result: Option<String> = row.try_get("result").map_err(db_err)?;
    Ok(TaskStep {
        step_id: row.try_get("step_id").map_err(db_err)?,
        task_id: row.try_get("task_id").map_err(db_err)?,
        plugin_id: row.try_get("plugin_id").map_err(db_err)?,
        plugin_name: row.try_get("plugin_name").map_err(db_err)?,
        function_name: row.try_get("function_name").map_err(db_err)?,
        params: text_to_json(&params)?,
        execution_order: row.try_get("execution_order").map_err(db_err)?,
        status: status_from_row(row)?,
        result: result.as_deref().map(text_to_json).transpose()?,
        error: row.try_get("error").map_err(db_err)?,
        retry_count: row.try_get("retry_count").map_err(db_err)?,
        max_retries: row.try_get("max_retries").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
        started_at: row.try_get("started_at").map_err(db_err)?,
        finished_at: row.try_get("finished_at").map_err(db_err)?,
    })
}

/// Append the query's filter predicate; both the page select and the count
/// run through this so `total` and `items` always agree.
fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, query: &'a TaskQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(task_id) = &query.task_id {
        builder.push(" AND task_id = ").push_bind(task_id.as_str());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(fragment) = &query.description {
        builder
            .push(" AND instr(description, ")
            .push_bind(fragment.as_str())
            .push(") > 0");
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task_with_steps(
        &self,
        task: &Task,
        steps: &[TaskStep],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                task_id, user_id, description, status, priority,
                execution_plan, result, error, extra,
                created_at, updated_at, scheduled_at, started_at, finished_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.user_id)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority)
        .bind(opt_json_to_text(&task.execution_plan)?)
        .bind(opt_json_to_text(&task.result)?)
        .bind(&task.error)
        .bind(opt_json_to_text(&task.extra)?)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.scheduled_at)
        .bind(task.started_at)
        .bind(task.finished_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for step in steps {
            sqlx::query(
                r#"
                INSERT INTO task_steps (
                    step_id, task_id, plugin_id, plugin_name, function_name,
                    params, execution_order, status, result, error,
                    retry_count, max_retries,
                    created_at, updated_at, started_at, finished_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&step.step_id)
            .bind(&step.task_id)
            .bind(&step.plugin_id)
            .bind(&step.plugin_name)
            .bind(&step.function_name)
            .bind(json_to_text(&step.params)?)
            .bind(step.execution_order)
            .bind(step.status.as_str())
            .bind(opt_json_to_text(&step.result)?)
            .bind(&step.error)
            .bind(step.retry_count)
            .bind(step.max_retries)
            .bind(step.created_at)
            .bind(step.updated_at)
            .bind(step.started_at)
            .bind(step.finished_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| task_from_row(&r)).transpose()
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<TaskPage, StoreError> {
        let query = query.normalized();

        let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS n FROM tasks");
        push_filters(&mut count_builder, &query);
        let count_row = count_builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let total: i64 = count_row.try_get("n").map_err(db_err)?;

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM tasks");
        push_filters(&mut builder, &query);
        builder.push(" ORDER BY ");
        for (i, sort) in query.sorts.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            // column names come from the SortField enum, never from input
            builder.push(sort.field.as_str());
            builder.push(match sort.order {
                SortOrder::Asc => " ASC",
                SortOrder::Desc => " DESC",
            });
        }
        builder.push(" LIMIT ").push_bind(i64::from(query.size));
        builder.push(" OFFSET ").push_bind(query.offset() as i64);

        let rows = builder.build().fetch_all(&self.pool).await.map_err(db_err)?;
        let items = rows
            .iter()
            .map(task_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TaskPage {
            total: total as u64,
            page: query.page,
            size: query.size,
            items,
        })
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<(), StoreError> {
        let mut task = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        patch.apply(&mut task);

        sqlx::query(
            r#"
            UPDATE tasks SET
                user_id = ?, description = ?, status = ?, priority = ?,
                execution_plan = ?, result = ?, error = ?, extra = ?,
                updated_at = ?, scheduled_at = ?, started_at = ?, finished_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(&task.user_id)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority)
        .bind(opt_json_to_text(&task.execution_plan)?)
        .bind(opt_json_to_text(&task.result)?)
        .bind(&task.error)
        .bind(opt_json_to_text(&task.extra)?)
        .bind(task.updated_at)
        .bind(task.scheduled_at)
        .bind(task.started_at)
        .bind(task.finished_at)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM task_steps WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let deleted = sqlx::query("DELETE FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn get_steps(&self, task_id: &str) -> Result<Vec<TaskStep>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM task_steps WHERE task_id = ? ORDER BY execution_order ASC")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        rows.iter().map(step_from_row).collect()
    }

    async fn update_step(&self, step_id: &str, patch: StepPatch) -> Result<(), StoreError> {
        let mut step = self
            .get_step(step_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(step_id.to_string()))?;
        patch.apply(&mut step);

        sqlx::query(
            r#"
            UPDATE task_steps SET
                status = ?, result = ?, error = ?, retry_count = ?,
                updated_at = ?, started_at = ?, finished_at = ?
            WHERE step_id = ?
            "#,
        )
        .bind(step.status.as_str())
        .bind(opt_json_to_text(&step.result)?)
        .bind(&step.error)
        .bind(step.retry_count)
        .bind(step.updated_at)
        .bind(step.started_at)
        .bind(step.finished_at)
        .bind(step_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_core::types::{SortField, SortSpec};
    use serde_json::json;

    async fn memory_store() -> SqliteTaskStore {
        SqliteTaskStore::connect("sqlite::memory:").await.unwrap()
    }

    fn task(description: &str, priority: i32) -> Task {
        Task::new(description)
            .with_priority(priority)
            .with_execution_plan(json!({"analysis": "test"}))
    }

    fn step_for(task: &Task, index: i32) -> TaskStep {
        TaskStep::new(
            task.task_id.clone(),
            format!("{}_{index}", task.task_id),
            "plugin-id",
            "camera",
            "take_photo",
            json!({"resolution": "1080p"}),
            index,
        )
    }

    #[test]
    fn test_task_round_trips_with_json_columns() {
        tokio_test::block_on(async {
            let store = memory_store().await;
            let t = task("take a photo", 3).with_extra(json!({"selected_plugins": ["camera"]}));
            store
                .create_task_with_steps(&t, &[step_for(&t, 1)])
                .await
                .unwrap();

            let loaded = store.get_task(&t.task_id).await.unwrap().unwrap();
            assert_eq!(loaded.description, "take a photo");
            assert_eq!(loaded.priority, 3);
            assert_eq!(loaded.status, TaskStatus::Pending);
            assert_eq!(loaded.execution_plan, Some(json!({"analysis": "test"})));
            assert_eq!(loaded.extra, Some(json!({"selected_plugins": ["camera"]})));

            let steps = store.get_steps(&t.task_id).await.unwrap();
            assert_eq!(steps.len(), 1);
            assert_eq!(steps[0].params, json!({"resolution": "1080p"}));
        });
    }

    #[test]
    fn test_create_rolls_back_on_step_conflict() {
        tokio_test::block_on(async {
            let store = memory_store().await;
            let t = task("conflicting", 0);
            // duplicate step id violates the primary key mid-transaction
            let duplicate = vec![step_for(&t, 1), step_for(&t, 1)];

            assert!(store.create_task_with_steps(&t, &duplicate).await.is_err());
            assert!(store.get_task(&t.task_id).await.unwrap().is_none());
            assert!(store.get_steps(&t.task_id).await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_query_filters_sorts_and_pages() {
        tokio_test::block_on(async {
            let store = memory_store().await;
            for (name, priority) in [("photo low", 1), ("photo high", 9), ("email", 5)] {
                store
                    .create_task_with_steps(&task(name, priority), &[])
                    .await
                    .unwrap();
            }

            let page = store
                .query_tasks(
                    &TaskQuery::default()
                        .with_description("photo")
                        .with_sorts(vec![SortSpec::desc(SortField::Priority)]),
                )
                .await
                .unwrap();
            assert_eq!(page.total, 2);
            assert_eq!(page.items[0].description, "photo high");

            let page = store
                .query_tasks(&TaskQuery::default().with_page(2, 2))
                .await
                .unwrap();
            assert_eq!(page.total, 3);
            assert_eq!(page.items.len(), 1);
        });
    }

    #[test]
    fn test_task_patch_persists() {
        tokio_test::block_on(async {
            let store = memory_store().await;
            let t = task("to update", 0);
            store.create_task_with_steps(&t, &[]).await.unwrap();

            store
                .update_task(
                    &t.task_id,
                    TaskPatch::status(TaskStatus::Running).with_started_at(Utc::now()),
                )
                .await
                .unwrap();

            let loaded = store.get_task(&t.task_id).await.unwrap().unwrap();
            assert_eq!(loaded.status, TaskStatus::Running);
            assert!(loaded.started_at.is_some());

            assert!(matches!(
                store
                    .update_task("ghost", TaskPatch::status(TaskStatus::Running))
                    .await,
                Err(StoreError::NotFound(_))
            ));
        });
    }

    #[test]
    fn test_step_patch_persists() {
        tokio_test::block_on(async {
            let store = memory_store().await;
            let t = task("with step", 0);
            let step = step_for(&t, 1);
            store.create_task_with_steps(&t, &[step.clone()]).await.unwrap();

            store
                .update_step(
                    &step.step_id,
                    StepPatch::status(TaskStatus::Success)
                        .with_result(json!({"photo": "img_001.jpg"})),
                )
                .await
                .unwrap();

            let steps = store.get_steps(&t.task_id).await.unwrap();
            assert_eq!(steps[0].status, TaskStatus::Success);
            assert_eq!(steps[0].result, Some(json!({"photo": "img_001.jpg"})));
        });
    }

    #[test]
    fn test_delete_cascades_to_steps() {
        tokio_test::block_on(async {
            let store = memory_store().await;
            let t = task("to delete", 0);
            store
                .create_task_with_steps(&t, &[step_for(&t, 1), step_for(&t, 2)])
                .await
                .unwrap();

            assert!(store.delete_task(&t.task_id).await.unwrap());
            assert!(store.get_task(&t.task_id).await.unwrap().is_none());
            assert!(store.get_steps(&t.task_id).await.unwrap().is_empty());
            assert!(!store.delete_task(&t.task_id).await.unwrap());
        });
    }

    #[test]
    fn test_file_backed_database_survives_reconnect() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let url = format!("sqlite:{}", dir.path().join("tasks.db").display());

            let t = task("durable", 0);
            {
                let store = SqliteTaskStore::connect(&url).await.unwrap();
                store.create_task_with_steps(&t, &[]).await.unwrap();
            }

            let store = SqliteTaskStore::connect(&url).await.unwrap();
            let loaded = store.get_task(&t.task_id).await.unwrap().unwrap();
            assert_eq!(loaded.description, "durable");
        });
    }
}
