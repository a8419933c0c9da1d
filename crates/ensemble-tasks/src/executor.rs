//! Step execution against the plugin runtime.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use ensemble_core::types::{StepExecutionResult, TaskStep};
use ensemble_plugins::{PluginCallError, PluginManager};

/// Executes the steps of one task, sequentially and in order.
///
/// A failing step never halts its siblings: every step runs and reports its
/// own outcome, and the scheduler aggregates them afterwards.
pub struct TaskExecutor {
    plugins: Arc<PluginManager>,
}

impl TaskExecutor {
    pub fn new(plugins: Arc<PluginManager>) -> Self {
        Self { plugins }
    }

    /// Run every step, in slice order, collecting one outcome per step.
    pub async fn execute_steps(&self, steps: &[TaskStep]) -> Vec<StepExecutionResult> {
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            results.push(self.execute_step(step).await);
        }
        results
    }

    /// Run one step.
    ///
    /// The plugin is resolved by registry id first; when the id has gone
    /// stale (hot reload of a renamed directory) the stored plugin name is
    /// tried before giving up.
    pub async fn execute_step(&self, step: &TaskStep) -> StepExecutionResult {
        let started_at = Utc::now();
        debug!(
            step_id = %step.step_id,
            function = %step.function_name,
            "executing step"
        );

        let mut outcome = self
            .plugins
            .call(&step.plugin_id, &step.function_name, step.params.clone())
            .await;
        if matches!(outcome, Err(PluginCallError::PluginNotFound(_)))
            && step.plugin_name != step.plugin_id
        {
            debug!(
                step_id = %step.step_id,
                plugin_name = %step.plugin_name,
                "plugin id unresolved, retrying by name"
            );
            outcome = self
                .plugins
                .call(&step.plugin_name, &step.function_name, step.params.clone())
                .await;
        }

        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds();
        match outcome {
            Ok(value) => StepExecutionResult {
                step_id: step.step_id.clone(),
                plugin_id: step.plugin_id.clone(),
                plugin_name: step.plugin_name.clone(),
                function_name: step.function_name.clone(),
                success: true,
                result: Some(value),
                error: None,
                started_at,
                finished_at,
                duration_ms,
            },
            Err(e) => {
                warn!(step_id = %step.step_id, error = %e, "step failed");
                StepExecutionResult {
                    step_id: step.step_id.clone(),
                    plugin_id: step.plugin_id.clone(),
                    plugin_name: step.plugin_name.clone(),
                    function_name: step.function_name.clone(),
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                    started_at,
                    finished_at,
                    duration_ms,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_config::PluginsConfig;
    use serde_json::json;

    const CAMERA_SCRIPT: &str = concat!(
        "read -r line\n",
        "case \"$line\" in\n",
        "  *'\"op\":\"describe\"'*)\n",
        "    printf '{\"services\":[{\"name\":\"camera\",\"config\":{},",
        "\"functions\":[{\"name\":\"take_photo\",\"description\":\"snap\"},",
        "{\"name\":\"record_video\",\"description\":\"film\"}]}]}\\n' ;;\n",
        "  *'\"function\":\"take_photo\"'*)\n",
        "    printf '{\"ok\":{\"file\":\"photo.jpg\"}}\\n' ;;\n",
        "  *'\"function\":\"record_video\"'*)\n",
        "    printf '{\"error\":\"no storage left\"}\\n' ;;\n",
        "  *)\n",
        "    printf '{\"error\":\"unknown function\"}\\n' ;;\n",
        "esac\n",
    );

    fn setup_root() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("camera-sim");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("main.sh"), CAMERA_SCRIPT).unwrap();
        root
    }

    async fn started_manager(root: &std::path::Path) -> Arc<PluginManager> {
        let manager = Arc::new(PluginManager::new(PluginsConfig {
            root: root.to_path_buf(),
            ..PluginsConfig::default()
        }));
        manager.start().await;
        manager
    }

    fn step(plugin_id: &str, function: &str) -> TaskStep {
        TaskStep::new(
            "task-1",
            "task-1_1",
            plugin_id,
            "camera-sim",
            function,
            json!({}),
            1,
        )
    }

    #[test]
    fn test_failed_step_does_not_halt_siblings() {
        tokio_test::block_on(async {
            let root = setup_root();
            let manager = started_manager(root.path()).await;
            let id = manager.list().await.remove(0);
            let executor = TaskExecutor::new(manager.clone());

            let mut failing = step(&id, "record_video");
            failing.step_id = "task-1_1".to_string();
            let mut passing = step(&id, "take_photo");
            passing.step_id = "task-1_2".to_string();
            passing.execution_order = 2;

            let results = executor.execute_steps(&[failing, passing]).await;
            assert_eq!(results.len(), 2);
            assert!(!results[0].success);
            assert!(results[0].error.as_deref().unwrap().contains("no storage left"));
            assert!(results[1].success);
            assert_eq!(results[1].result.as_ref().unwrap()["file"], "photo.jpg");
            assert!(results[1].duration_ms >= 0);
            manager.stop();
        });
    }

    #[test]
    fn test_stale_plugin_id_falls_back_to_name() {
        tokio_test::block_on(async {
            let root = setup_root();
            let manager = started_manager(root.path()).await;
            let executor = TaskExecutor::new(manager.clone());

            let result = executor.execute_step(&step("stale-uuid", "take_photo")).await;
            assert!(result.success);
            manager.stop();
        });
    }

    #[test]
    fn test_unresolvable_plugin_reports_failure() {
        tokio_test::block_on(async {
            let root = setup_root();
            let manager = started_manager(root.path()).await;
            let executor = TaskExecutor::new(manager.clone());

            let mut orphan = step("stale-uuid", "take_photo");
            orphan.plugin_name = "ghost".to_string();
            let result = executor.execute_step(&orphan).await;
            assert!(!result.success);
            assert!(result.error.is_some());
            manager.stop();
        });
    }
}
