//! Two-stage task planner.
//!
//! Stage A selects plugins from summaries, stage B derives an ordered
//! function plan from their catalogs. Both stages collapse completion or
//! parse failures to `None`; the caller decides what "no plan" means.

use std::sync::Arc;

use tracing::{debug, warn};

use ensemble_core::types::{ExecutionPlan, PluginFunctions, PluginSelection};

use crate::completion::{CompletionManager, CompletionRequest};
use crate::prompt;
use crate::router::PluginSummary;

pub struct TaskPlanner {
    completion: Arc<CompletionManager>,
}

impl TaskPlanner {
    pub fn new(completion: Arc<CompletionManager>) -> Self {
        Self { completion }
    }

    /// Stage A: which plugins are relevant to the request.
    pub async fn select_plugins(
        &self,
        user_input: &str,
        plugins: &[PluginSummary],
    ) -> Option<PluginSelection> {
        let pair = prompt::plugin_selection_prompt(user_input, plugins);
        let request = CompletionRequest::new(pair.system, pair.user);
        let content = match self.completion.complete_with_fallback(&request).await {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "plugin selection completion failed");
                return None;
            }
        };
        match PluginSelection::from_content(&content) {
            Ok(selection) => {
                debug!(
                    selected = selection.selected_plugins.len(),
                    confidence = selection.overall_confidence,
                    "plugin selection parsed"
                );
                Some(selection)
            }
            Err(e) => {
                warn!(error = %e, "plugin selection output did not parse");
                None
            }
        }
    }

    /// Stage B: ordered function plan over the selected plugins' catalogs.
    pub async fn plan_execution(
        &self,
        user_input: &str,
        catalogs: &[PluginFunctions],
    ) -> Option<ExecutionPlan> {
        let pair = prompt::function_matching_prompt(user_input, catalogs);
        let request = CompletionRequest::new(pair.system, pair.user);
        let content = match self.completion.complete_with_fallback(&request).await {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "execution planning completion failed");
                return None;
            }
        };
        match ExecutionPlan::from_content(&content) {
            Ok(plan) => {
                debug!(
                    functions = plan.selected_functions.len(),
                    confidence = plan.overall_confidence,
                    "execution plan parsed"
                );
                Some(plan)
            }
            Err(e) => {
                warn!(error = %e, "execution plan output did not parse");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionClient, CompletionError};
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticClient(String);

    #[async_trait]
    impl CompletionClient for StaticClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            Ok(self.0.clone())
        }
    }

    fn planner_returning(content: String) -> TaskPlanner {
        let manager = CompletionManager::with_clients(
            vec!["stub"],
            vec![("stub", Box::new(StaticClient(content)))],
        );
        TaskPlanner::new(Arc::new(manager))
    }

    #[test]
    fn test_select_plugins_parses_valid_output() {
        let content = json!({
            "analysis": "camera request",
            "selected_plugins": [
                {"plugin_name": "camera-sim", "plugin_id": "id-1", "reason": "photos", "confidence": 0.9}
            ],
            "overall_confidence": 0.9
        })
        .to_string();
        let planner = planner_returning(content);
        let selection =
            tokio_test::block_on(planner.select_plugins("take a photo", &[])).unwrap();
        assert_eq!(selection.selected_plugins.len(), 1);
        assert_eq!(selection.selected_plugins[0].plugin_name, "camera-sim");
    }

    #[test]
    fn test_select_plugins_collapses_schema_mismatch_to_none() {
        // Valid JSON object, but not the selection schema: passes the
        // manager's structural check, fails stage parsing.
        let planner = planner_returning(json!({"unexpected": true}).to_string());
        assert!(tokio_test::block_on(planner.select_plugins("anything", &[])).is_none());
    }

    #[test]
    fn test_plan_execution_parses_valid_output() {
        let content = json!({
            "analysis": "one call",
            "selected_functions": [{
                "plugin_id": "id-1",
                "plugin_name": "camera-sim",
                "function_name": "take_photo",
                "full_method_name": "camera-sim.take_photo",
                "suggested_params": {"resolution": "1080p"}
            }],
            "execution_order": [1],
            "overall_confidence": 0.8
        })
        .to_string();
        let planner = planner_returning(content);
        let plan = tokio_test::block_on(planner.plan_execution("take a photo", &[])).unwrap();
        let ordered = plan.get_ordered_functions();
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].function_name, "take_photo");
    }

    #[test]
    fn test_plan_execution_collapses_failure_to_none() {
        let planner = planner_returning(json!({"analysis": "only"}).to_string());
        assert!(tokio_test::block_on(planner.plan_execution("anything", &[])).is_none());
    }
}
