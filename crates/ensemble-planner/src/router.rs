//! Request-to-plan routing over the live plugin registry.
//!
//! The router owns the full pipeline: snapshot available plugins, run both
//! planner stages, and fold every way the pipeline can come up empty into a
//! failed [`PlanResult`] with a user-facing suggestion.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use ensemble_core::types::{PlanResult, PluginFunctions, PluginRegistration, PluginSelection};
use ensemble_plugins::PluginManager;

use crate::planner::TaskPlanner;

/// Routing view of one available plugin, fed into stage A.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub plugin_name: String,
    pub plugin_id: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl PluginSummary {
    fn from_registration(registration: &PluginRegistration) -> Self {
        Self {
            plugin_name: registration.name(),
            plugin_id: registration.id.clone(),
            description: registration.description(),
            tags: registration.tags(),
        }
    }
}

pub struct PluginRouter {
    plugins: Arc<PluginManager>,
    planner: TaskPlanner,
}

impl PluginRouter {
    pub fn new(plugins: Arc<PluginManager>, planner: TaskPlanner) -> Self {
        Self { plugins, planner }
    }

    /// Run the full pipeline for one user request.
    ///
    /// Never errors: every failure mode (no plugins, selection failed,
    /// nothing selected, empty catalogs, planning failed) becomes a failed
    /// result carrying a suggestion.
    pub async fn analyze_and_plan(&self, user_input: &str) -> PlanResult {
        let available = self.plugins.list_available().await;
        if available.is_empty() {
            return PlanResult::failure(
                user_input,
                "no plugins available",
                "install at least one plugin, then retry",
            );
        }

        let summaries: Vec<PluginSummary> = available
            .iter()
            .map(PluginSummary::from_registration)
            .collect();
        debug!(available = summaries.len(), "running plugin selection");

        let Some(selection) = self.planner.select_plugins(user_input, &summaries).await else {
            return PlanResult::failure(
                user_input,
                "plugin selection failed",
                "retry, or rephrase the request",
            );
        };

        if selection.is_empty() {
            return PlanResult::failure(
                user_input,
                "no relevant plugins for this request",
                "rephrase the request or install a plugin that covers it",
            );
        }

        let catalogs = collect_catalogs(&available, &selection);
        if catalogs.is_empty() {
            return PlanResult::failure(
                user_input,
                "selected plugins expose no callable functions",
                "reload the plugins and retry",
            );
        }

        let Some(plan) = self.planner.plan_execution(user_input, &catalogs).await else {
            return PlanResult::failure(
                user_input,
                "execution planning failed",
                "retry, or rephrase the request",
            );
        };

        if plan.get_ordered_functions().is_empty() {
            return PlanResult::failure(
                user_input,
                "plan has no executable steps",
                "rephrase the request with a concrete action",
            );
        }

        info!(
            steps = plan.execution_order.len(),
            confidence = plan.overall_confidence,
            "plan ready"
        );
        PlanResult::planned(user_input, selection, catalogs, plan)
    }
}

/// Function catalogs of the selected plugins, resolved against the
/// available-plugin snapshot by id first, then by name.
///
/// A selected plugin that resolves to nothing, or resolves to a plugin with
/// no functions, contributes no catalog.
fn collect_catalogs(
    available: &[PluginRegistration],
    selection: &PluginSelection,
) -> Vec<PluginFunctions> {
    let mut catalogs = Vec::new();
    for selected in &selection.selected_plugins {
        let registration = available
            .iter()
            .find(|r| !selected.plugin_id.is_empty() && r.id == selected.plugin_id)
            .or_else(|| {
                available
                    .iter()
                    .find(|r| r.name().eq_ignore_ascii_case(&selected.plugin_name))
            });
        let Some(registration) = registration else {
            debug!(plugin = %selected.plugin_name, "selected plugin not in snapshot, skipped");
            continue;
        };
        let functions: Vec<_> = registration
            .services
            .iter()
            .flat_map(|service| service.functions.iter().cloned())
            .collect();
        if functions.is_empty() {
            continue;
        }
        catalogs.push(PluginFunctions {
            plugin_id: registration.id.clone(),
            plugin_name: registration.name(),
            functions,
        });
    }
    catalogs
}
