use std::sync::Arc;

use ensemble_planner::{CompletionManager, PluginRouter};
use ensemble_plugins::PluginManager;
use ensemble_tasks::TaskService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TaskService>,
    pub plugins: Arc<PluginManager>,
    pub router: Arc<PluginRouter>,
    pub completion: Arc<CompletionManager>,
}
