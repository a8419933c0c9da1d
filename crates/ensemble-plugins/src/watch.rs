//! Plugins-root file watcher: re-discovers plugins when the root changes.

use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, info};

use crate::manager::PluginManager;

/// Start watching the plugins root, reloading the manager on changes.
///
/// The returned guard keeps the watcher alive; dropping it stops watching.
pub fn start_watching(
    manager: &Arc<PluginManager>,
) -> Result<PluginRootWatcher, notify::Error> {
    let root = manager.root().to_path_buf();
    let manager = Arc::clone(manager);
    let handle = tokio::runtime::Handle::current();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        let manager = Arc::clone(&manager);
                        handle.spawn(async move {
                            let count = manager.reload().await;
                            info!(plugins = count, "plugins root changed, reloaded");
                        });
                    }
                }
                Err(e) => error!(error = %e, "plugins root watch error"),
            }
        })?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    Ok(PluginRootWatcher { _watcher: watcher })
}

/// Keeps the plugins-root file watcher alive.
pub struct PluginRootWatcher {
    _watcher: RecommendedWatcher,
}
