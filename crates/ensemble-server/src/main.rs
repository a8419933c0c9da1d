//! Ensemble server binary: config, wiring and the axum surface.

mod dto;
mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ensemble_config::{load_config, EnsembleConfig};
use ensemble_core::store::TaskStore;
use ensemble_planner::{CompletionManager, PluginRouter, TaskPlanner};
use ensemble_plugins::{start_watching, PluginManager};
use ensemble_stores::{InMemoryTaskStore, SqliteTaskStore};
use ensemble_tasks::{TaskExecutor, TaskScheduler, TaskService};

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "ensemble-server")]
struct Args {
    #[arg(long, default_value = "config/ensemble.yaml")]
    config: PathBuf,
    /// Overrides `server.host` from the config file.
    #[arg(long)]
    host: Option<String>,
    /// Overrides `server.port` from the config file.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, config_missing) = if args.config.exists() {
        let config = load_config(&args.config)
            .with_context(|| format!("load config {}", args.config.display()))?;
        (config, false)
    } else {
        (EnsembleConfig::default(), true)
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if config_missing {
        warn!(path = %args.config.display(), "config file not found, using defaults");
    }

    let store: Arc<dyn TaskStore> = match config.store.backend.as_str() {
        "sqlite" => {
            // validated at load time: sqlite requires a connection URL
            let url = config
                .store
                .connection_url
                .as_deref()
                .context("store.connection_url missing for sqlite backend")?;
            Arc::new(SqliteTaskStore::connect(url).await?)
        }
        _ => Arc::new(InMemoryTaskStore::new()),
    };
    info!(backend = %config.store.backend, "task store ready");

    let plugins = Arc::new(PluginManager::new(config.plugins.clone()));
    plugins.start().await;
    let _plugin_watcher = if config.plugins.watch {
        Some(start_watching(&plugins).context("watch plugins root")?)
    } else {
        None
    };

    let completion = Arc::new(CompletionManager::from_config(&config.providers));
    if !completion.has_providers() {
        warn!("no completion providers configured, task creation will fail until one is added");
    }
    let router = Arc::new(PluginRouter::new(
        plugins.clone(),
        TaskPlanner::new(completion.clone()),
    ));
    let service = Arc::new(TaskService::new(store.clone()));

    let scheduler = Arc::new(TaskScheduler::new(
        store.clone(),
        TaskExecutor::new(plugins.clone()),
        config.scheduler.clone(),
    ));
    let scheduler_task = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run().await }
    });

    let state = AppState {
        service,
        plugins: plugins.clone(),
        router,
        completion,
    };
    let app = routes::app(state);

    let host = args.host.unwrap_or(config.server.host);
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "ensemble-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated with error")?;

    scheduler.stop();
    plugins.stop();
    let _ = scheduler_task.await;
    info!("ensemble-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
