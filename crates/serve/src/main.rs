//! ModelFox serve - HTTP sidecar for one model
//!
//! Loads a model through the configured evaluator, serves predictions, and
//! flushes logged events to the app in the background.

use anyhow::{Context, Result};
use modelfox::predictor::evaluator_from_config;
use modelfox::{LoadModelOptions, Model, StructuredLogger};
use modelfox_serve::api::{self, AppState};
use modelfox_serve::config::ServeConfig;
use modelfox_serve::health::{components, HealthRegistry};
use modelfox_serve::worker::{FlushWorker, ModelWatcher};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting modelfox-serve");

    let config = ServeConfig::load()?;
    info!(
        model_path = %config.model_path.display(),
        evaluator = %config.evaluator,
        address = %config.bind_address(),
        "Serve configured"
    );

    let health = HealthRegistry::new();
    health.register(components::MODEL).await;
    health.register(components::EVENT_LOG).await;

    let evaluator = evaluator_from_config(config.evaluator_kind()?, &config.manifest_path())
        .context("Failed to configure evaluator")?;
    let model = Model::from_path(
        evaluator,
        &config.model_path,
        LoadModelOptions {
            modelfox_url: config.modelfox_url.clone(),
            request_timeout: Some(config.request_timeout()),
        },
    )
    .with_context(|| format!("Failed to load model from {}", config.model_path.display()))?;

    let logger = StructuredLogger::new("modelfox-serve");
    logger.log_startup(SERVE_VERSION, &model.id());

    let state = AppState::new(model, health.clone());
    health.set_ready(true).await;

    let _watcher = if config.watch_model {
        Some(ModelWatcher::start(state.clone(), config.model_path.clone())?)
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flush_handle =
        FlushWorker::new(state.clone(), config.flush_interval()).spawn(shutdown_rx);

    let mut server_shutdown = shutdown_tx.subscribe();
    let address = config.bind_address();
    let api_handle = tokio::spawn({
        let state = state.clone();
        async move {
            api::serve(&address, state, async move {
                let _ = server_shutdown.changed().await;
            })
            .await
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    let queued = state.model.lock().await.log_queue().len();
    logger.log_shutdown("SIGINT received", queued);
    let _ = shutdown_tx.send(true);

    if let Err(e) = api_handle.await? {
        warn!(error = %e, "API server exited with an error");
    }
    // The flush worker performs a final flush before returning
    flush_handle.await?;
    info!("Shutdown complete");

    Ok(())
}
