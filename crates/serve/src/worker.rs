//! Background work for the sidecar
//!
//! - [`FlushWorker`] flushes the log queue on a fixed interval
//! - [`ModelWatcher`] reloads the model when its file changes

use crate::api::AppState;
use crate::health::components;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Flush the log queue once, updating the event log health component.
///
/// The model lock is released while the events are in flight.
pub async fn flush_once(state: &AppState) -> modelfox::Result<usize> {
    let _flushing = state.flush_lock.lock().await;
    let Some(flush) = state.model.lock().await.begin_flush() else {
        state.health.set_healthy(components::EVENT_LOG).await;
        return Ok(0);
    };
    let sent = flush.len();
    let result = flush.send().await;
    let result = state.model.lock().await.finish_flush(flush, result);
    match result {
        Ok(()) => {
            state.health.set_healthy(components::EVENT_LOG).await;
            Ok(sent)
        }
        Err(e) => {
            state
                .health
                .set_degraded(components::EVENT_LOG, e.to_string())
                .await;
            Err(e)
        }
    }
}

/// Periodically flushes the log queue until shut down
pub struct FlushWorker {
    state: AppState,
    interval: Duration,
}

impl FlushWorker {
    pub fn new(state: AppState, interval: Duration) -> Self {
        Self { state, interval }
    }

    /// Run until `shutdown` changes, then flush one last time
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match flush_once(&self.state).await {
                        Ok(0) => debug!("Log queue empty"),
                        Ok(sent) => debug!(sent = sent, "Periodic flush completed"),
                        Err(e) => warn!(error = %e, "Periodic flush failed, will retry"),
                    }
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        match flush_once(&self.state).await {
            Ok(sent) => info!(sent = sent, "Final flush completed"),
            Err(e) => warn!(error = %e, "Final flush failed, queued events are lost"),
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Watches the model file and reloads the model when it changes.
///
/// Dropping the watcher stops watching.
pub struct ModelWatcher {
    _watcher: RecommendedWatcher,
    _task: JoinHandle<()>,
}

impl ModelWatcher {
    pub fn start(state: AppState, model_path: PathBuf) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        // Watch the directory so the file can be replaced atomically
        let watch_dir = model_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;
        info!(path = %model_path.display(), "Watching model file");

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !is_model_change(&event, &model_path) {
                    continue;
                }
                reload(&state, &model_path).await;
            }
            debug!("Model watcher channel closed");
        });

        Ok(Self {
            _watcher: watcher,
            _task: task,
        })
    }
}

fn is_model_change(event: &Event, model_path: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == model_path.file_name())
}

/// Reload the model, keeping the previous one if loading fails
pub async fn reload(state: &AppState, model_path: &Path) {
    let mut model = state.model.lock().await;
    match model.reload_from_path(model_path) {
        Ok(()) => state.health.set_healthy(components::MODEL).await,
        Err(e) => {
            state
                .health
                .set_degraded(components::MODEL, format!("Reload failed: {}", e))
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};

    #[test]
    fn test_is_model_change() {
        let model_path = PathBuf::from("/models/heart_disease.onnx");

        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/models/heart_disease.onnx"));
        assert!(is_model_change(&modify, &model_path));

        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/models/heart_disease.onnx"));
        assert!(is_model_change(&create, &model_path));

        let other_file = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/models/heart_disease.json"));
        assert!(!is_model_change(&other_file, &model_path));

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/models/heart_disease.onnx"));
        assert!(!is_model_change(&access, &model_path));
    }
}
