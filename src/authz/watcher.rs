//! Watch the policy directory and publish a fresh snapshot on every change.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::authz::engine::Resolver;
use crate::authz::errors::AuthzError;
use crate::authz::loader::{is_policy_file, load_snapshot};
use crate::authz::Snapshot;

/// Outcome of the most recent reload attempt.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReloadStatus {
    /// Generation of the snapshot currently served (0: none yet)
    pub generation: u64,
    pub last_attempt: Option<DateTime<Utc>>,
    /// Set when the last attempt was rejected; the previous snapshot stays active
    pub last_error: Option<String>,
}

pub struct ConfigWatcher {
    dir: PathBuf,
    resolver: Arc<Resolver>,
    debounce: Duration,
    status: watch::Sender<ReloadStatus>,
}

impl ConfigWatcher {
    pub fn new(dir: impl Into<PathBuf>, resolver: Arc<Resolver>, debounce: Duration) -> Self {
        let (status, _) = watch::channel(ReloadStatus::default());
        Self {
            dir: dir.into(),
            resolver,
            debounce,
            status,
        }
    }

    pub fn status(&self) -> watch::Receiver<ReloadStatus> {
        self.status.subscribe()
    }

    /// Rebuild the snapshot from disk and publish it. On failure the current
    /// snapshot is left untouched and the error is recorded in the status.
    pub fn reload(&self) -> Result<Arc<Snapshot>, AuthzError> {
        let attempt = Utc::now();
        match load_snapshot(&self.dir) {
            Ok(snapshot) => {
                for warning in &snapshot.warnings {
                    warn!(%warning, "snapshot build warning");
                }
                let published = self.resolver.publish(snapshot);
                self.status.send_replace(ReloadStatus {
                    generation: published.generation,
                    last_attempt: Some(attempt),
                    last_error: None,
                });
                Ok(published)
            }
            Err(e) => {
                error!(dir = %self.dir.display(), "rejected policy reload: {e}");
                self.status.send_modify(|status| {
                    status.last_attempt = Some(attempt);
                    status.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Watch the policy directory until the event stream closes.
    pub async fn run(self) -> Result<(), AuthzError> {
        info!(dir = %self.dir.display(), "starting policy watcher");
        let this = Arc::new(self);
        let (tx, mut rx) = mpsc::channel(64);

        let mut debouncer = new_debouncer(this.debounce, None, move |res: DebounceEventResult| {
            // The receiver only goes away when the watcher shuts down
            let _ = tx.blocking_send(res);
        })
        .map_err(|e| AuthzError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&this.dir, RecursiveMode::NonRecursive)
            .map_err(|e| AuthzError::Watch(e.to_string()))?;

        while let Some(res) = rx.recv().await {
            match res {
                Ok(events) => {
                    let changed: Vec<_> = events
                        .iter()
                        .filter(|event| is_policy_file(&event.path))
                        .collect();
                    if changed.is_empty() {
                        continue;
                    }
                    for event in &changed {
                        info!("change detected in {:?}", event.path);
                    }
                    // File reads and parsing run off the async workers. Reload
                    // errors are already logged and recorded in the status.
                    let watcher = this.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || watcher.reload()).await {
                        error!("policy reload task failed: {e}");
                    }
                }
                Err(e) => warn!("watch error: {:?}", e),
            }
        }

        Ok(())
    }
}
