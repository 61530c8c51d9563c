//! Restart-on-panic supervision for background loops, with liveness reporting.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerHealth {
    pub name: String,
    pub running: bool,
    pub restarts: u32,
    pub ticks: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub last_panic: Option<String>,
}

impl WorkerHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            running: false,
            restarts: 0,
            ticks: 0,
            last_tick: None,
            last_panic: None,
        }
    }
}

/// Shared view of every supervised worker's health.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    inner: Arc<RwLock<BTreeMap<String, WorkerHealth>>>,
}

impl WorkerRegistry {
    pub fn snapshot(&self) -> Vec<WorkerHealth> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<WorkerHealth> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    pub fn all_running(&self) -> bool {
        self.snapshot().iter().all(|w| w.running)
    }

    fn update(&self, name: &str, f: impl FnOnce(&mut WorkerHealth)) {
        let mut map = self.inner.write().unwrap_or_else(|p| p.into_inner());
        f(map.entry(name.to_string()).or_insert_with(|| WorkerHealth::new(name)));
    }
}

/// Handle a worker uses to report completed ticks.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    name: String,
    registry: WorkerRegistry,
}

impl Heartbeat {
    pub fn beat(&self) {
        self.registry.update(&self.name, |h| {
            h.ticks += 1;
            h.last_tick = Some(Utc::now());
        });
    }
}

/// Sleeps for `duration` unless shutdown is signalled first; returns `false` on shutdown.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    let changed = tokio::select! {
        _ = tokio::time::sleep(duration) => return true,
        changed = shutdown.changed() => changed,
    };
    changed.is_ok() && !*shutdown.borrow()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub struct Supervisor {
    registry: WorkerRegistry,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    restart_delay: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry: WorkerRegistry::default(),
            shutdown_tx,
            handles: Vec::new(),
            restart_delay: Duration::from_secs(1),
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn registry(&self) -> WorkerRegistry {
        self.registry.clone()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Runs the future built by `factory` and rebuilds it whenever it panics.
    ///
    /// A worker that returns normally is not restarted.
    pub fn spawn<F, Fut>(&mut self, name: &str, factory: F)
    where
        F: Fn(Heartbeat, watch::Receiver<bool>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.to_string();
        let registry = self.registry.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        let restart_delay = self.restart_delay;
        registry.update(&name, |_| {});

        let handle = tokio::spawn(async move {
            loop {
                registry.update(&name, |h| h.running = true);
                let heartbeat = Heartbeat {
                    name: name.clone(),
                    registry: registry.clone(),
                };
                let task = tokio::spawn(factory(heartbeat, shutdown.clone()));
                match task.await {
                    Ok(()) => {
                        info!(worker = %name, "worker stopped");
                        break;
                    }
                    Err(err) if err.is_panic() => {
                        let message = panic_message(err.into_panic());
                        error!(worker = %name, panic = %message, "worker panicked; restarting");
                        registry.update(&name, |h| {
                            h.running = false;
                            h.restarts += 1;
                            h.last_panic = Some(message);
                        });
                        if !sleep_or_shutdown(restart_delay, &mut shutdown).await {
                            break;
                        }
                    }
                    Err(err) => {
                        error!(worker = %name, error = %err, "worker cancelled");
                        break;
                    }
                }
            }
            registry.update(&name, |h| h.running = false);
        });
        self.handles.push(handle);
    }

    /// Signals shutdown and waits for every worker to finish its current tick.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "supervisor task failed to join");
            }
        }
    }
}
