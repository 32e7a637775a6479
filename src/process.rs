//! Shared periodic-work runner.
//!
//! Long-lived components register a [`Module`] and get their `process()`
//! callback invoked on a fixed cadence from a single background task, so the
//! call owns exactly one scheduler instead of one timer per component.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

/// Periodic work callback registered with the runner
pub trait Module: Send + Sync {
    /// Invoked on every runner tick
    fn process(&self);
}

/// Background runner that drives registered modules on an interval.
///
/// Modules may be registered and deregistered while the runner is live;
/// the tick task picks up changes on its next pass.
pub struct ProcessRunner {
    /// Registered modules, shared with the tick task
    modules: Arc<Mutex<Vec<Arc<dyn Module>>>>,

    /// Tick interval
    interval: Duration,

    /// Tick task handle
    task: Option<JoinHandle<()>>,
}

impl ProcessRunner {
    /// Default tick cadence
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

    /// Create a runner with the default tick interval
    pub fn new() -> Self {
        Self::with_interval(Self::DEFAULT_INTERVAL)
    }

    /// Create a runner with a custom tick interval
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            modules: Arc::new(Mutex::new(Vec::new())),
            interval,
            task: None,
        }
    }

    /// Register a module for periodic processing
    pub fn register_module(&self, module: Arc<dyn Module>) {
        if let Ok(mut modules) = self.modules.lock() {
            modules.push(module);
        }
    }

    /// Remove a previously registered module
    pub fn deregister_module(&self, module: &Arc<dyn Module>) {
        if let Ok(mut modules) = self.modules.lock() {
            modules.retain(|m| !Arc::ptr_eq(m, module));
        }
    }

    /// Start the tick task. Starting twice is a no-op.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let modules = self.modules.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot: Vec<Arc<dyn Module>> = match modules.lock() {
                    Ok(modules) => modules.clone(),
                    Err(_) => break,
                };
                for module in snapshot {
                    module.process();
                }
            }
        });
        self.task = Some(handle);
        debug!("Started process runner");
    }

    /// Stop the tick task
    pub fn stop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
            debug!("Stopped process runner");
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
