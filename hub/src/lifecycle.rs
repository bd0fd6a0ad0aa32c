//! Lifecycle coordination: ordered startup, graceful shutdown, call draining.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{info, warn};

/// In-flight calls get this long to finish once shutdown starts.
pub const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Coarse service phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Created,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecyclePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecyclePhase::Created,
            1 => LifecyclePhase::Initializing,
            2 => LifecyclePhase::Running,
            3 => LifecyclePhase::ShuttingDown,
            _ => LifecyclePhase::Stopped,
        }
    }
}

/// Phase tracking plus the coalescing shutdown flag.
///
/// Concurrent shutdown invocations serialize on the async mutex; the first
/// performs the steps and stores the collected step errors, later callers
/// observe the same stored outcome.
pub struct LifecycleCoordinator {
    phase: AtomicU8,
    shutdown_outcome: tokio::sync::Mutex<Option<Vec<String>>>,
}

impl LifecycleCoordinator {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(LifecyclePhase::Created as u8),
            shutdown_outcome: tokio::sync::Mutex::new(None),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        LifecyclePhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn set_phase(&self, phase: LifecyclePhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.phase() == LifecyclePhase::Running
    }

    /// Run the shutdown steps exactly once; every caller receives the same
    /// collected error list (empty = clean shutdown).
    pub async fn shutdown_once<F, Fut>(&self, steps: F) -> Vec<String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Vec<String>>,
    {
        let mut outcome = self.shutdown_outcome.lock().await;
        if let Some(errors) = outcome.as_ref() {
            return errors.clone();
        }
        self.set_phase(LifecyclePhase::ShuttingDown);
        let errors = steps().await;
        self.set_phase(LifecyclePhase::Stopped);
        if errors.is_empty() {
            info!("shutdown complete");
        } else {
            warn!(errors = ?errors, "shutdown completed with errors");
        }
        *outcome = Some(errors.clone());
        errors
    }
}

impl Default for LifecycleCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts in-flight calls so shutdown can drain them.
pub struct InFlightTracker {
    count: AtomicU64,
    idle: Notify,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            idle: Notify::new(),
        }
    }

    pub fn start(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { tracker: self }
    }

    pub fn active(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no calls are in flight or the deadline passes.
    /// Returns true when fully drained.
    pub async fn wait_idle(&self, deadline: Duration) -> bool {
        let drained = tokio::time::timeout(deadline, async {
            loop {
                // Register interest before checking the count so a guard
                // dropped in between cannot be missed.
                let notified = self.idle.notified();
                if self.count.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await;
        drained.is_ok()
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InFlightGuard<'a> {
    tracker: &'a InFlightTracker,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}
