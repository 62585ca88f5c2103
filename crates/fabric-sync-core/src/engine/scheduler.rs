// # Periodic Scheduler
//
// Background loop that repairs drift between the intent store and the fabric.
//
// ## Lifecycle
//
// ```text
// Stopped ──start()──▶ Running ──stop(graceful)──▶ (finishes sleep) ──▶ Stopped
//                         │
//                         └────stop(forced)──▶ aborted ──▶ Stopped
// ```
//
// A panic inside a pass is caught and logged like any other failure. Passes
// run inside the loop task, so a forced stop drops the pass in flight along
// with its lock guard. The loop itself only ends on stop.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::Reconciler;
use crate::config::RECOMMENDED_MIN_PERIOD;
use crate::error::{Error, Result};

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Runs a reconciliation pass every `period`
pub struct PeriodicScheduler {
    reconciler: Arc<Reconciler>,
    period: Duration,
    stop_requested: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PeriodicScheduler {
    pub fn new(reconciler: Arc<Reconciler>, period: Duration) -> Self {
        Self {
            reconciler,
            period,
            stop_requested: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SchedulerState {
        match &self.task {
            Some(task) if !task.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Start the loop; the first pass runs immediately
    pub fn start(&mut self) -> Result<()> {
        if self.state() == SchedulerState::Running {
            return Err(Error::Other("Periodic sync is already running".to_string()));
        }
        if self.period < RECOMMENDED_MIN_PERIOD {
            warn!(
                "Sync period of {:?} is shorter than the recommended {:?}; \
                 every pass reads the full inventory of both systems",
                self.period, RECOMMENDED_MIN_PERIOD
            );
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        let reconciler = Arc::clone(&self.reconciler);
        let stop_requested = Arc::clone(&self.stop_requested);
        let period = self.period;

        info!("Starting periodic sync every {:?}", period);
        self.task = Some(tokio::spawn(run_loop(reconciler, period, stop_requested)));
        Ok(())
    }

    /// Ask the loop to stop
    ///
    /// A graceful stop lets the loop finish its current sleep (and any pass in
    /// flight) before it exits. A forced stop aborts the loop task at once,
    /// cancelling a running pass; once [`wait`](Self::wait) returns the pass
    /// has released the sync lock and makes no further changes.
    pub fn stop(&mut self, graceful: bool) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if !graceful {
            if let Some(task) = &self.task {
                task.abort();
            }
            info!("Periodic sync aborted");
        } else {
            info!("Periodic sync will stop after the current period");
        }
    }

    /// Wait for the loop task to end
    pub async fn wait(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        // The handle stays in place until the task ends, so a cancelled wait
        // can still be followed by a forced stop
        let result = task.await;
        self.task = None;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(Error::Other(format!("Periodic sync task failed: {}", e))),
        }
    }

    /// Forget a finished loop task so the scheduler can be started again
    pub fn reset(&mut self) {
        if self.state() == SchedulerState::Stopped {
            self.task = None;
            self.stop_requested.store(false, Ordering::SeqCst);
        }
    }
}

async fn run_loop(reconciler: Arc<Reconciler>, period: Duration, stop_requested: Arc<AtomicBool>) {
    loop {
        run_once(&reconciler).await;

        tokio::time::sleep(period).await;
        if stop_requested.load(Ordering::SeqCst) {
            info!("Periodic sync stopped");
            break;
        }
    }
}

async fn run_once(reconciler: &Reconciler) {
    match AssertUnwindSafe(reconciler.run_pass()).catch_unwind().await {
        Ok(Ok(report)) => {
            if report.failures() > 0 {
                warn!(
                    "Periodic sync pass {} finished with {} failure(s)",
                    report.pass,
                    report.failures()
                );
            }
        }
        Ok(Err(e)) if e.is_connection() => {
            error!("Error while connecting to the fabric controller: {}", e);
        }
        Ok(Err(e)) => error!("Periodic sync failed: {}", e),
        Err(panic) => error!("Periodic sync failed: pass panicked: {}", panic_message(&*panic)),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
