//! Timer and background-task abstraction.
//!
//! Watchdogs and long-running radio calls are scheduled here instead of
//! running blocking loops. Work closures are synchronous (they call the
//! radio) and execute on tokio's blocking pool. Every task hangs off a
//! root [`CancellationToken`], so [`TaskScheduler::shutdown`] stops all of
//! them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, ZigbeeError};

/// Handle to a scheduled or running task.
pub struct ScheduledTask {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops the task before its next run. A run already in progress
    /// completes.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the task to end.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(task = self.name, error = %e, "Scheduled task ended abnormally");
        }
    }
}

/// Spawns one-shot, repeating and detached work on a tokio runtime.
#[derive(Clone)]
pub struct TaskScheduler {
    handle: Handle,
    root: CancellationToken,
}

impl TaskScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            root: CancellationToken::new(),
        }
    }

    /// Uses the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// [`ZigbeeError::Unsupported`] outside a tokio runtime.
    pub fn try_current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ZigbeeError::Unsupported(format!("no tokio runtime: {}", e)))
    }

    /// Runs `work` once after `delay`, unless cancelled first.
    pub fn schedule_once<F>(&self, name: &'static str, delay: Duration, work: F) -> ScheduledTask
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.root.child_token();
        let task_token = token.clone();

        let handle = self.handle.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    debug!(task = name, "Scheduled task cancelled before running");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = tokio::task::spawn_blocking(work).await {
                        warn!(task = name, error = %e, "Scheduled task panicked");
                    }
                }
            }
        });

        ScheduledTask {
            name,
            token,
            handle,
        }
    }

    /// Runs `work` every `period`, first after one period, until cancelled.
    ///
    /// Runs never overlap; ticks missed while a run is in progress are
    /// skipped.
    pub fn schedule_repeating<F>(&self, name: &'static str, period: Duration, work: F) -> ScheduledTask
    where
        F: Fn() + Send + Sync + 'static,
    {
        let token = self.root.child_token();
        let task_token = token.clone();
        let work = Arc::new(work);

        let handle = self.handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let work = Arc::clone(&work);
                if let Err(e) = tokio::task::spawn_blocking(move || work()).await {
                    warn!(task = name, error = %e, "Repeating task run panicked");
                }
            }

            debug!(task = name, "Repeating task stopped");
        });

        ScheduledTask {
            name,
            token,
            handle,
        }
    }

    /// Runs `work` in the background right away.
    pub fn spawn_detached<F>(&self, name: &'static str, work: F) -> ScheduledTask
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.root.child_token();
        let handle = self.handle.spawn_blocking(work);
        debug!(task = name, "Detached task started");

        ScheduledTask {
            name,
            token,
            handle,
        }
    }

    /// Runs an async task until it completes or is cancelled.
    pub fn spawn_async<F>(&self, name: &'static str, future: F) -> ScheduledTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.root.child_token();
        let task_token = token.clone();

        let handle = self.handle.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => debug!(task = name, "Async task cancelled"),
                _ = future => {}
            }
        });

        ScheduledTask {
            name,
            token,
            handle,
        }
    }

    /// Cancels every task created by this scheduler (and its clones).
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }
}
