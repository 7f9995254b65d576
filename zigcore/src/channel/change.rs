//! Channel change requests and rollback supervision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::rollback::{devices_failing_to_follow, ChannelChangeWatchdogContext};
use super::scan::select_best_channel;
use super::{is_valid_channel, ChannelChangeOutcome, ChannelChangeResult, AUTO_CHANNEL};
use crate::config::ChannelChangeSettings;
use crate::events::{EventPublisher, SubsystemEvent};
use crate::gateway::properties::{CHANNEL_CHANGE_ENABLED, PREVIOUS_CHANNEL};
use crate::gateway::{DeviceDirectory, PropertyStore};
use crate::radio::RadioClient;
use crate::scheduler::{ScheduledTask, TaskScheduler};

/// Releases the in-progress flag on drop unless kept.
struct InProgressClaim<'a> {
    flag: &'a AtomicBool,
    keep: bool,
}

impl<'a> InProgressClaim<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, keep: false })
    }

    /// Leaves the flag set; the rollback check clears it.
    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for InProgressClaim<'_> {
    fn drop(&mut self) {
        if !self.keep {
            self.flag.store(false, Ordering::Release);
        }
    }
}

/// Moves the network to a new channel and reverts if devices do not follow.
///
/// A successful change persists the previous channel as a recovery marker
/// and schedules a one-shot rollback check. The check always finishes by
/// clearing the marker and the in-progress flag and publishing
/// [`SubsystemEvent::ChannelChanged`]. If the process restarts while the
/// marker is set, [`resume_interrupted_change`](Self::resume_interrupted_change)
/// re-arms the check.
pub struct ChannelChangeOrchestrator {
    radio: Arc<dyn RadioClient>,
    directory: Arc<dyn DeviceDirectory>,
    properties: Arc<dyn PropertyStore>,
    scheduler: TaskScheduler,
    publisher: EventPublisher,
    settings: ChannelChangeSettings,
    in_progress: AtomicBool,
    rollback_task: Mutex<Option<ScheduledTask>>,
}

impl ChannelChangeOrchestrator {
    pub fn new(
        radio: Arc<dyn RadioClient>,
        directory: Arc<dyn DeviceDirectory>,
        properties: Arc<dyn PropertyStore>,
        scheduler: TaskScheduler,
        publisher: EventPublisher,
        settings: ChannelChangeSettings,
    ) -> Self {
        Self {
            radio,
            directory,
            properties,
            scheduler,
            publisher,
            settings,
            in_progress: AtomicBool::new(false),
            rollback_task: Mutex::new(None),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Whether a rollback check is scheduled and not yet run.
    pub fn has_pending_rollback(&self) -> bool {
        self.rollback_task.lock().is_some()
    }

    /// Persisted previous channel, if a change is in flight.
    pub fn recovery_marker(&self) -> Option<u8> {
        self.properties
            .get(PREVIOUS_CHANNEL)
            .filter(|v| !v.trim().is_empty())
            .and_then(|v| v.trim().parse().ok())
    }

    fn clear_recovery_marker(&self) {
        if let Err(e) = self.properties.set(PREVIOUS_CHANNEL, "") {
            warn!(error = %e, "Failed to clear channel change recovery marker");
        }
    }

    /// Requests a move to `channel` ([`AUTO_CHANNEL`] picks one by scan).
    ///
    /// `dry_run` validates and computes the target without changing
    /// anything. Blocking: calls the radio.
    pub fn change_channel(self: &Arc<Self>, channel: u8, dry_run: bool) -> ChannelChangeOutcome {
        if self.properties.get_bool(CHANNEL_CHANGE_ENABLED) == Some(false) {
            info!(channel, "Channel change refused: disabled by property");
            return ChannelChangeOutcome::new(channel, ChannelChangeResult::NotAllowed);
        }

        let Some(claim) = InProgressClaim::acquire(&self.in_progress) else {
            info!(channel, "Channel change refused: another change in progress");
            return ChannelChangeOutcome::new(channel, ChannelChangeResult::InProgress);
        };

        if channel != AUTO_CHANNEL && !is_valid_channel(channel) {
            return ChannelChangeOutcome::new(channel, ChannelChangeResult::InvalidChannel);
        }

        let target = if channel == AUTO_CHANNEL {
            match self.compute_best_channel() {
                Some(c) => c,
                None => {
                    return ChannelChangeOutcome::new(channel, ChannelChangeResult::UnableToCalculate)
                }
            }
        } else {
            channel
        };

        let current = match self.radio.system_status() {
            Ok(status) => status.channel,
            Err(e) => {
                warn!(error = %e, "Channel change failed: system status unavailable");
                return ChannelChangeOutcome::new(target, ChannelChangeResult::Failed);
            }
        };

        if target == current {
            debug!(channel = target, "Already on requested channel");
            return ChannelChangeOutcome::new(target, ChannelChangeResult::Success);
        }

        if dry_run {
            debug!(from = current, to = target, "Channel change dry run");
            return ChannelChangeOutcome::new(target, ChannelChangeResult::Success);
        }

        if let Err(e) = self.properties.set(PREVIOUS_CHANNEL, &current.to_string()) {
            warn!(error = %e, "Failed to persist channel change recovery marker");
            return ChannelChangeOutcome::new(target, ChannelChangeResult::Failed);
        }

        let requested_at = SystemTime::now();
        let context = ChannelChangeWatchdogContext::capture(
            self.directory.as_ref(),
            current,
            target,
            requested_at,
            self.settings.rollback_delay(),
        );

        if let Err(e) = self.radio.network_change(target) {
            warn!(from = current, to = target, error = %e, "Radio refused channel change");
            self.clear_recovery_marker();
            return ChannelChangeOutcome::new(target, ChannelChangeResult::Failed);
        }

        claim.keep();
        info!(
            from = current,
            to = target,
            exempt = context.devices_previously_in_comm_fail.len(),
            rollback_delay_secs = self.settings.rollback_delay_secs,
            "Channel change requested"
        );
        self.arm_rollback(context);

        ChannelChangeOutcome::new(target, ChannelChangeResult::Success)
    }

    /// Re-arms supervision for a change interrupted by a restart.
    ///
    /// Returns true if a check was scheduled.
    pub fn resume_interrupted_change(self: &Arc<Self>) -> bool {
        let Some(marker) = self.properties.get(PREVIOUS_CHANNEL).filter(|v| !v.trim().is_empty()) else {
            return false;
        };

        let previous: u8 = match marker.trim().parse() {
            Ok(c) if is_valid_channel(c) => c,
            _ => {
                warn!(marker = %marker, "Discarding invalid channel change recovery marker");
                self.clear_recovery_marker();
                return false;
            }
        };

        let Some(claim) = InProgressClaim::acquire(&self.in_progress) else {
            debug!("Channel change already supervised");
            return false;
        };

        let target = match self.radio.system_status() {
            Ok(status) => status.channel,
            Err(e) => {
                warn!(error = %e, "Cannot resume channel change supervision: system status unavailable");
                return false;
            }
        };

        let context = ChannelChangeWatchdogContext::capture(
            self.directory.as_ref(),
            previous,
            target,
            SystemTime::now(),
            self.settings.rollback_delay(),
        );

        claim.keep();
        info!(previous, current = target, "Resuming interrupted channel change supervision");
        self.arm_rollback(context);
        true
    }

    fn compute_best_channel(&self) -> Option<u8> {
        let request = self.settings.scan_request();
        match self.radio.energy_scan(&request) {
            Ok(results) => {
                let best = select_best_channel(&results);
                debug!(candidates = ?request.channels, ?best, "Energy scan complete");
                best
            }
            Err(e) => {
                warn!(error = %e, "Energy scan failed");
                None
            }
        }
    }

    fn arm_rollback(self: &Arc<Self>, context: ChannelChangeWatchdogContext) {
        let this = Arc::clone(self);
        let task = self.scheduler.schedule_once(
            "channel-change-rollback",
            self.settings.rollback_delay(),
            move || this.run_rollback_check(context),
        );
        if let Some(previous) = self.rollback_task.lock().replace(task) {
            previous.cancel();
        }
    }

    /// Verifies devices followed the change and reverts if not.
    ///
    /// Always clears the recovery marker and in-progress flag and publishes
    /// the outcome.
    pub fn run_rollback_check(&self, context: ChannelChangeWatchdogContext) {
        let failed = devices_failing_to_follow(self.directory.as_ref(), &context);

        let (succeeded, channel) = if failed.is_empty() {
            info!(channel = context.target_channel, "All devices followed channel change");
            (true, context.target_channel)
        } else {
            warn!(
                failed = failed.len(),
                exempt = context.devices_previously_in_comm_fail.len(),
                reverting_to = context.previous_channel,
                "Devices did not follow channel change, reverting"
            );
            match self.radio.network_change(context.previous_channel) {
                Ok(()) => (false, context.previous_channel),
                Err(e) => {
                    error!(channel = context.previous_channel, error = %e, "Channel reversion failed");
                    (false, context.target_channel)
                }
            }
        };

        self.clear_recovery_marker();
        // Release the handle before the flag: a change accepted after the
        // flag drops stores its own handle.
        self.rollback_task.lock().take();
        self.in_progress.store(false, Ordering::Release);
        self.publisher
            .publish(SubsystemEvent::ChannelChanged { succeeded, channel });
    }

    /// Cancels a pending rollback check. The marker is kept so supervision
    /// resumes on the next start.
    pub fn shutdown(&self) {
        if let Some(task) = self.rollback_task.lock().take() {
            task.cancel();
        }
    }
}
