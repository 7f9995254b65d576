//! Core radio process watchdog.
//!
//! Heartbeats the radio process on a fixed interval and asks the process
//! manager for a restart after too many consecutive failures. A separate
//! check, driven by comm-fail notifications, restarts the process when
//! every known device has gone silent at once: the process answers but
//! the mesh is wedged.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::WatchdogSettings;
use crate::gateway::{DeviceDirectory, ProcessManager};
use crate::network::ReadinessGate;
use crate::radio::RadioClient;
use crate::scheduler::{ScheduledTask, TaskScheduler};

/// Result of one heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Healthy,
    /// Failed; carries the consecutive failure count.
    Missed(u32),
    /// Threshold reached and a restart was requested.
    RestartRequested,
}

pub struct CoreProcessWatchdog {
    radio: Arc<dyn RadioClient>,
    process_manager: Arc<dyn ProcessManager>,
    directory: Arc<dyn DeviceDirectory>,
    readiness: Arc<ReadinessGate>,
    settings: WatchdogSettings,
    consecutive_failures: AtomicU32,
}

impl CoreProcessWatchdog {
    pub fn new(
        radio: Arc<dyn RadioClient>,
        process_manager: Arc<dyn ProcessManager>,
        directory: Arc<dyn DeviceDirectory>,
        readiness: Arc<ReadinessGate>,
        settings: WatchdogSettings,
    ) -> Self {
        Self {
            radio,
            process_manager,
            directory,
            readiness,
            settings,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Schedules the heartbeat on the settings' interval.
    pub fn start(self: &Arc<Self>, scheduler: &TaskScheduler) -> ScheduledTask {
        let this = Arc::clone(self);
        scheduler.schedule_repeating(
            "core-watchdog",
            self.settings.heartbeat_interval(),
            move || {
                this.check_heartbeat();
            },
        )
    }

    /// Sends one heartbeat and applies the failure policy.
    pub fn check_heartbeat(&self) -> HeartbeatOutcome {
        match self.radio.heartbeat() {
            Ok(()) => {
                let previous = self.consecutive_failures.swap(0, Ordering::SeqCst);
                if previous > 0 {
                    debug!(previous_failures = previous, "Radio heartbeat recovered");
                }
                HeartbeatOutcome::Healthy
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    failures,
                    threshold = self.settings.failure_threshold,
                    error = %e,
                    "Radio heartbeat failed"
                );
                if failures >= self.settings.failure_threshold {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    self.restart("heartbeat failures");
                    HeartbeatOutcome::RestartRequested
                } else {
                    HeartbeatOutcome::Missed(failures)
                }
            }
        }
    }

    /// Restarts the radio process when every known device is in comm-fail.
    ///
    /// Returns true if a restart was requested.
    pub fn check_all_comm_fail(&self) -> bool {
        if !self.settings.restart_on_all_comm_fail {
            return false;
        }

        let devices = self.directory.known_devices();
        if devices.is_empty() {
            return false;
        }
        if devices
            .iter()
            .all(|d| self.directory.is_in_comm_fail(d.address))
        {
            warn!(devices = devices.len(), "All devices in comm-fail");
            self.restart("all devices in comm-fail");
            return true;
        }
        false
    }

    fn restart(&self, reason: &str) {
        self.readiness.set_network_ready(false);
        if let Err(e) = self.process_manager.restart_radio_process(reason) {
            error!(reason, error = %e, "Radio process restart request failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::DeviceAddress;
    use crate::config::ConfigFile;
    use crate::gateway::memory::{InMemoryDirectory, RecordingProcessManager};
    use crate::radio::SimulatedRadio;
    use std::time::Duration;

    struct Fixture {
        radio: Arc<SimulatedRadio>,
        pm: Arc<RecordingProcessManager>,
        directory: Arc<InMemoryDirectory>,
        readiness: Arc<ReadinessGate>,
        watchdog: Arc<CoreProcessWatchdog>,
    }

    fn fixture() -> Fixture {
        let radio = Arc::new(SimulatedRadio::new());
        let pm = Arc::new(RecordingProcessManager::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let readiness = Arc::new(ReadinessGate::new(|| {}));
        let watchdog = Arc::new(CoreProcessWatchdog::new(
            radio.clone(),
            pm.clone(),
            directory.clone(),
            readiness.clone(),
            ConfigFile::default().watchdog,
        ));
        Fixture {
            radio,
            pm,
            directory,
            readiness,
            watchdog,
        }
    }

    #[test]
    fn test_restart_after_threshold_and_counter_reset() {
        let f = fixture();
        f.readiness.set_network_ready(true);
        f.radio.fail("heartbeat");

        assert_eq!(f.watchdog.check_heartbeat(), HeartbeatOutcome::Missed(1));
        assert_eq!(f.watchdog.check_heartbeat(), HeartbeatOutcome::Missed(2));
        assert_eq!(f.watchdog.check_heartbeat(), HeartbeatOutcome::RestartRequested);
        assert_eq!(f.pm.restarts().len(), 1);
        assert_eq!(f.watchdog.consecutive_failures(), 0);
        assert!(!f.readiness.is_network_ready());

        // Next window starts clean.
        assert_eq!(f.watchdog.check_heartbeat(), HeartbeatOutcome::Missed(1));
    }

    #[test]
    fn test_success_resets_counter() {
        let f = fixture();
        f.radio.fail("heartbeat");
        f.watchdog.check_heartbeat();
        f.watchdog.check_heartbeat();
        f.radio.recover("heartbeat");
        assert_eq!(f.watchdog.check_heartbeat(), HeartbeatOutcome::Healthy);
        f.radio.fail("heartbeat");
        assert_eq!(f.watchdog.check_heartbeat(), HeartbeatOutcome::Missed(1));
        assert!(f.pm.restarts().is_empty());
    }

    #[test]
    fn test_all_comm_fail_restarts() {
        let f = fixture();
        assert!(!f.watchdog.check_all_comm_fail());

        for raw in 1..=2 {
            f.directory.add_device(DeviceAddress::new(raw), false);
            f.directory.set_comm_fail(DeviceAddress::new(raw), true);
        }
        assert!(f.watchdog.check_all_comm_fail());
        assert_eq!(f.pm.restarts(), vec!["all devices in comm-fail".to_string()]);
    }

    #[test]
    fn test_partial_comm_fail_does_not_restart() {
        let f = fixture();
        f.directory.add_device(DeviceAddress::new(1), false);
        f.directory.add_device(DeviceAddress::new(2), false);
        f.directory.set_comm_fail(DeviceAddress::new(1), true);
        assert!(!f.watchdog.check_all_comm_fail());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_heartbeats() {
        let f = fixture();
        let scheduler = TaskScheduler::try_current().unwrap();
        let task = f.watchdog.start(&scheduler);

        tokio::time::sleep(Duration::from_secs(150)).await;
        task.cancel();
        task.join().await;

        assert_eq!(
            f.radio
                .count_calls(|c| *c == crate::radio::RadioCall::Heartbeat),
            2
        );
    }
}
