//! Network bring-up with bounded retry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::identity::load_or_generate;
use crate::address::DeviceAddress;
use crate::config::NetworkSettings;
use crate::error::{Result, ZigbeeError};
use crate::gateway::properties::{INCREMENT_COUNTERS, NETWORK_CONFIG};
use crate::gateway::PropertyStore;
use crate::radio::{NetworkInitRequest, RadioClient};

/// Where network initialization stands.
///
/// State transitions:
/// - Uninitialized → Initializing (first init call)
/// - Initializing → Initialized | Failed
/// - Initialized | Failed → Initializing (radio restart re-runs init)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InitState {
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 2,
    Failed = 3,
}

impl InitState {
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Uninitialized),
            1 => Some(Self::Initializing),
            2 => Some(Self::Initialized),
            3 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for InitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runs network init against the radio, retrying a bounded number of times.
///
/// Only one init may run at a time. The radio emits its own startup event,
/// which re-enters this path; a second concurrent call fails fast with
/// [`ZigbeeError::AlreadyInitializing`] instead of queuing behind the first.
pub struct NetworkBootstrap {
    radio: Arc<dyn RadioClient>,
    properties: Arc<dyn PropertyStore>,
    settings: NetworkSettings,
    state: AtomicU8,
    init_lock: Mutex<()>,
}

impl NetworkBootstrap {
    pub fn new(
        radio: Arc<dyn RadioClient>,
        properties: Arc<dyn PropertyStore>,
        settings: NetworkSettings,
    ) -> Self {
        Self {
            radio,
            properties,
            settings,
            state: AtomicU8::new(InitState::Uninitialized as u8),
            init_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> InitState {
        InitState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(InitState::Failed)
    }

    fn set_state(&self, state: InitState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Assembles the init request from persisted properties.
    pub fn build_request(&self) -> Result<NetworkInitRequest> {
        let eui64 = load_or_generate(self.properties.as_ref(), self.settings.oui)?;
        let network_blob = self
            .properties
            .get(NETWORK_CONFIG)
            .filter(|b| !b.trim().is_empty());
        let increment_counters = self.properties.get_bool_or(INCREMENT_COUNTERS, false);

        let mut properties = BTreeMap::new();
        properties.insert("region".to_string(), self.settings.region.clone());
        properties.insert(
            "incrementCounters".to_string(),
            increment_counters.to_string(),
        );

        Ok(NetworkInitRequest {
            eui64,
            region: self.settings.region.clone(),
            network_blob,
            increment_counters,
            properties,
        })
    }

    /// Brings the network up.
    ///
    /// Tries up to `init_attempts` times with `init_retry_delay_ms` between
    /// attempts. On success the increment-counters flag is consumed and the
    /// local identity returned.
    ///
    /// # Errors
    ///
    /// - [`ZigbeeError::AlreadyInitializing`] if another init is running
    /// - the last attempt's error once the bound is exhausted
    pub async fn initialize(&self) -> Result<DeviceAddress> {
        let _guard = self
            .init_lock
            .try_lock()
            .map_err(|_| ZigbeeError::AlreadyInitializing)?;

        self.set_state(InitState::Initializing);

        let request = match self.build_request() {
            Ok(r) => r,
            Err(e) => {
                self.set_state(InitState::Failed);
                return Err(e);
            }
        };

        let attempts = self.settings.init_attempts.max(1);
        let delay = Duration::from_millis(self.settings.init_retry_delay_ms);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(attempt, attempts, identity = %request.eui64, "Network init attempt");

            let radio = Arc::clone(&self.radio);
            let req = request.clone();
            let result = tokio::task::spawn_blocking(move || radio.network_init(&req))
                .await
                .unwrap_or_else(|e| {
                    Err(ZigbeeError::Unsupported(format!(
                        "network init task failed: {}",
                        e
                    )))
                });

            match result {
                Ok(()) => {
                    if request.increment_counters {
                        if let Err(e) = self.properties.set(INCREMENT_COUNTERS, "false") {
                            warn!(error = %e, "Failed to reset increment-counters flag");
                        }
                    }
                    self.set_state(InitState::Initialized);
                    info!(attempt, identity = %request.eui64, region = %request.region, "Network initialized");
                    return Ok(request.eui64);
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Network init failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.set_state(InitState::Failed);
        error!(attempts, "Network init gave up");
        Err(last_error.unwrap_or_else(|| ZigbeeError::hardware("network_init", -1)))
    }

    /// Marks the network as needing init again (radio process restarted).
    pub fn reset(&self) {
        self.set_state(InitState::Uninitialized);
    }
}
