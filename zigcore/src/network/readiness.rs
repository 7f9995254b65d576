//! Two-gate readiness latch.

use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
struct Gates {
    network_ready: bool,
    drivers_started: bool,
}

impl Gates {
    fn both(&self) -> bool {
        self.network_ready && self.drivers_started
    }
}

/// Fires a callback each time "network ready" and "all drivers started"
/// become true together.
///
/// Dropping either gate re-arms the latch; the callback runs again on the
/// next transition to both-true.
pub struct ReadinessGate {
    gates: Mutex<Gates>,
    on_ready: Box<dyn Fn() + Send + Sync>,
}

impl ReadinessGate {
    pub fn new(on_ready: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            gates: Mutex::new(Gates::default()),
            on_ready: Box::new(on_ready),
        }
    }

    /// Returns true if this call completed the pair and fired the callback.
    pub fn set_network_ready(&self, ready: bool) -> bool {
        self.update(|g| g.network_ready = ready)
    }

    /// Returns true if this call completed the pair and fired the callback.
    pub fn set_drivers_started(&self, started: bool) -> bool {
        self.update(|g| g.drivers_started = started)
    }

    pub fn is_network_ready(&self) -> bool {
        self.gates.lock().network_ready
    }

    pub fn is_ready(&self) -> bool {
        self.gates.lock().both()
    }

    fn update(&self, f: impl FnOnce(&mut Gates)) -> bool {
        let fired = {
            let mut gates = self.gates.lock();
            let before = gates.both();
            f(&mut gates);
            !before && gates.both()
        };

        if fired {
            info!("Network ready and all drivers started");
            (self.on_ready)();
        }
        fired
    }
}
