//! Network bootstrap: local identity, init with retry, readiness gating.

mod bootstrap;
mod identity;
mod readiness;

pub use bootstrap::{InitState, NetworkBootstrap};
pub use identity::{derive_identity, load_or_generate, Oui};
pub use readiness::ReadinessGate;
