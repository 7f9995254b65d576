//! zigcore - Zigbee network orchestration for a home-automation gateway.
//!
//! This library sits between the radio process (the hardware abstraction
//! that owns the Zigbee co-processor) and the rest of the gateway. It
//! correlates join/announce events into device discovery, gates traffic
//! from unknown devices, buffers commands that arrive before a device is
//! persisted, keeps the radio's address table in sync, supervises channel
//! changes with automatic rollback, and restarts the radio process when it
//! stops answering.
//!
//! # High-Level API
//!
//! The [`subsystem`] module wires every component together:
//!
//! ```ignore
//! use zigcore::subsystem::SubsystemBuilder;
//!
//! let subsystem = SubsystemBuilder::new(radio, directory, properties, process_manager)
//!     .with_config(zigcore::config::ConfigFile::load()?)
//!     .build()?;
//! subsystem.start().await?;
//! subsystem.handle_radio_event(event);
//! ```

pub mod address;
pub mod address_table;
pub mod channel;
pub mod codec;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod events;
pub mod gate;
pub mod gateway;
pub mod logging;
pub mod network;
pub mod pending;
pub mod radio;
pub mod registry;
pub mod scheduler;
pub mod subsystem;
pub mod watchdog;

pub use address::DeviceAddress;
pub use error::{Result, ZigbeeError};

/// Version of the zigcore library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
