//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`identity`] - Local radio identity derivation
//! - [`simulate`] - End-to-end scenarios against the simulated radio

pub mod config;
pub mod identity;
pub mod simulate;
