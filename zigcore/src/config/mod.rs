//! Configuration for the zigcore control plane.
//!
//! Settings are read from `~/.zigcore/config.ini`. Missing files and keys
//! fall back to the `DEFAULT_*` constants; present but invalid values are
//! rejected with [`ConfigFileError::InvalidValue`].
//!
//! Runtime-tunable gateway flags (reject-unknown-devices, channel change
//! enable, persisted identity) are not here; they live in the gateway's
//! property store.
//!
//! # Example
//!
//! ```
//! use zigcore::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.network.init_attempts, 3);
//! ```

pub mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ChannelChangeSettings, ConfigFile, DefenderSettings, HealthCheckSettings, LoggingSettings,
    NetworkSettings, WatchdogSettings,
};
