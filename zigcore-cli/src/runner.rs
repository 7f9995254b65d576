//! CLI runner for common setup.
//!
//! Encapsulates config loading, logging initialization and the async
//! runtime so scenario commands only deal with the subsystem.

use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::info;
use zigcore::config::ConfigFile;
use zigcore::gateway::{DeviceDirectory, ProcessManager, PropertyStore};
use zigcore::logging::{init_from_settings, LoggingGuard};
use zigcore::radio::RadioClient;
use zigcore::subsystem::{SubsystemBuilder, ZigbeeSubsystem};

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    config: ConfigFile,
    runtime: Runtime,
}

impl CliRunner {
    /// Loads config, initializes logging and starts a multi-thread runtime.
    pub fn new() -> Result<Self, CliError> {
        let config = ConfigFile::load()?;

        let logging_guard =
            init_from_settings(&config.logging).map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            logging_guard,
            config,
            runtime,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigFile {
        &mut self.config
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("zigcore v{}", zigcore::VERSION);
        info!("zigcore CLI: {} command", command);
    }

    /// Builds a subsystem on this runner's runtime.
    pub fn build_subsystem(
        &self,
        radio: Arc<dyn RadioClient>,
        directory: Arc<dyn DeviceDirectory>,
        properties: Arc<dyn PropertyStore>,
        process_manager: Arc<dyn ProcessManager>,
    ) -> Result<Arc<ZigbeeSubsystem>, CliError> {
        SubsystemBuilder::new(radio, directory, properties, process_manager)
            .with_config(self.config.clone())
            .with_runtime_handle(self.runtime.handle().clone())
            .build()
            .map_err(CliError::Subsystem)
            .inspect(|_| info!("Subsystem created"))
    }
}
