//! zigcore CLI - Command-line interface
//!
//! Operator tooling for the zigcore library: configuration management,
//! radio identity derivation and simulated end-to-end runs.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::identity::IdentityArgs;
use commands::simulate::SimulateCommands;
use error::CliError;

#[derive(Parser)]
#[command(name = "zigcore")]
#[command(version = zigcore::VERSION)]
#[command(about = "Zigbee network orchestration tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// View and create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Derive a local radio identity from a system id
    Identity(IdentityArgs),

    /// Run an end-to-end scenario against the simulated radio
    Simulate {
        #[command(subcommand)]
        scenario: SimulateCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Config { action } => commands::config::run(action),
        Commands::Identity(args) => commands::identity::run(args),
        Commands::Simulate { scenario } => commands::simulate::run(scenario),
    };

    if let Err(e) = result {
        e.exit();
    }
}
