//! Local radio identity derivation.

use clap::Args;
use zigcore::config::{ConfigFile, DEFAULT_OUI};
use zigcore::network::{derive_identity, Oui};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct IdentityArgs {
    /// Stable system identifier (serial number, MAC); its trailing hex
    /// digits become the low bytes of the identity
    #[arg(long)]
    system_id: String,

    /// Vendor OUI, e.g. 00:1B:5F (defaults to the configured one)
    #[arg(long)]
    oui: Option<String>,
}

pub fn run(args: IdentityArgs) -> Result<(), CliError> {
    let oui: Oui = match args.oui {
        Some(raw) => raw.parse()?,
        None => ConfigFile::load()
            .map(|c| c.network.oui)
            .unwrap_or(DEFAULT_OUI),
    };

    let identity = derive_identity(oui, &args.system_id, &mut rand::thread_rng());

    println!("{}", identity);
    println!("  OUI:       {}", oui);
    println!("  System id: {}", args.system_id);
    println!("  Bytes 3-4 are random; persist the identity rather than re-deriving it.");
    Ok(())
}
