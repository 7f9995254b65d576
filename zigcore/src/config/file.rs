//! Reading and writing `~/.zigcore/config.ini`.
//!
//! A missing file is not an error: the gateway runs on compiled-in
//! defaults until an operator writes one (`zigcore config init`).

use std::io;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::settings::ConfigFile;

const CONFIG_DIR_NAME: &str = ".zigcore";
const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors loading or storing the control-plane config.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot parse {}: {source}", path.display())]
    Read { path: PathBuf, source: ini::Error },

    #[error("cannot write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("cannot create config directory {}: {source}", path.display())]
    CreateDirectory { path: PathBuf, source: io::Error },

    /// A key is present but its value is unusable.
    #[error("bad value for {section}.{key} ('{value}'): {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigFile {
    /// Reads `~/.zigcore/config.ini`, or defaults when it is absent.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.is_file() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|source| ConfigFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        super::parser::parse_ini(&ini)
    }

    /// Writes the commented INI form, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| ConfigFileError::CreateDirectory {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        std::fs::write(path, self.to_config_string()).map_err(|source| ConfigFileError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_config_string(&self) -> String {
        super::writer::to_config_string(self)
    }
}

/// `~/.zigcore`, or `./.zigcore` when there is no home directory.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}
