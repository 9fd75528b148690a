//! Device configuration.
//!
//! Every field has a default, so an empty document yields a usable
//! configuration pointing at the first USB serial adapter.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_DUMP_FILE: &str = "/tmp/ebus_dump.bin";
pub const DEFAULT_DUMP_SIZE_KB: u64 = 100;

/// Settings for one bus device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial device path or `host:port` of a network gateway
    pub device: String,

    /// Probe the device on every access
    pub check_device: bool,

    /// Never write to the bus
    pub readonly: bool,

    /// Pass every transferred byte to the raw trace hook
    pub log_raw: bool,

    /// Record received bytes to `dump_file`
    pub dump_raw: bool,

    /// Raw capture target
    pub dump_file: PathBuf,

    /// Rotate the capture file after this many kilobytes
    pub dump_size: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            check_device: true,
            readonly: false,
            log_raw: false,
            dump_raw: false,
            dump_file: PathBuf::from(DEFAULT_DUMP_FILE),
            dump_size: DEFAULT_DUMP_SIZE_KB,
        }
    }
}

impl DeviceConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(Error::invalid("device", "must not be empty"));
        }
        if self.dump_size == 0 {
            return Err(Error::invalid("dump_size", "must be at least 1 kB"));
        }
        Ok(())
    }
}
