//! eBUS Core - Shared configuration and logging
//!
//! Holds the device configuration model consumed by `ebus-device` and the
//! logging setup used by anything embedding it.

pub mod config;
pub mod error;
pub mod tracing;

pub use config::DeviceConfig;
pub use error::{Error, Result};
