//! eBUS Device - Byte transport to the bus
//!
//! Provides one synchronous send/receive channel over either a local serial
//! line or a TCP-connected bus gateway, with health detection and optional
//! raw capture of received bytes.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ebus_device::{Device, DeviceOptions, Error};
//!
//! # fn example() -> ebus_device::Result<()> {
//! let mut device = Device::create("/dev/ttyUSB0", DeviceOptions::default(), None)?;
//! device.open()?;
//!
//! match device.recv(Duration::from_millis(100)) {
//!     Ok(byte) => println!("got {byte:02x}"),
//!     Err(Error::Timeout) => println!("bus idle"),
//!     Err(e) => return Err(e),
//! }
//! device.send(0xaa)?;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod capture;
pub mod device;
pub mod error;
pub mod transport;

// Re-exports for convenience
pub use address::Address;
pub use capture::RawCapture;
pub use device::{trace_raw_byte, Device, DeviceKind, DeviceOptions, Direction, RawLogger};
pub use error::{Error, Result};
