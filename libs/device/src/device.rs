use std::path::PathBuf;
use std::time::Duration;

use ebus_core::tracing::prelude::*;
use ebus_core::DeviceConfig;
use nix::poll::{ppoll, PollFd, PollFlags};
use nix::sys::time::TimeSpec;

use crate::address::Address;
use crate::capture::RawCapture;
use crate::error::{Error, Result};
use crate::transport::{Link, Transport};

/// Which way a byte crossed the device boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Sent,
    Received,
}

/// Per-byte raw trace hook. Runs inline with I/O, so it must be quick.
pub type RawLogger = Box<dyn FnMut(u8, Direction) + Send>;

/// Concrete variant behind a [`Device`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Serial,
    Network,
}

/// Construction-time options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Probe the device on every validity check
    pub check_device: bool,

    /// Reject every send
    pub readonly: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            check_device: true,
            readonly: false,
        }
    }
}

/// Raw trace hook writing `<xx` for received and `>xx` for sent bytes to the
/// `ebus::raw` log target.
pub fn trace_raw_byte(byte: u8, direction: Direction) {
    match direction {
        Direction::Received => info!(target: "ebus::raw", "<{:02x}", byte),
        Direction::Sent => info!(target: "ebus::raw", ">{:02x}", byte),
    }
}

/// Byte channel to the bus, over a serial line or a network gateway
///
/// A device is synchronous and single-caller: every operation either
/// returns at once or blocks the calling thread. Callers serialize access.
///
/// With `check_device` set, [`Device::is_valid`] actively probes the
/// device and closes it when the probe fails. The next `send`/`recv` then
/// reports [`Error::Device`] until the caller reopens.
pub struct Device {
    name: String,
    link: Link,
    options: DeviceOptions,
    log_raw: bool,
    raw_logger: Option<RawLogger>,
    capture: RawCapture,
}

impl Device {
    /// Create a device from its name: `host:port` for a network gateway,
    /// anything else for a serial device path. The device is not opened.
    pub fn create(
        name: &str,
        options: DeviceOptions,
        raw_logger: Option<RawLogger>,
    ) -> Result<Self> {
        let address = Address::parse(name)?;
        debug!(name, %address, "Creating device");

        Ok(Self {
            name: name.to_string(),
            link: Link::new(address),
            options,
            log_raw: false,
            raw_logger,
            capture: RawCapture::new(ebus_core::config::DEFAULT_DUMP_SIZE_KB),
        })
    }

    /// Create a device and apply the raw trace and capture settings of
    /// `config`. The device is not opened.
    pub fn from_config(config: &DeviceConfig, raw_logger: Option<RawLogger>) -> Result<Self> {
        let options = DeviceOptions {
            check_device: config.check_device,
            readonly: config.readonly,
        };
        let mut device = Self::create(&config.device, options, raw_logger)?;
        device.set_log_raw(config.log_raw);
        device.set_dump_raw_max_size(config.dump_size);
        device.set_dump_raw_file(Some(config.dump_file.clone()));
        device.set_dump_raw(config.dump_raw);
        Ok(device)
    }

    /// The name this device was created from
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DeviceKind {
        match self.link {
            Link::Serial(_) => DeviceKind::Serial,
            Link::Network(_) => DeviceKind::Network,
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.options.readonly
    }

    /// Open the device, closing it first if already open.
    pub fn open(&mut self) -> Result<()> {
        self.link.open()
    }

    /// Close the device. No-op when already closed.
    pub fn close(&mut self) {
        self.link.close();
    }

    /// Whether the device is open and, when checking is enabled, still
    /// alive. A failed probe closes the device.
    pub fn is_valid(&mut self) -> bool {
        if !self.link.is_open() {
            return false;
        }
        if self.options.check_device {
            self.link.check();
        }
        self.link.is_open()
    }

    /// Write a single byte.
    pub fn send(&mut self, value: u8) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::device("device not open"));
        }
        if self.options.readonly {
            return Err(Error::Send("device is read-only".to_string()));
        }

        match self.link.write(&[value]) {
            Ok(1) => {}
            Ok(n) => return Err(Error::Send(format!("wrote {} bytes instead of 1", n))),
            Err(e) => return Err(Error::Send(e.to_string())),
        }

        if self.log_raw {
            if let Some(logger) = self.raw_logger.as_mut() {
                logger(value, Direction::Sent);
            }
        }
        Ok(())
    }

    /// Read a single byte.
    ///
    /// A non-zero `timeout` first waits that long for the device to become
    /// readable and fails with [`Error::Timeout`] if it does not. A zero
    /// timeout blocks in the read until a byte or end of stream arrives.
    pub fn recv(&mut self, timeout: Duration) -> Result<u8> {
        if !self.is_valid() {
            return Err(Error::device("device not open"));
        }
        if !timeout.is_zero() {
            self.wait_readable(timeout)?;
        }

        let mut buf = [0u8; 1];
        match self.link.read(&mut buf) {
            Ok(0) => return Err(Error::Eof),
            Ok(_) => {}
            Err(e) => return Err(Error::device(e.to_string())),
        }
        let value = buf[0];

        if self.log_raw {
            if let Some(logger) = self.raw_logger.as_mut() {
                logger(value, Direction::Received);
            }
        }
        if let Err(e) = self.capture.append(value) {
            warn!(error = %e, "Failed to write raw capture");
        }
        Ok(value)
    }

    fn wait_readable(&self, timeout: Duration) -> Result<()> {
        let fd = self
            .link
            .as_fd()
            .ok_or_else(|| Error::device("device not open"))?;
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];

        match ppoll(&mut fds, Some(TimeSpec::from_duration(timeout)), None) {
            Ok(0) => Err(Error::Timeout),
            Ok(_) => Ok(()),
            Err(errno) => Err(Error::device(format!("wait failed: {}", errno))),
        }
    }

    /// Enable or disable the raw trace hook.
    pub fn set_log_raw(&mut self, log_raw: bool) {
        self.log_raw = log_raw;
    }

    pub fn log_raw(&self) -> bool {
        self.log_raw
    }

    /// Enable or disable raw capture of received bytes.
    pub fn set_dump_raw(&mut self, dump_raw: bool) {
        self.capture.set_enabled(dump_raw);
    }

    pub fn dump_raw(&self) -> bool {
        self.capture.is_enabled()
    }

    /// Set the raw capture target; `None` stops capturing.
    pub fn set_dump_raw_file(&mut self, path: Option<PathBuf>) {
        self.capture.set_path(path);
    }

    /// Set the capture rotation threshold in kilobytes.
    pub fn set_dump_raw_max_size(&mut self, max_size_kb: u64) {
        self.capture.set_max_size_kb(max_size_kb);
    }

    pub fn capture(&self) -> &RawCapture {
        &self.capture
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // Release the device before the capture file goes
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_network_device(options: DeviceOptions) -> Device {
        Device::create("127.0.0.1:9", options, None).unwrap()
    }

    #[test]
    fn factory_picks_variant_from_name() {
        let serial = Device::create("/dev/ttyUSB0", DeviceOptions::default(), None).unwrap();
        assert_eq!(serial.kind(), DeviceKind::Serial);
        assert_eq!(serial.name(), "/dev/ttyUSB0");

        let network = closed_network_device(DeviceOptions::default());
        assert_eq!(network.kind(), DeviceKind::Network);
        assert_eq!(network.name(), "127.0.0.1:9");
    }

    #[test]
    fn factory_rejects_bad_port() {
        let result = Device::create("127.0.0.1:70000", DeviceOptions::default(), None);
        assert!(matches!(result, Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn closed_device_reports_device_errors() {
        let mut device = closed_network_device(DeviceOptions::default());

        assert!(!device.is_valid());
        assert!(matches!(device.send(0xaa), Err(Error::Device(_))));
        assert!(matches!(
            device.recv(Duration::from_millis(10)),
            Err(Error::Device(_))
        ));
        assert!(matches!(device.recv(Duration::ZERO), Err(Error::Device(_))));
    }

    #[test]
    fn close_twice_is_harmless() {
        let mut device = closed_network_device(DeviceOptions::default());
        device.close();
        device.close();
        assert!(!device.is_valid());
    }

    #[test]
    fn raw_trace_is_off_by_default() {
        let device = Device::create(
            "/dev/ttyUSB0",
            DeviceOptions::default(),
            Some(Box::new(trace_raw_byte)),
        )
        .unwrap();
        assert!(!device.log_raw());
    }

    #[test]
    fn from_config_applies_capture_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = DeviceConfig {
            device: "192.0.2.5:10001".to_string(),
            readonly: true,
            log_raw: true,
            dump_raw: true,
            dump_file: dir.path().join("dump.bin"),
            dump_size: 4,
            ..DeviceConfig::default()
        };

        let device = Device::from_config(&config, Some(Box::new(trace_raw_byte))).unwrap();
        assert_eq!(device.kind(), DeviceKind::Network);
        assert!(device.is_readonly());
        assert!(device.log_raw());
        assert!(device.dump_raw());
        assert!(device.capture().is_open());
        assert_eq!(device.capture().max_size_kb(), 4);
        assert_eq!(device.capture().path(), Some(config.dump_file.as_path()));
    }

    #[test]
    fn trace_raw_byte_accepts_both_directions() {
        ebus_core::tracing::init_stdout();
        trace_raw_byte(0xaa, Direction::Received);
        trace_raw_byte(0x10, Direction::Sent);
    }
}
