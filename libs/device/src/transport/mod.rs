use std::io;
use std::os::fd::BorrowedFd;

use crate::address::Address;
use crate::error::Result;

pub mod serial;
pub mod tcp;

pub use self::serial::SerialTransport;
pub use self::tcp::TcpTransport;

/// Byte transport to a bus endpoint
///
/// Each transport instance owns at most one open OS handle. Callers must
/// serialize access; nothing here is reentrant.
pub trait Transport {
    /// Open the handle, closing it first if already open
    fn open(&mut self) -> Result<()>;

    /// Release the handle. No-op when already closed.
    fn close(&mut self);

    /// Whether the handle is currently open
    fn is_open(&self) -> bool;

    /// Probe the underlying device and close the handle if it is gone
    fn check(&mut self);

    /// Read into `buf`, blocking until at least one byte or end of stream
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write from `buf`
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Borrow the open handle for readiness waits
    fn as_fd(&self) -> Option<BorrowedFd<'_>>;
}

/// The concrete transport behind a device, chosen once from its address
pub enum Link {
    Serial(SerialTransport),
    Network(TcpTransport),
}

impl Link {
    pub fn new(address: Address) -> Self {
        match address {
            Address::Serial(path) => Self::Serial(SerialTransport::new(path)),
            Address::Network(addr) => Self::Network(TcpTransport::new(addr)),
        }
    }
}

macro_rules! dispatch {
    ($link:expr, $t:ident => $call:expr) => {
        match $link {
            Link::Serial($t) => $call,
            Link::Network($t) => $call,
        }
    };
}

impl Transport for Link {
    fn open(&mut self) -> Result<()> {
        dispatch!(self, t => t.open())
    }

    fn close(&mut self) {
        dispatch!(self, t => t.close())
    }

    fn is_open(&self) -> bool {
        dispatch!(self, t => t.is_open())
    }

    fn check(&mut self) {
        dispatch!(self, t => t.check())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        dispatch!(self, t => t.read(buf))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        dispatch!(self, t => t.write(buf))
    }

    fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        dispatch!(self, t => t.as_fd())
    }
}

pub(crate) fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}
