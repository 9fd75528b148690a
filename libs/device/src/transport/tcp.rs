use std::io::{self, Read, Write};
use std::net::{SocketAddrV4, TcpStream};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use ebus_core::tracing::prelude::*;
use nix::errno::Errno;
use nix::sys::socket::{self, MsgFlags};

use crate::error::Result;
use crate::transport::{not_connected, Transport};

/// TCP transport to a network bus gateway
///
/// The address is resolved once, when the transport is created. Reopening
/// always connects to that same address.
pub struct TcpTransport {
    address: SocketAddrV4,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(address: SocketAddrV4) -> Self {
        Self {
            address,
            stream: None,
        }
    }

    /// Get the remote address of this transport
    pub fn peer_addr(&self) -> SocketAddrV4 {
        self.address
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            self.close();
        }

        let stream = TcpStream::connect(self.address).map_err(|e| {
            debug!(address = %self.address, error = %e, "Connect failed");
            e
        })?;

        debug!(address = %self.address, "Network device connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(address = %self.address, "Network device closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Peek one byte without blocking. Would-block means alive; end of
    /// stream or any other error means the peer is gone.
    fn check(&mut self) {
        let Some(stream) = &self.stream else {
            return;
        };

        let mut buf = [0u8; 1];
        let flags = MsgFlags::MSG_PEEK | MsgFlags::MSG_DONTWAIT;
        let gone = match socket::recv(stream.as_raw_fd(), &mut buf, flags) {
            Ok(0) => true,
            Ok(_) | Err(Errno::EAGAIN) => false,
            Err(errno) => {
                debug!(address = %self.address, %errno, "Peek failed");
                true
            }
        };

        if gone {
            debug!(address = %self.address, "Network device gone");
            self.close();
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stream {
            Some(stream) => stream.read(buf),
            None => Err(not_connected()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.stream {
            Some(stream) => stream.write(buf),
            None => Err(not_connected()),
        }
    }

    fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        self.stream.as_ref().map(|stream| stream.as_fd())
    }
}
