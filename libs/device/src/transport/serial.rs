use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use ebus_core::tracing::prelude::*;
use nix::fcntl::{fcntl, FcntlArg, Flock, FlockArg, OFlag};
use nix::libc;
use nix::sys::termios::{
    self, BaudRate, ControlFlags, FlushArg, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices, Termios,
};

use crate::error::{Error, Result};
use crate::transport::{not_connected, Transport};

/// Line speed of the eBUS.
pub const BUS_BAUD_RATE: BaudRate = BaudRate::B2400;

mod ioctl {
    use nix::libc;

    nix::ioctl_read_bad!(tiocmget, libc::TIOCMGET, libc::c_int);
}

/// Serial line transport for a local character device
///
/// While open, the device is held under an exclusive advisory lock and in
/// raw mode; the previous terminal settings come back on close.
pub struct SerialTransport {
    path: PathBuf,
    port: Option<OpenPort>,
}

/// A locked, raw-mode terminal. Dropping it restores the saved settings
/// before the lock and the handle are released.
struct OpenPort {
    file: Flock<File>,
    saved: Termios,
}

impl SerialTransport {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            port: None,
        }
    }

    /// Get the device path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            self.close();
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits())
            .open(&self.path)
            .map_err(|e| Error::NotFound(format!("{}: {}", self.path.display(), e)))?;

        if !file.is_terminal() {
            return Err(Error::NotFound(format!(
                "{}: not a terminal device",
                self.path.display()
            )));
        }

        let file = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
            debug!(path = %self.path.display(), %errno, "Serial device is locked");
            Error::device(format!(
                "{}: in use by another process ({})",
                self.path.display(),
                errno
            ))
        })?;

        let saved = termios::tcgetattr(&*file)?;
        let port = OpenPort { file, saved };
        port.make_raw()?;

        debug!(path = %self.path.display(), "Serial device opened");
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(path = %self.path.display(), "Serial device closed");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn check(&mut self) {
        let Some(port) = &self.port else {
            return;
        };

        let mut status: libc::c_int = 0;
        // SAFETY: the descriptor is open for as long as `port` lives and
        // `status` outlives the call.
        let probe = unsafe { ioctl::tiocmget(port.file.as_raw_fd(), &mut status) };
        if let Err(errno) = probe {
            debug!(path = %self.path.display(), %errno, "Serial device gone");
            self.close();
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.port {
            Some(port) => port.file.read(buf),
            None => Err(not_connected()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.port {
            Some(port) => port.file.write(buf),
            None => Err(not_connected()),
        }
    }

    fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        self.port.as_ref().map(|port| port.file.as_fd())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl OpenPort {
    /// Switch to raw 8N1 at bus speed, reads blocking until one byte arrives.
    fn make_raw(&self) -> Result<()> {
        let mut raw = self.saved.clone();
        raw.input_flags = InputFlags::IGNPAR;
        raw.output_flags = OutputFlags::empty();
        raw.control_flags = ControlFlags::CS8 | ControlFlags::CLOCAL | ControlFlags::CREAD;
        raw.local_flags = LocalFlags::empty();
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::cfsetspeed(&mut raw, BUS_BAUD_RATE)?;

        let fd = self.file.as_fd();
        termios::tcflush(fd, FlushArg::TCIFLUSH)?;
        termios::tcsetattr(fd, SetArg::TCSAFLUSH, &raw)?;

        let flags = OFlag::from_bits_truncate(fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?);
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags & !OFlag::O_NONBLOCK))?;
        Ok(())
    }
}

impl Drop for OpenPort {
    fn drop(&mut self) {
        let fd = self.file.as_fd();
        let _ = termios::tcflush(fd, FlushArg::TCIOFLUSH);
        let _ = termios::tcsetattr(fd, SetArg::TCSANOW, &self.saved);
    }
}
