use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Unparseable host, unresolvable name or port outside 1..=65535
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Device path missing or not a terminal
    #[error("Device not found: {0}")]
    NotFound(String),

    /// Device unusable: closed, locked by another process, I/O or probe failure
    #[error("Device error: {0}")]
    Device(String),

    /// Write rejected or device opened read-only
    #[error("Send error: {0}")]
    Send(String),

    /// Nothing arrived within the receive timeout
    #[error("Receive timeout exceeded")]
    Timeout,

    /// The peer or device closed the stream
    #[error("End of stream")]
    Eof,

    /// Socket creation or connect failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// True when the error only means "no data yet".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<nix::Error> for Error {
    fn from(errno: nix::Error) -> Self {
        Self::Device(errno.desc().to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
