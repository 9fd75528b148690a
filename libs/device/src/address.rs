//! Device address parsing.
//!
//! A name without a path separator but with a colon is a `host:port`
//! network gateway; anything else is a local serial device path.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Where a device lives, decided once from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Local character device
    Serial(PathBuf),

    /// TCP gateway, resolved to IPv4 at parse time
    Network(SocketAddrV4),
}

impl Address {
    /// Parse a device name, resolving network host names immediately.
    pub fn parse(name: &str) -> Result<Self> {
        if name.contains('/') {
            return Ok(Self::Serial(PathBuf::from(name)));
        }
        let Some((host, port)) = name.split_once(':') else {
            return Ok(Self::Serial(PathBuf::from(name)));
        };

        let port = parse_port(port)?;
        let ip = resolve_host(host)?;
        Ok(Self::Network(SocketAddrV4::new(ip, port)))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(path) => write!(f, "{}", path.display()),
            Self::Network(addr) => write!(f, "{}", addr),
        }
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse::<u16>()
        .ok()
        .filter(|&port| port != 0)
        .ok_or_else(|| Error::InvalidAddress(format!("invalid port \"{}\"", port)))
}

fn resolve_host(host: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    if host.is_empty() {
        return Err(Error::InvalidAddress("missing host".to_string()));
    }

    let unresolved = || Error::InvalidAddress(format!("cannot resolve host \"{}\"", host));
    (host, 0)
        .to_socket_addrs()
        .map_err(|_| unresolved())?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(unresolved)
}
