//! Listen address resolution.
//!
//! # Responsibilities
//! - Split a `host:port` listen spec on the last `:`
//! - Fill an empty host with the first non-loopback IPv4 of this machine
//!
//! Interface order is whatever the OS reports; the first match wins and no
//! sorting is applied.

use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};

use thiserror::Error;

/// Host used when the listen spec has no `:` at all.
pub const DEFAULT_HOST: &str = "localhost";

/// Errors raised while resolving the listen address.
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("listen address '{0}' has no port")]
    MissingPort(String),

    #[error("port '{0}' is not a valid TCP port")]
    InvalidPort(String),

    #[error("cannot enumerate network interfaces: {0}")]
    Interfaces(#[from] nix::Error),

    #[error("no non-loopback IPv4 address found on any interface")]
    NoRoutableAddress,
}

/// A resolved `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSpec {
    pub host: String,
    pub port: String,
}

impl ListenSpec {
    /// Split a listen spec without touching the network.
    ///
    /// `"host:port"` keeps both parts, `":port"` yields an empty host and a
    /// bare `"port"` yields [`DEFAULT_HOST`].
    pub fn parse(spec: &str) -> Result<Self, AddressError> {
        let (host, port) = match spec.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), port.to_string()),
            None => (DEFAULT_HOST.to_string(), spec.to_string()),
        };

        if port.is_empty() {
            return Err(AddressError::MissingPort(spec.to_string()));
        }

        Ok(Self { host, port })
    }

    /// Port as a number. Only decimal digits are accepted.
    pub fn port_number(&self) -> Result<u16, AddressError> {
        if !self.port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::InvalidPort(self.port.clone()));
        }
        self.port
            .parse()
            .map_err(|_| AddressError::InvalidPort(self.port.clone()))
    }
}

/// Resolve a listen spec, calling `detect` only when the host is empty.
///
/// Production callers pass [`detect_local_ipv4`].
pub fn resolve_with<F>(spec: &str, detect: F) -> Result<ListenSpec, AddressError>
where
    F: FnOnce() -> Result<Ipv4Addr, AddressError>,
{
    let mut listen = ListenSpec::parse(spec)?;
    listen.port_number()?;

    if listen.host.is_empty() {
        let ip = detect()?;
        tracing::debug!(ip = %ip, "Detected local IPv4 address");
        listen.host = ip.to_string();
    }

    Ok(listen)
}

/// First non-loopback IPv4 address among the machine's interfaces.
pub fn detect_local_ipv4() -> Result<Ipv4Addr, AddressError> {
    let addrs = nix::ifaddrs::getifaddrs()?.filter_map(|ifaddr| {
        ifaddr
            .address
            .as_ref()
            .and_then(|addr| addr.as_sockaddr_in().copied())
            .map(|sin| IpAddr::V4(*SocketAddrV4::from(sin).ip()))
    });

    first_routable_ipv4(addrs).ok_or(AddressError::NoRoutableAddress)
}

/// Pick the first IPv4 address that is not a loopback address.
pub fn first_routable_ipv4<I>(addrs: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
        _ => None,
    })
}
