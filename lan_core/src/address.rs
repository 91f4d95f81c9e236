//! IPv4 and port validation for operator-supplied strings.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// A validated IPv4 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress(Ipv4Addr);

impl PeerAddress {
    pub fn ip(&self) -> Ipv4Addr {
        self.0
    }

    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.0), port)
    }
}

impl From<Ipv4Addr> for PeerAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self(ip)
    }
}

impl FromStr for PeerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        validate_ipv4(s)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Validate a dotted-quad IPv4 string: exactly four parts, each an integer
/// in `[0, 255]`.
pub fn validate_ipv4(s: &str) -> Result<PeerAddress> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return Err(Error::InvalidFormat(format!(
            "IP {s:?} must have 4 dot-separated parts, found {}",
            parts.len()
        )));
    }

    let mut octets = [0u8; 4];
    for (octet, part) in octets.iter_mut().zip(&parts) {
        let value: i64 = part
            .parse()
            .map_err(|_| Error::InvalidFormat(format!("IP {s:?}: {part:?} is not a number")))?;
        *octet = u8::try_from(value).map_err(|_| {
            Error::InvalidFormat(format!("IP {s:?}: {value} is outside 0-255"))
        })?;
    }

    Ok(PeerAddress(Ipv4Addr::from(octets)))
}

/// Validate a port string in `[0, 65535]`.
pub fn validate_port(s: &str) -> Result<u16> {
    let value: i64 = s
        .parse()
        .map_err(|_| Error::InvalidFormat(format!("port number {s:?} is not a number")))?;
    u16::try_from(value)
        .map_err(|_| Error::InvalidFormat(format!("port number {value} is outside 0-65535")))
}

/// Strip the trailing `:port` from a `host:port` string and validate the host.
pub fn extract_address_host(host_port: &str) -> Result<PeerAddress> {
    let host = host_port
        .rsplit_once(':')
        .map_or(host_port, |(host, _port)| host);
    validate_ipv4(host)
}

/// Replace the final octet of a dotted-quad address, e.g. to derive the
/// subnet broadcast address from a host address.
pub fn replace_last_octet(ip: &str, last_octet: &str) -> Result<String> {
    let mut parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return Err(Error::InvalidFormat(format!(
            "cannot replace last octet of {ip:?}: not a 4-octet address"
        )));
    }
    parts[3] = last_octet;
    Ok(parts.join("."))
}

/// Subnet broadcast addresses (`a.b.c.255`) of every private, non-loopback
/// IPv4 interface on this host.
pub fn lan_broadcast_addresses() -> Vec<PeerAddress> {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(list) => list,
        Err(e) => {
            tracing::error!("Error obtaining local IP address: {}", e);
            return Vec::new();
        }
    };

    let mut out: Vec<PeerAddress> = Vec::new();
    for (name, ip) in interfaces {
        let IpAddr::V4(v4) = ip else { continue };
        if v4.is_loopback() || !v4.is_private() {
            continue;
        }
        let broadcast = match replace_last_octet(&v4.to_string(), "255")
            .and_then(|s| validate_ipv4(&s))
        {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!("Skipping interface {}: {}", name, e);
                continue;
            }
        };
        if !out.contains(&broadcast) {
            tracing::debug!("LAN: {} via {}", broadcast, name);
            out.push(broadcast);
        }
    }
    out
}
