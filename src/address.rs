//! Address helpers
//!
//! Peers advertise and exchange addresses as multiaddrs
//! (`/ip4/203.0.113.5/tcp/9000`). This module converts between multiaddrs and
//! socket addresses, extracts the network-layer component, and builds the
//! candidate list a responder dials back on.

use multiaddr::{Multiaddr, Protocol};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, SocketAddr};

/// Network-layer address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFamily {
    /// IPv4 (`/ip4/...`)
    V4,
    /// IPv6 (`/ip6/...`)
    V6,
}

/// How a candidate address was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Raw local bind address reported by the requester
    Listen,
    /// External address returned by the mapping controller
    Mapped,
    /// Observed connection address combined with the declared listen port
    Derived,
}

/// A dial-back candidate annotated with its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAddress {
    /// Address to dial
    pub addr: Multiaddr,
    /// Where the address came from
    pub provenance: Provenance,
}

impl CandidateAddress {
    /// Create a new candidate
    pub fn new(addr: Multiaddr, provenance: Provenance) -> Self {
        Self { addr, provenance }
    }
}

/// Build an `/ip4|ip6/<ip>` multiaddr
pub fn ip_to_multiaddr(ip: IpAddr) -> Multiaddr {
    let proto = match ip {
        IpAddr::V4(ip) => Protocol::Ip4(ip),
        IpAddr::V6(ip) => Protocol::Ip6(ip),
    };
    Multiaddr::empty().with(proto)
}

/// Build an `/ip4|ip6/<ip>/tcp/<port>` multiaddr
pub fn socket_to_multiaddr(addr: SocketAddr) -> Multiaddr {
    ip_to_multiaddr(addr.ip()).with(Protocol::Tcp(addr.port()))
}

/// Convert an `ip/tcp` multiaddr to a socket address
///
/// Returns `None` for anything that is not exactly an IP component followed
/// by a TCP component.
pub fn multiaddr_to_socketaddr(addr: &Multiaddr) -> Option<SocketAddr> {
    let mut iter = addr.iter();
    let proto1 = iter.next()?;
    let proto2 = iter.next()?;

    if iter.next().is_some() {
        return None;
    }

    match (proto1, proto2) {
        (Protocol::Ip4(ip), Protocol::Tcp(port)) => Some(SocketAddr::new(ip.into(), port)),
        (Protocol::Ip6(ip), Protocol::Tcp(port)) => Some(SocketAddr::new(ip.into(), port)),
        _ => None,
    }
}

/// The network-layer value of `addr` for one address family
pub fn ip_for_family(addr: &Multiaddr, family: AddressFamily) -> Option<IpAddr> {
    addr.iter().find_map(|proto| match (proto, family) {
        (Protocol::Ip4(ip), AddressFamily::V4) => Some(IpAddr::V4(ip)),
        (Protocol::Ip6(ip), AddressFamily::V6) => Some(IpAddr::V6(ip)),
        _ => None,
    })
}

/// The network-layer value of `addr`, preferring IPv4 when both are present
pub fn network_address(addr: &Multiaddr) -> Option<(AddressFamily, IpAddr)> {
    ip_for_family(addr, AddressFamily::V4)
        .map(|ip| (AddressFamily::V4, ip))
        .or_else(|| ip_for_family(addr, AddressFamily::V6).map(|ip| (AddressFamily::V6, ip)))
}

/// The TCP port component of `addr`
pub fn tcp_port(addr: &Multiaddr) -> Option<u16> {
    addr.iter().find_map(|proto| match proto {
        Protocol::Tcp(port) => Some(port),
        _ => None,
    })
}

/// Combine the IP a connection arrived from with the port the peer listens on
///
/// A client behind address-rewriting NAT cannot report its own external IP,
/// but the responder sees it on the live connection.
pub fn derive_candidate(listen_addr: &Multiaddr, observed: &Multiaddr) -> Option<Multiaddr> {
    let port = tcp_port(listen_addr)?;
    let (_, ip) = network_address(observed)?;
    Some(socket_to_multiaddr(SocketAddr::new(ip, port)))
}

/// Remove repeated addresses, keeping the first occurrence and the order
pub fn dedup_candidates(candidates: Vec<CandidateAddress>) -> Vec<CandidateAddress> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.addr.clone()))
        .collect()
}

/// Pick the address a subject reports as its listen address
///
/// The first non-loopback address wins; loopback is only used when nothing
/// else is available.
pub fn primary_listen_addr(addrs: &[Multiaddr]) -> Option<&Multiaddr> {
    addrs
        .iter()
        .find(|addr| matches!(network_address(addr), Some((_, ip)) if !ip.is_loopback()))
        .or_else(|| addrs.first())
}

/// Expand a bound socket address into concrete interface addresses
///
/// An unspecified bind (`0.0.0.0` or `::`) is replaced by every local
/// interface address of the same family, carrying the bound port.
pub fn interface_listen_addrs(bound: SocketAddr) -> io::Result<Vec<Multiaddr>> {
    if !bound.ip().is_unspecified() {
        return Ok(vec![socket_to_multiaddr(bound)]);
    }

    let addrs = if_addrs::get_if_addrs()?
        .into_iter()
        .map(|iface| iface.ip())
        .filter(|ip| ip.is_ipv4() == bound.is_ipv4())
        .map(|ip| socket_to_multiaddr(SocketAddr::new(ip, bound.port())))
        .collect();

    Ok(addrs)
}
