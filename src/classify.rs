//! Reachability classification
//!
//! Decides whether a host is publicly addressable by comparing its local
//! interface addresses with the address the rendezvous service saw it from.

use crate::address::{ip_for_family, network_address};
use multiaddr::Multiaddr;
use tracing::{debug, warn};

/// Check whether the observed source address is one of our own
///
/// The observed IPv4 value is used when present, otherwise the IPv6 value.
/// Local addresses are compared within that family only. `false` means the
/// host sits behind address translation. An observed address without any IP
/// component fails closed.
pub fn is_publicly_addressable(local: &[Multiaddr], observed: &Multiaddr) -> bool {
    let Some((family, observed_ip)) = network_address(observed) else {
        warn!("Observed address {} has no ip4 or ip6 component", observed);
        return false;
    };

    let matched = local
        .iter()
        .filter_map(|addr| ip_for_family(addr, family))
        .any(|ip| ip == observed_ip);

    debug!(
        "Observed {} {} among {} local addresses",
        observed_ip,
        if matched { "found" } else { "not found" },
        local.len()
    );
    matched
}
