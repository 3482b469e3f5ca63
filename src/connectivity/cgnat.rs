//! Carrier-grade NAT detection
//!
//! A gateway that hands out an address from the shared space 100.64.0.0/10
//! (RFC 6598) sits behind another NAT. A mapping on it does not make us
//! reachable from the internet.

use std::net::IpAddr;
use tracing::{debug, warn};

const CGNAT_RANGE_START: u32 = 0x6440_0000; // 100.64.0.0
const CGNAT_RANGE_END: u32 = 0x647F_FFFF; // 100.127.255.255

/// Whether `external_ip` lies in the RFC 6598 shared address space
///
/// ```
/// use std::net::IpAddr;
/// use natcheck::connectivity::detect_cgnat;
///
/// let shared: IpAddr = "100.64.0.1".parse().unwrap();
/// assert!(detect_cgnat(shared));
///
/// let public: IpAddr = "203.0.113.5".parse().unwrap();
/// assert!(!detect_cgnat(public));
/// ```
pub fn detect_cgnat(external_ip: IpAddr) -> bool {
    match external_ip {
        IpAddr::V4(ipv4) => {
            let value = u32::from(ipv4);
            let is_cgnat = (CGNAT_RANGE_START..=CGNAT_RANGE_END).contains(&value);

            if is_cgnat {
                warn!(
                    "Gateway external address {} is in 100.64.0.0/10, mapped port is not public",
                    ipv4
                );
            } else {
                debug!("External IP {} is not in CGNAT range", ipv4);
            }

            is_cgnat
        }
        IpAddr::V6(_) => false,
    }
}
