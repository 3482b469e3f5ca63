//! Rendezvous lookup
//!
//! The rendezvous service publishes two peer endpoints (A and B) and tells
//! the caller which address its HTTP request arrived from:
//!
//! ```text
//! GET /peerinfo
//! {"A": {"ID": "...", "Addrs": ["/ip4/.../tcp/..."]},
//!  "B": {"ID": "...", "Addrs": [...]},
//!  "SeenAddr": "203.0.113.5:51234"}
//! ```

pub mod client;
pub mod server;

pub use client::{fetch_peer_info, ServerInfo};
pub use server::{PeerDirectory, RendezvousServer};

use crate::host::PeerInfo;
use serde::{Deserialize, Serialize};

/// Body of `GET /peerinfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfoResponse {
    /// Peer that answers connect-back requests
    #[serde(rename = "A")]
    pub peer_a: PeerInfo,
    /// Peer the subject's listener announces itself to
    #[serde(rename = "B")]
    pub peer_b: PeerInfo,
    /// `ip:port` the HTTP request came from
    #[serde(rename = "SeenAddr")]
    pub seen_addr: String,
}
