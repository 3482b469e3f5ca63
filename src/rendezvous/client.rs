//! Subject side of the rendezvous lookup

use super::PeerInfoResponse;
use crate::address::socket_to_multiaddr;
use crate::host::PeerInfo;
use crate::{Error, Result};
use multiaddr::Multiaddr;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

/// What the rendezvous service told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Responder endpoint for connect-back requests
    pub peer_a: PeerInfo,
    /// Endpoint the listener announces itself to
    pub peer_b: PeerInfo,
    /// Our address as observed by the service
    pub seen_addr: Multiaddr,
}

/// Fetch `<base_url>/peerinfo`
///
/// Every failure (connect, HTTP status, body, ids, addresses) is reported as
/// [`Error::ServiceUnreachable`] so the caller can fall back to the plain
/// HTTPS probe.
pub async fn fetch_peer_info(base_url: &str, timeout: Duration) -> Result<ServerInfo> {
    let url = format!("{}/peerinfo", base_url.trim_end_matches('/'));
    info!("Contacting rendezvous service: {}", url);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::ServiceUnreachable(format!("Client creation failed: {}", e)))?;

    let response = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            Error::ServiceUnreachable(format!("could not contact rendezvous service: {}", e))
        })?;

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::ServiceUnreachable(format!("Body read failed: {}", e)))?;

    let info = parse_peer_info(&body)?;
    debug!(
        "Rendezvous peers: A={} ({} addrs), B={} ({} addrs), seen as {}",
        info.peer_a.id,
        info.peer_a.addrs.len(),
        info.peer_b.id,
        info.peer_b.addrs.len(),
        info.seen_addr
    );

    Ok(info)
}

/// Decode a `/peerinfo` body
pub fn parse_peer_info(body: &[u8]) -> Result<ServerInfo> {
    let response: PeerInfoResponse = serde_json::from_slice(body)
        .map_err(|e| Error::ServiceUnreachable(format!("Invalid peerinfo response: {}", e)))?;

    let seen: SocketAddr = response.seen_addr.parse().map_err(|e| {
        Error::ServiceUnreachable(format!(
            "Invalid SeenAddr {:?}: {}",
            response.seen_addr, e
        ))
    })?;

    Ok(ServerInfo {
        peer_a: response.peer_a,
        peer_b: response.peer_b,
        seen_addr: socket_to_multiaddr(seen),
    })
}
