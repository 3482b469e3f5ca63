//! Peer session capability
//!
//! The diagnostic never talks to sockets directly. It goes through a
//! [`PeerHost`], which knows how to:
//! - open a protocol-tagged stream to a peer identity
//! - dial a peer on a set of candidate addresses and report which one worked
//! - hand inbound protocol streams to a handler
//!
//! [`TcpHost`] is the shipped implementation. Tests use an in-memory double.

pub mod tcp;

pub use tcp::{TcpHost, TcpHostConfig};

use crate::identity::PeerId;
use crate::Result;
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// A peer identity together with the addresses it can be reached on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Peer identifier
    #[serde(rename = "ID")]
    pub id: PeerId,
    /// Ordered addresses
    #[serde(rename = "Addrs", default)]
    pub addrs: Vec<Multiaddr>,
}

impl PeerInfo {
    /// Create a new peer info
    pub fn new(id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { id, addrs }
    }
}

/// A stream opened to us by a remote peer
#[derive(Debug)]
pub struct InboundStream<S> {
    /// The byte stream
    pub stream: S,
    /// Peer id the remote claimed in its handshake
    pub remote_peer: PeerId,
    /// Address the underlying connection arrived from
    pub remote_addr: Multiaddr,
}

/// Capacity of the per-protocol inbound queue
pub const INBOUND_QUEUE: usize = 64;

/// An addressable peer endpoint able to open and accept streams
pub trait PeerHost: Send + Sync + 'static {
    /// Bidirectional byte stream type
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// This endpoint's identity
    fn peer_id(&self) -> &PeerId;

    /// Concrete addresses this endpoint listens on
    fn listen_addrs(&self) -> Vec<Multiaddr>;

    /// Open a stream to `peer` speaking `protocol`
    fn open_stream(
        &self,
        peer: &PeerInfo,
        protocol: &'static str,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Establish a fresh connection to `peer` using any of its addresses
    ///
    /// Returns the address that worked. The whole attempt is bounded by
    /// `timeout`.
    fn connect(
        &self,
        peer: &PeerInfo,
        timeout: Duration,
    ) -> impl Future<Output = Result<Multiaddr>> + Send;

    /// Route inbound streams for `protocol` to the returned receiver
    ///
    /// Registering a protocol twice replaces the earlier receiver.
    fn handle_protocol(
        &self,
        protocol: &'static str,
    ) -> impl Future<Output = mpsc::Receiver<InboundStream<Self::Stream>>> + Send;
}
