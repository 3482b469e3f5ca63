//! In-memory doubles for the peer host and the port mapper

use crate::connectivity::{MappingError, MappingProtocol, PortMapper, PortMappingResult};
use crate::host::{InboundStream, PeerHost, PeerInfo, INBOUND_QUEUE};
use crate::identity::{Keypair, PeerId};
use crate::{Error, Result};
use multiaddr::Multiaddr;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

pub fn ma(s: &str) -> Multiaddr {
    s.parse().unwrap()
}

pub fn peer_id() -> PeerId {
    Keypair::generate().peer_id().clone()
}

type Handlers = HashMap<(PeerId, String), mpsc::Sender<InboundStream<DuplexStream>>>;

#[derive(Default)]
struct NetworkState {
    handlers: Handlers,
    reachable: HashSet<Multiaddr>,
    dials: Vec<Vec<Multiaddr>>,
}

/// A shared fabric the memory hosts talk through
///
/// `connect` succeeds on the first address marked reachable. Streams are
/// tokio duplex pipes.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept inbound dials on `addr`
    pub fn make_reachable(&self, addr: &Multiaddr) {
        self.state.lock().unwrap().reachable.insert(addr.clone());
    }

    /// Address lists passed to every `connect` so far
    pub fn dials(&self) -> Vec<Vec<Multiaddr>> {
        self.state.lock().unwrap().dials.clone()
    }

    /// A host with the given listen addresses, seen by others as `observed_as`
    pub fn host(&self, listen: Vec<Multiaddr>, observed_as: Multiaddr) -> MemoryHost {
        MemoryHost {
            id: peer_id(),
            network: self.clone(),
            listen,
            observed_as,
        }
    }
}

pub struct MemoryHost {
    id: PeerId,
    network: MemoryNetwork,
    listen: Vec<Multiaddr>,
    observed_as: Multiaddr,
}

impl MemoryHost {
    pub fn info(&self) -> PeerInfo {
        PeerInfo::new(self.id.clone(), self.listen.clone())
    }
}

impl PeerHost for MemoryHost {
    type Stream = DuplexStream;

    fn peer_id(&self) -> &PeerId {
        &self.id
    }

    fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen.clone()
    }

    async fn open_stream(&self, peer: &PeerInfo, protocol: &'static str) -> Result<DuplexStream> {
        let sender = self
            .network
            .state
            .lock()
            .unwrap()
            .handlers
            .get(&(peer.id.clone(), protocol.to_string()))
            .cloned()
            .ok_or_else(|| Error::Transport(format!("no route to {}", peer.id)))?;

        let (near, far) = tokio::io::duplex(64 * 1024);
        sender
            .send(InboundStream {
                stream: far,
                remote_peer: self.id.clone(),
                remote_addr: self.observed_as.clone(),
            })
            .await
            .map_err(|_| Error::Transport("handler gone".to_string()))?;

        Ok(near)
    }

    async fn connect(&self, peer: &PeerInfo, _timeout: Duration) -> Result<Multiaddr> {
        let mut state = self.network.state.lock().unwrap();
        state.dials.push(peer.addrs.clone());

        peer.addrs
            .iter()
            .find(|addr| state.reachable.contains(*addr))
            .cloned()
            .ok_or_else(|| Error::Transport(format!("failed to dial {}: no good addresses", peer.id)))
    }

    async fn handle_protocol(
        &self,
        protocol: &'static str,
    ) -> mpsc::Receiver<InboundStream<DuplexStream>> {
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        self.network
            .state
            .lock()
            .unwrap()
            .handlers
            .insert((self.id.clone(), protocol.to_string()), tx);
        rx
    }
}

fn granted(external: &str) -> PortMappingResult {
    let external: SocketAddr = external.parse().unwrap();
    PortMappingResult {
        external_ip: external.ip(),
        external_port: external.port(),
        lifetime_secs: 300,
        protocol: MappingProtocol::UPnP,
        created_at_ms: chrono::Utc::now().timestamp_millis(),
    }
}

#[derive(Clone)]
pub enum FakeOutcome {
    Map(PortMappingResult),
    /// Grants the mapping only after the delay
    MapAfter(Duration, PortMappingResult),
    Fail(String),
    Hang,
}

/// Port mapper returning a fixed outcome and counting calls
#[derive(Clone)]
pub struct FakeMapper {
    outcome: FakeOutcome,
    pub calls: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

impl FakeMapper {
    pub fn new(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            calls: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn mapping(external: &str) -> Self {
        Self::new(FakeOutcome::Map(granted(external)))
    }

    pub fn slow_mapping(external: &str, delay: Duration) -> Self {
        Self::new(FakeOutcome::MapAfter(delay, granted(external)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl PortMapper for FakeMapper {
    async fn attempt_mapping(
        &self,
        _local: SocketAddr,
        _lifetime_secs: u32,
    ) -> std::result::Result<PortMappingResult, MappingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            FakeOutcome::Map(mapping) => Ok(mapping.clone()),
            FakeOutcome::MapAfter(delay, mapping) => {
                tokio::time::sleep(*delay).await;
                Ok(mapping.clone())
            }
            FakeOutcome::Fail(reason) => Err(MappingError::GatewayError(reason.clone())),
            FakeOutcome::Hang => std::future::pending().await,
        }
    }

    async fn release(
        &self,
        _mapping: &PortMappingResult,
        _local: SocketAddr,
    ) -> std::result::Result<(), MappingError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
