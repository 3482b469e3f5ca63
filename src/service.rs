//! Standing rendezvous service
//!
//! Runs two peer endpoints, A and B, with persisted keys. A answers
//! connect-back requests; B only accepts the subjects' listener announces.
//! Their identities and addresses are published over HTTP `/peerinfo`.

use crate::address::socket_to_multiaddr;
use crate::config::ServerConfig;
use crate::exchange::ConnectBackResponder;
use crate::host::{PeerHost, PeerInfo, TcpHost, TcpHostConfig};
use crate::identity::ServiceIdentity;
use crate::protocol::PROTOCOL;
use crate::rendezvous::{PeerDirectory, RendezvousServer};
use crate::Result;
use multiaddr::Multiaddr;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A running rendezvous service
///
/// Dropping it stops the HTTP server, both peers and the responder.
pub struct RendezvousService {
    peer_a: Arc<TcpHost>,
    peer_b: Arc<TcpHost>,
    http: RendezvousServer,
    directory: PeerDirectory,
    responder_task: JoinHandle<()>,
}

impl RendezvousService {
    /// Bind both peers and the HTTP endpoint
    pub async fn start(config: ServerConfig, identity: ServiceIdentity) -> Result<Self> {
        let host_config = TcpHostConfig::default();
        let peer_a = Arc::new(
            TcpHost::bind(config.peer_a_listen, identity.peer_a, host_config).await?,
        );
        let peer_b = Arc::new(
            TcpHost::bind(config.peer_b_listen, identity.peer_b, host_config).await?,
        );

        // Requesters get as long to send their request as a handshake
        let rx = peer_a.handle_protocol(PROTOCOL).await;
        let responder = ConnectBackResponder::new(peer_a.clone(), config.dial_timeout())
            .with_request_timeout(host_config.handshake_timeout);
        let responder_task = tokio::spawn(responder.serve(rx));

        let directory = PeerDirectory {
            peer_a: advertised(peer_a.as_ref(), &config),
            peer_b: advertised(peer_b.as_ref(), &config),
        };

        for addr in &directory.peer_a.addrs {
            info!("Peer A is {} at {}", directory.peer_a.id, addr);
        }
        for addr in &directory.peer_b.addrs {
            info!("Peer B is {} at {}", directory.peer_b.id, addr);
        }

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
        let http = RendezvousServer::bind(http_addr, directory.clone()).await?;

        Ok(Self {
            peer_a,
            peer_b,
            http,
            directory,
            responder_task,
        })
    }

    /// Address of the HTTP endpoint
    pub fn http_addr(&self) -> SocketAddr {
        self.http.local_addr()
    }

    /// What `/peerinfo` publishes
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Bound address of peer A
    pub fn peer_a_addr(&self) -> SocketAddr {
        self.peer_a.local_addr()
    }

    /// Bound address of peer B
    pub fn peer_b_addr(&self) -> SocketAddr {
        self.peer_b.local_addr()
    }
}

impl Drop for RendezvousService {
    fn drop(&mut self) {
        self.responder_task.abort();
    }
}

fn advertised(host: &TcpHost, config: &ServerConfig) -> PeerInfo {
    let addrs: Vec<Multiaddr> = match config.public_ip {
        Some(ip) => vec![socket_to_multiaddr(SocketAddr::new(
            ip,
            host.local_addr().port(),
        ))],
        None => host.listen_addrs(),
    };
    PeerInfo::new(host.peer_id().clone(), addrs)
}
