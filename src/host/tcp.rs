//! TCP peer host
//!
//! Every connection starts with a short handshake:
//! - the dialer sends its peer id, the protocol it wants (if any) and a random
//!   nonce
//! - the listener answers with its public key, a signature over the nonce and
//!   whether it accepts the protocol
//!
//! The dialer checks that the key fingerprints to the peer id it expected.
//! After the handshake the raw TCP stream belongs to the protocol handler.
//! Connections without a protocol are plain reachability probes and are held
//! until the dialer hangs up.

use super::{InboundStream, PeerHost, PeerInfo, INBOUND_QUEUE};
use crate::address::{interface_listen_addrs, multiaddr_to_socketaddr, socket_to_multiaddr};
use crate::identity::{verify_peer, Keypair, PeerId};
use crate::protocol::{read_message, write_message};
use crate::{Error, Result};
use multiaddr::Multiaddr;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Domain separator mixed into the signed handshake nonce
const HANDSHAKE_CONTEXT: &[u8] = b"natcheck-handshake:";

/// How long a plain probe connection is held open
const PROBE_HOLD_TIMEOUT: Duration = Duration::from_secs(30);

/// Listen backlog
const BACKLOG: u32 = 1024;

type HandlerTable = Arc<Mutex<HashMap<String, mpsc::Sender<InboundStream<TcpStream>>>>>;

/// TCP host settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcpHostConfig {
    /// Bind outbound connections to the listen port (SO_REUSEADDR/SO_REUSEPORT)
    pub port_reuse: bool,
    /// Bound on each handshake
    pub handshake_timeout: Duration,
    /// Bound on each per-address attempt of `open_stream`
    pub stream_dial_timeout: Duration,
}

impl Default for TcpHostConfig {
    fn default() -> Self {
        Self {
            port_reuse: false,
            handshake_timeout: Duration::from_secs(5),
            stream_dial_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DialerHello {
    peer_id: PeerId,
    protocol: Option<String>,
    nonce: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListenerHello {
    public_key: String,
    signature: String,
    accepted: bool,
}

/// Outbound half of a host, cheap to clone into dial tasks
#[derive(Clone)]
struct Dialer {
    keypair: Arc<Keypair>,
    local_addr: SocketAddr,
    port_reuse: bool,
    handshake_timeout: Duration,
}

/// Peer endpoint over plain TCP
pub struct TcpHost {
    dialer: Dialer,
    config: TcpHostConfig,
    handlers: HandlerTable,
    accept_task: JoinHandle<()>,
}

impl TcpHost {
    /// Bind a listener on `addr` and start accepting connections
    pub async fn bind(addr: SocketAddr, keypair: Keypair, config: TcpHostConfig) -> Result<Self> {
        let socket = new_socket(addr, config.port_reuse)?;
        socket
            .bind(addr)
            .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        let listener = socket.listen(BACKLOG)?;

        // Actual bound address matters when port 0 was requested
        let local_addr = listener.local_addr()?;

        let keypair = Arc::new(keypair);
        let handlers: HandlerTable = Arc::new(Mutex::new(HashMap::new()));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            keypair.clone(),
            handlers.clone(),
            config.handshake_timeout,
        ));

        info!("Peer {} listening on {}", keypair.peer_id(), local_addr);

        Ok(Self {
            dialer: Dialer {
                keypair,
                local_addr,
                port_reuse: config.port_reuse,
                handshake_timeout: config.handshake_timeout,
            },
            config,
            handlers,
            accept_task,
        })
    }

    /// The bound socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.dialer.local_addr
    }
}

impl Drop for TcpHost {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl PeerHost for TcpHost {
    type Stream = TcpStream;

    fn peer_id(&self) -> &PeerId {
        self.dialer.keypair.peer_id()
    }

    fn listen_addrs(&self) -> Vec<Multiaddr> {
        let local_addr = self.dialer.local_addr;
        interface_listen_addrs(local_addr).unwrap_or_else(|e| {
            warn!("Failed to enumerate interfaces: {}", e);
            vec![socket_to_multiaddr(local_addr)]
        })
    }

    async fn open_stream(&self, peer: &PeerInfo, protocol: &'static str) -> Result<TcpStream> {
        let mut failures = Vec::new();

        for addr in &peer.addrs {
            let attempt = self.dialer.dial(&peer.id, addr, Some(protocol));
            match tokio::time::timeout(self.config.stream_dial_timeout, attempt).await {
                Ok(Ok(stream)) => {
                    debug!("Opened {} stream to {} via {}", protocol, peer.id, addr);
                    return Ok(stream);
                }
                Ok(Err(e)) => failures.push(format!("{}: {}", addr, e)),
                Err(_) => failures.push(format!("{}: timed out", addr)),
            }
        }

        if failures.is_empty() {
            failures.push("no addresses".to_string());
        }

        Err(Error::Transport(format!(
            "Could not open {} stream to {}: {}",
            protocol,
            peer.id,
            failures.join("; ")
        )))
    }

    async fn connect(&self, peer: &PeerInfo, timeout: Duration) -> Result<Multiaddr> {
        if peer.addrs.is_empty() {
            return Err(Error::Transport(format!("No addresses for {}", peer.id)));
        }

        // All candidates race; dropping the set aborts the losers
        let mut attempts = JoinSet::new();
        for addr in &peer.addrs {
            let dialer = self.dialer.clone();
            let expected = peer.id.clone();
            let addr = addr.clone();
            attempts.spawn(async move {
                let result = dialer.dial(&expected, &addr, None).await;
                (addr, result)
            });
        }

        let race = async {
            let mut failures = Vec::new();
            while let Some(joined) = attempts.join_next().await {
                match joined {
                    Ok((addr, Ok(_stream))) => return Ok(addr),
                    Ok((addr, Err(e))) => {
                        debug!("Dial to {} at {} failed: {}", peer.id, addr, e);
                        failures.push(format!("{}: {}", addr, e));
                    }
                    Err(e) => failures.push(format!("dial task failed: {}", e)),
                }
            }
            Err(Error::Transport(format!(
                "All dials to {} failed: {}",
                peer.id,
                failures.join("; ")
            )))
        };

        match tokio::time::timeout(timeout, race).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    async fn handle_protocol(
        &self,
        protocol: &'static str,
    ) -> mpsc::Receiver<InboundStream<TcpStream>> {
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        self.handlers.lock().await.insert(protocol.to_string(), tx);
        debug!("Registered handler for {}", protocol);
        rx
    }
}

impl Dialer {
    async fn dial(
        &self,
        expected: &PeerId,
        addr: &Multiaddr,
        protocol: Option<&str>,
    ) -> Result<TcpStream> {
        let target = multiaddr_to_socketaddr(addr)
            .ok_or_else(|| Error::Transport(format!("Unsupported address {}", addr)))?;

        debug!("Dialing {} at {}", expected, addr);
        let mut stream = self.connect_socket(target).await?;

        tokio::time::timeout(
            self.handshake_timeout,
            self.handshake(&mut stream, expected, protocol),
        )
        .await
        .map_err(|_| Error::Timeout(self.handshake_timeout))??;

        Ok(stream)
    }

    async fn connect_socket(&self, target: SocketAddr) -> Result<TcpStream> {
        let result = if self.port_reuse && target.is_ipv4() == self.local_addr.is_ipv4() {
            let socket = new_socket(self.local_addr, true)?;
            socket.bind(self.local_addr)?;
            socket.connect(target).await
        } else {
            TcpStream::connect(target).await
        };

        result.map_err(|e| Error::Transport(format!("Connect to {} failed: {}", target, e)))
    }

    async fn handshake(
        &self,
        stream: &mut TcpStream,
        expected: &PeerId,
        protocol: Option<&str>,
    ) -> Result<()> {
        let mut nonce = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let hello = DialerHello {
            peer_id: self.keypair.peer_id().clone(),
            protocol: protocol.map(str::to_string),
            nonce: hex::encode(nonce),
        };
        write_message(stream, &hello).await?;

        let reply: ListenerHello = read_message(stream).await?;
        let public_key = hex::decode(&reply.public_key)
            .map_err(|e| Error::MalformedPayload(format!("Bad public key: {}", e)))?;
        let signature = hex::decode(&reply.signature)
            .map_err(|e| Error::MalformedPayload(format!("Bad signature: {}", e)))?;

        verify_peer(expected, &public_key, &signed_message(&nonce), &signature)?;

        if !reply.accepted {
            return Err(Error::Transport(format!(
                "{} does not support {}",
                expected,
                protocol.unwrap_or("plain connections")
            )));
        }

        Ok(())
    }
}

fn signed_message(nonce: &[u8]) -> Vec<u8> {
    [HANDSHAKE_CONTEXT, nonce].concat()
}

fn new_socket(addr: SocketAddr, port_reuse: bool) -> io::Result<TcpSocket> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    if port_reuse {
        socket.set_reuseaddr(true)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuseport(true)?;
    }

    Ok(socket)
}

async fn accept_loop(
    listener: TcpListener,
    keypair: Arc<Keypair>,
    handlers: HandlerTable,
    handshake_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, remote_addr)) => {
                debug!("Accepted connection from {}", remote_addr);
                tokio::spawn(handle_inbound(
                    stream,
                    remote_addr,
                    keypair.clone(),
                    handlers.clone(),
                    handshake_timeout,
                ));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_inbound(
    mut stream: TcpStream,
    remote_addr: SocketAddr,
    keypair: Arc<Keypair>,
    handlers: HandlerTable,
    handshake_timeout: Duration,
) {
    let hello: DialerHello =
        match tokio::time::timeout(handshake_timeout, read_message(&mut stream)).await {
            Ok(Ok(hello)) => hello,
            Ok(Err(e)) => {
                debug!("Handshake from {} failed: {}", remote_addr, e);
                return;
            }
            Err(_) => {
                debug!("Handshake from {} timed out", remote_addr);
                return;
            }
        };

    let nonce = match hex::decode(&hello.nonce) {
        Ok(nonce) => nonce,
        Err(e) => {
            debug!("Bad nonce from {}: {}", remote_addr, e);
            return;
        }
    };

    let sender = match &hello.protocol {
        Some(protocol) => handlers.lock().await.get(protocol).cloned(),
        None => None,
    };

    let reply = ListenerHello {
        public_key: hex::encode(keypair.public_key()),
        signature: hex::encode(keypair.sign(&signed_message(&nonce))),
        accepted: hello.protocol.is_none() || sender.is_some(),
    };

    if let Err(e) = write_message(&mut stream, &reply).await {
        debug!("Failed to answer handshake from {}: {}", remote_addr, e);
        return;
    }

    match (hello.protocol, sender) {
        (Some(protocol), Some(sender)) => {
            let inbound = InboundStream {
                stream,
                remote_peer: hello.peer_id,
                remote_addr: socket_to_multiaddr(remote_addr),
            };
            if sender.send(inbound).await.is_err() {
                warn!("Handler for {} is gone, dropping stream", protocol);
            }
        }
        (Some(protocol), None) => {
            debug!("No handler for {} requested by {}", protocol, remote_addr);
        }
        (None, _) => {
            info!("Inbound connection from {} at {}", hello.peer_id, remote_addr);
            let mut buf = [0u8; 64];
            let _ = tokio::time::timeout(PROBE_HOLD_TIMEOUT, async {
                while let Ok(n) = stream.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            })
            .await;
        }
    }
}
