//! Responder side of the connect-back exchange

use crate::address::{dedup_candidates, derive_candidate, CandidateAddress, Provenance};
use crate::host::{InboundStream, PeerHost, PeerInfo};
use crate::protocol::{read_message, write_message, ConnectBackRequest, ConnectBackResult};
use multiaddr::Multiaddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Dial-back bound used by the rendezvous service
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(20);

/// How long a requester may take to send its request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the ordered, deduplicated dial-back candidate list
///
/// Order is the reported listen address, then the mapped address if any,
/// then the observed connection IP paired with the listen port.
pub fn build_candidates(request: &ConnectBackRequest, observed: &Multiaddr) -> Vec<CandidateAddress> {
    let mut candidates = vec![CandidateAddress::new(
        request.listen_addr.clone(),
        Provenance::Listen,
    )];

    if let Some(mapped) = &request.port_mapped {
        candidates.push(CandidateAddress::new(mapped.clone(), Provenance::Mapped));
    }

    match derive_candidate(&request.listen_addr, observed) {
        Some(derived) => candidates.push(CandidateAddress::new(derived, Provenance::Derived)),
        None => debug!(
            "No derived candidate from listen {} and observed {}",
            request.listen_addr, observed
        ),
    }

    dedup_candidates(candidates)
}

/// Answers connect-back requests by dialing the requester's listener
pub struct ConnectBackResponder<H> {
    host: Arc<H>,
    dial_timeout: Duration,
    request_timeout: Duration,
}

impl<H> Clone for ConnectBackResponder<H> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            dial_timeout: self.dial_timeout,
            request_timeout: self.request_timeout,
        }
    }
}

impl<H: PeerHost> ConnectBackResponder<H> {
    /// Create a responder dialing through `host`
    pub fn new(host: Arc<H>, dial_timeout: Duration) -> Self {
        Self {
            host,
            dial_timeout,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bound the wait for the request frame on each stream
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Serve every stream from `rx`, one task per stream
    pub async fn serve(self, mut rx: mpsc::Receiver<InboundStream<H::Stream>>) {
        while let Some(inbound) = rx.recv().await {
            let responder = self.clone();
            tokio::spawn(async move { responder.handle(inbound).await });
        }
        debug!("Connect-back handler channel closed");
    }

    /// Handle a single request stream
    ///
    /// Undecodable or late requests are logged and the stream is dropped
    /// without a reply.
    pub async fn handle(&self, inbound: InboundStream<H::Stream>) {
        let InboundStream {
            mut stream,
            remote_peer,
            remote_addr,
        } = inbound;

        let read = tokio::time::timeout(self.request_timeout, read_message(&mut stream));
        let request: ConnectBackRequest = match read.await {
            Ok(Ok(request)) => request,
            Ok(Err(e)) => {
                warn!("Dropping connect-back stream from {}: {}", remote_addr, e);
                return;
            }
            Err(_) => {
                warn!(
                    "Dropping connect-back stream from {}: no request within {:?}",
                    remote_addr, self.request_timeout
                );
                return;
            }
        };

        info!(
            "Connect-back request from {} ({}) for {}",
            remote_peer, remote_addr, request.peer_id
        );

        let result = self.respond(&request, &remote_addr).await;

        if let Err(e) = write_message(&mut stream, &result).await {
            warn!("Failed to send connect-back result to {}: {}", remote_addr, e);
            return;
        }
        let _ = stream.shutdown().await;
    }

    /// Dial the requester back and describe the outcome
    pub async fn respond(
        &self,
        request: &ConnectBackRequest,
        observed: &Multiaddr,
    ) -> ConnectBackResult {
        let tried: Vec<Multiaddr> = build_candidates(request, observed)
            .into_iter()
            .map(|candidate| candidate.addr)
            .collect();

        let target = PeerInfo::new(request.peer_id.clone(), tried.clone());
        debug!("Dialing {} on {:?}", target.id, tried);

        match self.host.connect(&target, self.dial_timeout).await {
            Ok(addr) => {
                info!("Connect-back to {} succeeded via {}", target.id, addr);
                ConnectBackResult::success(observed.clone(), addr, tried)
            }
            Err(e) => {
                info!("Connect-back to {} failed: {}", target.id, e);
                ConnectBackResult::failure(observed.clone(), e.to_string(), tried)
            }
        }
    }
}
