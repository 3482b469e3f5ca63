//! HTTP side of the rendezvous service

use super::PeerInfoResponse;
use crate::host::PeerInfo;
use crate::{Error, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The two peers published by `/peerinfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDirectory {
    /// Connect-back responder
    pub peer_a: PeerInfo,
    /// Announce target
    pub peer_b: PeerInfo,
}

/// HTTP server answering `/peerinfo` and `/health`
///
/// The accept loop stops when the server is dropped.
pub struct RendezvousServer {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl RendezvousServer {
    /// Bind `addr` and start serving `directory`
    pub async fn bind(addr: SocketAddr, directory: PeerDirectory) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        // Port 0 means the OS picked one
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("Failed to get local address: {}", e)))?;

        let directory = Arc::new(directory);
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote_addr)) => {
                        debug!("Accepted HTTP connection from {}", remote_addr);

                        let io = TokioIo::new(stream);
                        let directory = directory.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, directory.clone(), remote_addr)
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await
                            {
                                error!("Error serving connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        });

        info!("Rendezvous HTTP listening on {}", local_addr);
        Ok(Self { local_addr, task })
    }

    /// Address the HTTP listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for RendezvousServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn handle_request(
    req: Request<Incoming>,
    directory: Arc<PeerDirectory>,
    remote_addr: SocketAddr,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/peerinfo") => {
            debug!("GET /peerinfo from {}", remote_addr);

            let body = PeerInfoResponse {
                peer_a: directory.peer_a.clone(),
                peer_b: directory.peer_b.clone(),
                seen_addr: remote_addr.to_string(),
            };

            match serde_json::to_vec(&body) {
                Ok(json) => Ok(respond(
                    StatusCode::OK,
                    "application/json",
                    Bytes::from(json),
                )),
                Err(e) => {
                    error!("Failed to serialize peerinfo: {}", e);
                    Ok(respond(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "text/plain",
                        Bytes::from(format!("Failed to serialize response: {}", e)),
                    ))
                }
            }
        }
        (&Method::GET, "/health") => Ok(respond(
            StatusCode::OK,
            "text/plain",
            Bytes::from_static(b"ok"),
        )),
        _ => {
            debug!(
                "Received unsupported request: {} {}",
                req.method(),
                req.uri().path()
            );
            Ok(respond(
                StatusCode::NOT_FOUND,
                "text/plain",
                Bytes::from_static(b"Not Found"),
            ))
        }
    }
}
