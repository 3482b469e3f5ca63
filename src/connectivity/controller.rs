//! Single-shot port mapping for a diagnostic run
//!
//! - `PortMapper` - the capability: ask the gateway to forward a local address
//! - `GatewayMapper` - NAT-PMP first, UPnP IGD second
//! - `MappingController` - at most one attempt per run, bounded by a timeout

use super::gateway::local_ip_for_default_route;
use super::natpmp::{delete_natpmp_mapping, try_natpmp_mapping};
use super::types::{MappingError, MappingProtocol, NatMappingResult, PortMappingResult};
use super::upnp::{delete_upnp_mapping, try_upnp_mapping};
use crate::address::{multiaddr_to_socketaddr, socket_to_multiaddr};
use multiaddr::Multiaddr;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Something able to ask a NAT gateway for a port mapping
pub trait PortMapper: Send + Sync + 'static {
    /// Map `local` on the gateway for `lifetime_secs`
    fn attempt_mapping(
        &self,
        local: SocketAddr,
        lifetime_secs: u32,
    ) -> impl Future<Output = Result<PortMappingResult, MappingError>> + Send;

    /// Remove a mapping previously returned by `attempt_mapping`
    fn release(
        &self,
        mapping: &PortMappingResult,
        local: SocketAddr,
    ) -> impl Future<Output = Result<(), MappingError>> + Send;
}

/// Maps through the default gateway, trying NAT-PMP then UPnP
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayMapper;

impl GatewayMapper {
    /// Create a new gateway mapper
    pub fn new() -> Self {
        Self
    }
}

impl PortMapper for GatewayMapper {
    async fn attempt_mapping(
        &self,
        local: SocketAddr,
        lifetime_secs: u32,
    ) -> Result<PortMappingResult, MappingError> {
        let mut failures = Vec::with_capacity(2);

        match try_natpmp_mapping(local.port(), lifetime_secs).await {
            Ok(mapping) => return Ok(mapping),
            Err(e) => {
                debug!("NAT-PMP failed: {}", e);
                failures.push(format!("NAT-PMP: {}", e));
            }
        }

        match try_upnp_mapping(local, lifetime_secs).await {
            Ok(mapping) => return Ok(mapping),
            Err(e) => {
                debug!("UPnP failed: {}", e);
                failures.push(format!("UPnP: {}", e));
            }
        }

        Err(MappingError::AllFailed(failures.join(", ")))
    }

    async fn release(
        &self,
        mapping: &PortMappingResult,
        local: SocketAddr,
    ) -> Result<(), MappingError> {
        match mapping.protocol {
            MappingProtocol::NATPMP => delete_natpmp_mapping(local.port()).await,
            MappingProtocol::UPnP => delete_upnp_mapping(mapping.external_port).await,
        }
    }
}

/// What the single attempt produced
#[derive(Debug)]
struct Attempt {
    result: NatMappingResult,
    /// Mapping plus the local address it forwards to, kept for release
    lease: Option<(PortMappingResult, SocketAddr)>,
}

/// Creates at most one port mapping per run
///
/// The first call to [`create_mapping`](Self::create_mapping) runs the
/// attempt; every later call, concurrent or not, gets the same result.
/// An attempt that completes after the timeout is released as soon as it
/// lands.
pub struct MappingController<M> {
    mapper: Arc<M>,
    timeout: Duration,
    lifetime_secs: u32,
    attempt: OnceCell<Attempt>,
}

impl<M: PortMapper> MappingController<M> {
    /// Create a controller around `mapper`
    pub fn new(mapper: M, timeout: Duration, lifetime_secs: u32) -> Self {
        Self {
            mapper: Arc::new(mapper),
            timeout,
            lifetime_secs,
            attempt: OnceCell::new(),
        }
    }

    /// Attempt to map `local` (an `/ip4|ip6/.../tcp/...` address)
    ///
    /// Failure is never an error: it comes back as
    /// [`NatMappingResult::Failed`] with the cause.
    pub async fn create_mapping(&self, local: &Multiaddr) -> NatMappingResult {
        self.attempt
            .get_or_init(|| self.run_attempt(local))
            .await
            .result
            .clone()
    }

    /// Result of the attempt, if one was made
    pub fn result(&self) -> Option<&NatMappingResult> {
        self.attempt.get().map(|attempt| &attempt.result)
    }

    /// Remove the mapping created by this controller, if any
    pub async fn release(&self) {
        let Some((mapping, local)) = self.attempt.get().and_then(|a| a.lease.as_ref()) else {
            return;
        };

        match self.mapper.release(mapping, *local).await {
            Ok(()) => debug!("Released {:?} mapping for {}", mapping.protocol, local),
            Err(e) => warn!("Failed to release port mapping: {}", e),
        }
    }

    async fn run_attempt(&self, local: &Multiaddr) -> Attempt {
        let Some(mut socket) = multiaddr_to_socketaddr(local) else {
            return Attempt {
                result: NatMappingResult::failed(format!(
                    "{} is not a tcp address, cannot map it",
                    local
                )),
                lease: None,
            };
        };

        // A wildcard bind must be mapped to the interface the gateway sees
        if socket.ip().is_unspecified() {
            match local_ip_for_default_route() {
                Ok(ip) => socket.set_ip(ip),
                Err(e) => {
                    return Attempt {
                        result: NatMappingResult::failed(e.to_string()),
                        lease: None,
                    };
                }
            }
        }

        info!("Creating port mapping for {}", socket);
        let mapper = self.mapper.clone();
        let lifetime_secs = self.lifetime_secs;
        let mut attempt =
            tokio::spawn(async move { mapper.attempt_mapping(socket, lifetime_secs).await });

        match tokio::time::timeout(self.timeout, &mut attempt).await {
            Ok(Ok(Ok(mapping))) => {
                let external = SocketAddr::new(mapping.external_ip, mapping.external_port);
                info!(
                    "Port mapping created via {:?}: {}",
                    mapping.protocol, external
                );
                Attempt {
                    result: NatMappingResult::Mapped {
                        external_addr: socket_to_multiaddr(external),
                        protocol: mapping.protocol,
                    },
                    lease: Some((mapping, socket)),
                }
            }
            Ok(Ok(Err(e))) => {
                warn!("Port mapping failed: {}", e);
                Attempt {
                    result: NatMappingResult::failed(e.to_string()),
                    lease: None,
                }
            }
            Ok(Err(e)) => Attempt {
                result: NatMappingResult::failed(format!("port mapping task failed: {}", e)),
                lease: None,
            },
            Err(_) => {
                warn!("Port mapping timed out after {:?}", self.timeout);
                self.release_late(attempt, socket);
                Attempt {
                    result: NatMappingResult::failed(format!(
                        "port mapping timed out after {:?}",
                        self.timeout
                    )),
                    lease: None,
                }
            }
        }
    }

    /// Remove a mapping the gateway grants after the attempt timed out
    fn release_late(
        &self,
        attempt: JoinHandle<Result<PortMappingResult, MappingError>>,
        local: SocketAddr,
    ) {
        let mapper = self.mapper.clone();
        tokio::spawn(async move {
            let Ok(Ok(mapping)) = attempt.await else {
                return;
            };

            warn!(
                "Port mapping for {} arrived after the timeout, releasing it",
                local
            );
            if let Err(e) = mapper.release(&mapping, local).await {
                warn!(
                    "Failed to release late port mapping, it lapses after {}s: {}",
                    mapping.lifetime_secs, e
                );
            }
        });
    }
}
