//! Subject-side diagnostic run
//!
//! [`run`] is what the `natcheck` binary calls. It performs the rendezvous
//! lookup, binds the two local endpoints and hands over to [`probe`], which
//! is generic over the peer host and the port mapper so it can be driven by
//! test doubles.

use crate::address::{ip_to_multiaddr, primary_listen_addr};
use crate::classify::is_publicly_addressable;
use crate::config::ClientConfig;
use crate::connectivity::{find_default_gateway, GatewayMapper, MappingController, PortMapper};
use crate::exchange::request_connect_back;
use crate::host::{PeerHost, TcpHost, TcpHostConfig};
use crate::identity::Keypair;
use crate::outbound::probe_standard_https;
use crate::protocol::ConnectBackRequest;
use crate::rendezvous::{fetch_peer_info, ServerInfo};
use crate::report::{DiagnosticReport, Findings};
use crate::Result;
use chrono::Utc;
use multiaddr::Multiaddr;
use std::net::SocketAddr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Run one complete diagnostic
///
/// Stage failures end up in the report. The only error returned is a
/// failure to bind the local endpoints.
pub async fn run(config: &ClientConfig) -> Result<DiagnosticReport> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!("Starting diagnostic run {}", run_id);

    let mut findings = Findings::default();

    let server_info = match fetch_peer_info(&config.server_url, config.fetch_timeout()).await {
        Ok(info) => info,
        Err(e) => {
            warn!("Rendezvous lookup failed: {}", e);
            findings.outbound_http.odd_port_connection = Some(e.to_string());

            if let Err(e) =
                probe_standard_https(&config.fallback_probe_url, config.fetch_timeout()).await
            {
                findings.outbound_http.port_443_connection = Some(e.to_string());
            }

            warn!("Non-standard ports being blocked");
            return Ok(DiagnosticReport::aggregate(
                run_id,
                started_at,
                Utc::now(),
                findings,
            ));
        }
    };

    // Outbound endpoint: ephemeral, never mapped
    let outbound = TcpHost::bind(
        SocketAddr::from(([0, 0, 0, 0], 0)),
        Keypair::generate(),
        TcpHostConfig::default(),
    )
    .await?;

    // Listener endpoint: the one being tested for inbound reachability
    let listener = TcpHost::bind(
        SocketAddr::from(([0, 0, 0, 0], config.listen_port)),
        Keypair::generate(),
        TcpHostConfig {
            port_reuse: true,
            ..TcpHostConfig::default()
        },
    )
    .await?;

    let gateway = match find_default_gateway() {
        Ok(ip) => Some(ip_to_multiaddr(ip)),
        Err(e) => {
            debug!("No default gateway: {}", e);
            None
        }
    };

    let controller = (!config.disable_mapping).then(|| {
        MappingController::new(
            GatewayMapper::new(),
            config.mapping_timeout(),
            config.mapping_lifetime_secs,
        )
    });

    let findings = probe(
        &outbound,
        &listener,
        controller.as_ref(),
        &server_info,
        gateway,
        config,
    )
    .await;

    let report = DiagnosticReport::aggregate(run_id, started_at, Utc::now(), findings);
    if report.mapping_works {
        info!("Your router's UPnP/NAT-PMP port mapping works!");
    }

    Ok(report)
}

/// Everything after the rendezvous lookup
///
/// `outbound` sends the connect-back request, `listener` is the endpoint the
/// responder dials back. Mapping is skipped when `controller` is `None`.
pub async fn probe<O, L, M>(
    outbound: &O,
    listener: &L,
    controller: Option<&MappingController<M>>,
    server: &ServerInfo,
    gateway: Option<Multiaddr>,
    config: &ClientConfig,
) -> Findings
where
    O: PeerHost,
    L: PeerHost,
    M: PortMapper,
{
    let mut findings = Findings {
        rendezvous_reachable: true,
        ..Findings::default()
    };

    let listen_addrs = listener.listen_addrs();
    debug!("Listener addresses: {:?}", listen_addrs);

    let Some(listen_addr) = primary_listen_addr(&listen_addrs).cloned() else {
        findings.exchange_error = Some("listener has no usable address".to_string());
        return findings;
    };

    findings.have_public_ip = is_publicly_addressable(&listen_addrs, &server.seen_addr);
    info!(
        "Seen as {}, publicly addressable: {}",
        server.seen_addr, findings.have_public_ip
    );

    let mapped = match controller {
        Some(controller) => {
            let result = controller.create_mapping(&listen_addr).await;
            if let Some(reason) = result.failure_reason() {
                warn!("Creation of NAT traversal mapping failed: {}", reason);
            }
            let mapped = result.mapped_addr().cloned();
            findings.nat = Some(result);
            mapped
        }
        None => None,
    };

    // Announce the listener to B from its own port
    match listener.connect(&server.peer_b, config.announce_timeout()).await {
        Ok(addr) => {
            debug!("Listener reached peer B at {}", addr);
            findings.tcp_reuseport_working = true;
        }
        Err(e) => warn!("Listener could not reach peer B: {}", e),
    }

    let request = ConnectBackRequest {
        peer_id: listener.peer_id().clone(),
        seen_gateway: gateway,
        port_mapped: mapped,
        listen_addr,
    };
    findings.request = Some(request.clone());

    let exchange = request_connect_back(
        outbound,
        &server.peer_a,
        &request,
        config.exchange_timeout(),
    );
    match exchange.await {
        Ok(result) => findings.response = Some(result),
        Err(e) => {
            warn!("Connect-back exchange failed: {}", e);
            findings.exchange_error = Some(e.to_string());
        }
    }

    if let Some(controller) = controller {
        controller.release().await;
    }

    findings
}
