//! UPnP IGD (Internet Gateway Device) port mapping
//!
//! SSDP finds the IGD on the local network, SOAP talks to it. igd-next does
//! blocking I/O, so every call runs on the blocking pool.

use super::types::{MappingError, MappingProtocol, PortMappingResult};
use igd_next::PortMappingProtocol;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for gateway discovery
const UPNP_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempt to map `local` (IPv4 host address and port) on the gateway over TCP
///
/// The external port requested is the local port.
///
/// # Example
///
/// ```no_run
/// use natcheck::connectivity::try_upnp_mapping;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let local = "192.168.1.20:4001".parse()?;
/// let result = try_upnp_mapping(local, 300).await?;
/// println!("External address: {}:{}", result.external_ip, result.external_port);
/// # Ok(())
/// # }
/// ```
pub async fn try_upnp_mapping(
    local: SocketAddr,
    lifetime_secs: u32,
) -> Result<PortMappingResult, MappingError> {
    info!(
        "Attempting UPnP mapping for {} (lifetime: {}s)",
        local, lifetime_secs
    );

    if !local.is_ipv4() {
        return Err(MappingError::NotSupported);
    }

    tokio::task::spawn_blocking(move || upnp_mapping_blocking(local, lifetime_secs))
        .await
        .map_err(|e| MappingError::Internal(format!("Task join error: {}", e)))?
}

fn search_gateway() -> Result<igd_next::Gateway, MappingError> {
    igd_next::search_gateway(igd_next::SearchOptions {
        timeout: Some(UPNP_TIMEOUT),
        ..Default::default()
    })
    .map_err(|e| {
        debug!("UPnP gateway search failed: {}", e);
        MappingError::NoGateway
    })
}

fn upnp_mapping_blocking(
    local: SocketAddr,
    lifetime_secs: u32,
) -> Result<PortMappingResult, MappingError> {
    debug!("Searching for UPnP IGD gateway...");
    let gateway = search_gateway()?;
    debug!("Found UPnP gateway at {}", gateway.addr);

    let description = format!("natcheck-tcp-{}", local.port());

    gateway
        .add_port(PortMappingProtocol::TCP, local.port(), local, lifetime_secs, &description)
        .map_err(|e| {
            warn!("UPnP AddPortMapping failed: {}", e);
            MappingError::GatewayError(format!("AddPortMapping failed: {}", e))
        })?;

    let external_ip = gateway.get_external_ip().map_err(|e| {
        // Don't leave a mapping behind that we can't report
        let _ = gateway.remove_port(PortMappingProtocol::TCP, local.port());
        MappingError::GatewayError(format!("GetExternalIPAddress failed: {}", e))
    })?;

    let result = PortMappingResult {
        external_ip,
        external_port: local.port(),
        lifetime_secs,
        protocol: MappingProtocol::UPnP,
        created_at_ms: chrono::Utc::now().timestamp_millis(),
    };

    info!(
        "UPnP mapping successful: {}:{} (lifetime: {}s)",
        result.external_ip, result.external_port, result.lifetime_secs
    );

    Ok(result)
}

/// Delete a UPnP TCP port mapping
pub async fn delete_upnp_mapping(external_port: u16) -> Result<(), MappingError> {
    info!("Deleting UPnP mapping for port {}", external_port);

    tokio::task::spawn_blocking(move || {
        let gateway = search_gateway()?;
        gateway
            .remove_port(PortMappingProtocol::TCP, external_port)
            .map_err(|e| MappingError::GatewayError(format!("DeletePortMapping failed: {}", e)))?;

        info!("UPnP mapping deleted");
        Ok(())
    })
    .await
    .map_err(|e| MappingError::Internal(format!("Task join error: {}", e)))?
}
