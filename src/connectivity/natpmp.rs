//! NAT-PMP (NAT Port Mapping Protocol) implementation - RFC 6886
//!
//! NAT-PMP uses UDP on port 5351 to talk to the default gateway. A mapping
//! takes two round trips: one MAP request for the port and one external
//! address request for the public IP.
//!
//! # Example
//!
//! ```no_run
//! use natcheck::connectivity::try_natpmp_mapping;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let result = try_natpmp_mapping(8080, 3600).await?;
//! println!("External address: {}:{}", result.external_ip, result.external_port);
//! # Ok(())
//! # }
//! ```

use super::gateway::find_default_gateway;
use super::types::{MappingError, MappingProtocol, PortMappingResult};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// NAT-PMP server port (IANA assigned)
const NATPMP_SERVER_PORT: u16 = 5351;

/// NAT-PMP protocol version
pub(crate) const NATPMP_VERSION: u8 = 0;

/// Default timeout for NAT-PMP requests
const NATPMP_TIMEOUT: Duration = Duration::from_secs(2);

/// NAT-PMP opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum NatPmpOpcode {
    /// External address request
    ExternalAddress = 0,
    /// TCP port mapping
    MapTcp = 2,
}

/// NAT-PMP result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub(crate) enum NatPmpResultCode {
    Success = 0,
    UnsupportedVersion = 1,
    NotAuthorized = 2,
    NetworkFailure = 3,
    OutOfResources = 4,
    UnsupportedOpcode = 5,
}

impl NatPmpResultCode {
    pub(crate) fn from_u16(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::UnsupportedVersion),
            2 => Some(Self::NotAuthorized),
            3 => Some(Self::NetworkFailure),
            4 => Some(Self::OutOfResources),
            5 => Some(Self::UnsupportedOpcode),
            _ => None,
        }
    }

    pub(crate) fn to_error_message(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::UnsupportedVersion => "Unsupported NAT-PMP version",
            Self::NotAuthorized => "Not authorized/refused",
            Self::NetworkFailure => "Network failure",
            Self::OutOfResources => "Out of resources",
            Self::UnsupportedOpcode => "Unsupported opcode",
        }
    }
}

/// External port and lease granted by a MAP response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NatPmpMapping {
    pub external_port: u16,
    pub lifetime_secs: u32,
}

/// Attempt to create a TCP port mapping using NAT-PMP
///
/// # Arguments
///
/// * `local_port` - The local port to map
/// * `lifetime_secs` - Requested lifetime in seconds (0 = delete mapping)
pub async fn try_natpmp_mapping(
    local_port: u16,
    lifetime_secs: u32,
) -> Result<PortMappingResult, MappingError> {
    info!(
        "Attempting NAT-PMP mapping for port {} (lifetime: {}s)",
        local_port, lifetime_secs
    );

    let gateway = find_default_gateway()?;
    debug!("Found default gateway: {}", gateway);

    let request = build_natpmp_map_request(local_port, local_port, lifetime_secs);
    let response = natpmp_transact(gateway, &request, 16).await?;
    let mapping = parse_natpmp_map_response(&response, local_port)?;

    // MAP responses carry no address; ask for it separately
    let external_request = [NATPMP_VERSION, NatPmpOpcode::ExternalAddress as u8];
    let response = natpmp_transact(gateway, &external_request, 12).await?;
    let external_ip = parse_natpmp_external_response(&response)?;

    let result = PortMappingResult {
        external_ip: IpAddr::V4(external_ip),
        external_port: mapping.external_port,
        lifetime_secs: mapping.lifetime_secs,
        protocol: MappingProtocol::NATPMP,
        created_at_ms: chrono::Utc::now().timestamp_millis(),
    };

    info!(
        "NAT-PMP mapping successful: {}:{} (lifetime: {}s)",
        result.external_ip, result.external_port, result.lifetime_secs
    );

    Ok(result)
}

/// Remove a TCP mapping (RFC 6886 §3.4: lifetime 0, external port 0)
pub async fn delete_natpmp_mapping(local_port: u16) -> Result<(), MappingError> {
    info!("Deleting NAT-PMP mapping for port {}", local_port);

    let gateway = find_default_gateway()?;
    let request = build_natpmp_map_request(local_port, 0, 0);
    let response = natpmp_transact(gateway, &request, 16).await?;
    parse_natpmp_map_response(&response, local_port)?;
    Ok(())
}

/// Send one request to the gateway and wait for a response of `expected_len` bytes
async fn natpmp_transact(
    gateway: IpAddr,
    request: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>, MappingError> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let server_addr = SocketAddr::new(gateway, NATPMP_SERVER_PORT);

    socket.send_to(request, server_addr).await?;
    debug!("Sent NAT-PMP request ({} bytes) to {}", request.len(), server_addr);

    let mut buf = vec![0u8; expected_len];
    let (received, _) = tokio::time::timeout(NATPMP_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .map_err(|_| MappingError::Timeout)??;

    debug!("Received {} bytes from NAT-PMP server", received);
    buf.truncate(received);
    Ok(buf)
}

/// Build a NAT-PMP TCP MAP request packet
pub(crate) fn build_natpmp_map_request(
    internal_port: u16,
    suggested_external_port: u16,
    lifetime_secs: u32,
) -> Vec<u8> {
    let mut request = Vec::with_capacity(12);

    request.push(NATPMP_VERSION);
    request.push(NatPmpOpcode::MapTcp as u8);

    // Reserved, must be zero
    request.extend_from_slice(&[0u8; 2]);

    request.extend_from_slice(&internal_port.to_be_bytes());
    request.extend_from_slice(&suggested_external_port.to_be_bytes());
    request.extend_from_slice(&lifetime_secs.to_be_bytes());

    request
}

/// Check version, opcode and result code shared by all responses
fn check_response_header(response: &[u8], expected_opcode: u8) -> Result<(), MappingError> {
    let version = response[0];
    if version != NATPMP_VERSION {
        return Err(MappingError::InvalidResponse(format!(
            "Invalid version: {} (expected {})",
            version, NATPMP_VERSION
        )));
    }

    let opcode = response[1];
    if opcode < 128 {
        return Err(MappingError::InvalidResponse(
            "Received request instead of response".to_string(),
        ));
    }
    if opcode != expected_opcode {
        return Err(MappingError::InvalidResponse(format!(
            "Unexpected opcode: {} (expected {})",
            opcode, expected_opcode
        )));
    }

    let result_code = u16::from_be_bytes([response[2], response[3]]);
    let result = NatPmpResultCode::from_u16(result_code).ok_or_else(|| {
        MappingError::InvalidResponse(format!("Unknown result code: {}", result_code))
    })?;

    if result != NatPmpResultCode::Success {
        return Err(MappingError::GatewayError(
            result.to_error_message().to_string(),
        ));
    }

    Ok(())
}

/// Parse the answer to a TCP MAP request for `internal_port`
pub(crate) fn parse_natpmp_map_response(
    response: &[u8],
    internal_port: u16,
) -> Result<NatPmpMapping, MappingError> {
    if response.len() < 16 {
        return Err(MappingError::InvalidResponse(format!(
            "Response too short: {} bytes (expected 16)",
            response.len()
        )));
    }

    check_response_header(response, 128 + NatPmpOpcode::MapTcp as u8)?;

    // Bytes 4-7 hold seconds since the gateway's epoch, unused here
    let answered_port = u16::from_be_bytes([response[8], response[9]]);
    if answered_port != internal_port {
        return Err(MappingError::InvalidResponse(format!(
            "Response is for internal port {} (requested {})",
            answered_port, internal_port
        )));
    }

    Ok(NatPmpMapping {
        external_port: u16::from_be_bytes([response[10], response[11]]),
        lifetime_secs: u32::from_be_bytes([
            response[12],
            response[13],
            response[14],
            response[15],
        ]),
    })
}

/// Parse a NAT-PMP external address response packet
pub(crate) fn parse_natpmp_external_response(response: &[u8]) -> Result<Ipv4Addr, MappingError> {
    if response.len() < 12 {
        return Err(MappingError::InvalidResponse(format!(
            "External IP response too short: {} bytes",
            response.len()
        )));
    }

    check_response_header(response, 128 + NatPmpOpcode::ExternalAddress as u8)?;

    Ok(Ipv4Addr::new(
        response[8],
        response[9],
        response[10],
        response[11],
    ))
}
