//! Common types for connectivity module

use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

/// Result of a port mapping operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortMappingResult {
    /// External IP address visible to the internet
    pub external_ip: IpAddr,
    /// External port mapped on the gateway
    pub external_port: u16,
    /// Lifetime of the mapping in seconds
    pub lifetime_secs: u32,
    /// Protocol used for the mapping
    pub protocol: MappingProtocol,
    /// Timestamp when mapping was created (Unix milliseconds)
    pub created_at_ms: i64,
}

/// Protocols available for port mapping
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MappingProtocol {
    /// NAT Port Mapping Protocol (RFC 6886)
    NATPMP,
    /// Universal Plug and Play
    UPnP,
}

/// Errors that can occur during port mapping
#[derive(Debug, Error)]
pub enum MappingError {
    /// Network timeout waiting for response
    #[error("Mapping request timed out")]
    Timeout,

    /// Invalid response from gateway
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Gateway returned an error
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// No gateway found on network
    #[error("No gateway found")]
    NoGateway,

    /// IO error during communication
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol not supported by gateway
    #[error("Protocol not supported")]
    NotSupported,

    /// Every mapping protocol was tried and failed
    #[error("No mapping protocol succeeded: {0}")]
    AllFailed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of the single mapping attempt of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NatMappingResult {
    /// The gateway forwards `external_addr` to us
    Mapped {
        /// Externally routable address
        external_addr: Multiaddr,
        /// Protocol that created the mapping
        protocol: MappingProtocol,
    },
    /// No mapping could be created
    Failed {
        /// Failure cause, verbatim
        reason: String,
    },
}

impl NatMappingResult {
    /// Create a failed result
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// The mapped external address, if any
    pub fn mapped_addr(&self) -> Option<&Multiaddr> {
        match self {
            Self::Mapped { external_addr, .. } => Some(external_addr),
            Self::Failed { .. } => None,
        }
    }

    /// The failure reason, if any
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Mapped { .. } => None,
            Self::Failed { reason } => Some(reason),
        }
    }
}
