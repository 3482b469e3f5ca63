//! natcheck - connect-back reachability diagnostics
//!
//! This library determines whether a host can be reached from the public
//! internet, either directly or through an automatic NAT port mapping. A
//! subject asks a rendezvous service to dial it back and classifies the
//! outcome into a single [`report::DiagnosticReport`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod classify;
pub mod config;
pub mod connectivity;
pub mod diagnose;
pub mod exchange;
pub mod host;
pub mod identity;
pub mod outbound;
pub mod protocol;
pub mod rendezvous;
pub mod report;
pub mod service;

#[cfg(test)]
mod tests;

use std::time::Duration;

/// Result type alias for natcheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for natcheck operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The rendezvous lookup failed (network or decode)
    #[error("Service unreachable: {0}")]
    ServiceUnreachable(String),

    /// A NAT port mapping could not be created
    #[error("Mapping failed: {0}")]
    MappingFailed(String),

    /// The connect-back stream to the rendezvous peer could not be opened
    #[error("Exchange unreachable: {0}")]
    ExchangeUnreachable(String),

    /// The responder could not dial any candidate address
    #[error("Connect-back failed: {0}")]
    ConnectBackFailed(String),

    /// A connect-back payload or transport frame could not be decoded
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Identity key error
    #[error("Identity error: {0}")]
    Identity(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// A bounded operation ran out of time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl From<connectivity::MappingError> for Error {
    fn from(err: connectivity::MappingError) -> Self {
        Error::MappingFailed(err.to_string())
    }
}

/// Initialize logging
///
/// Logs go to stderr so the JSON report on stdout stays machine readable.
pub fn init(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
