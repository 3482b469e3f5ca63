//! Connect-back wire protocol
//!
//! This module defines the payloads exchanged on a `/nattest/1.0.0` stream
//! and the frame format used to carry them:
//! - [`ConnectBackRequest`] sent once by the requester
//! - [`ConnectBackResult`] written back by the responder
//! - length-prefixed JSON frames
//!
//! Field names follow the Go-style names used by existing deployments
//! (`PeerID`, `PortMapped`, ...). Unknown fields are ignored and optional
//! strings may be omitted or sent empty.

use crate::identity::PeerId;
use crate::{Error, Result};
use multiaddr::Multiaddr;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol tag for the connect-back exchange
pub const PROTOCOL: &str = "/nattest/1.0.0";

/// Largest frame accepted on any stream
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Request asking the responder to dial the requester back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectBackRequest {
    /// Peer id of the endpoint that should be dialed back
    #[serde(rename = "PeerID")]
    pub peer_id: PeerId,

    /// Default gateway seen by the requester
    #[serde(
        rename = "SeenGateway",
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_addr"
    )]
    pub seen_gateway: Option<Multiaddr>,

    /// External address from the port mapping, absent when no mapping exists
    #[serde(
        rename = "PortMapped",
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_addr"
    )]
    pub port_mapped: Option<Multiaddr>,

    /// Local address the dial-back target listens on
    #[serde(rename = "ListenAddr")]
    pub listen_addr: Multiaddr,
}

impl ConnectBackRequest {
    /// Create a request with no mapping and no gateway
    pub fn new(peer_id: PeerId, listen_addr: Multiaddr) -> Self {
        Self {
            peer_id,
            seen_gateway: None,
            port_mapped: None,
            listen_addr,
        }
    }

    /// Encode to JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::JsonSerialization)
    }

    /// Decode from JSON
    pub fn from_json(data: &[u8]) -> Result<Self> {
        decode(data)
    }
}

/// Failure message used when the dial error had no text
const UNKNOWN_FAILURE: &str = "connect-back failed";

/// Outcome of a connect-back attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectBackResult {
    /// Address the request stream was seen to arrive from
    #[serde(rename = "SeenAddr")]
    pub seen_addr: Multiaddr,

    /// Whether the responder managed to dial back
    #[serde(rename = "ConnectBackSuccess")]
    pub success: bool,

    /// Failure cause when the dial did not succeed
    #[serde(
        rename = "ConnectBackMsg",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_string_as_none"
    )]
    pub failure_message: Option<String>,

    /// Address that worked
    #[serde(
        rename = "ConnectBackAddr",
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_addr"
    )]
    pub successful_addr: Option<Multiaddr>,

    /// Every address handed to the dial, in order
    #[serde(rename = "TriedAddrs", default, deserialize_with = "nullable_vec")]
    pub tried_addrs: Vec<Multiaddr>,
}

impl ConnectBackResult {
    /// A successful dial-back through `addr`
    pub fn success(seen_addr: Multiaddr, addr: Multiaddr, tried_addrs: Vec<Multiaddr>) -> Self {
        Self {
            seen_addr,
            success: true,
            failure_message: None,
            successful_addr: Some(addr),
            tried_addrs,
        }
    }

    /// A failed dial-back with its cause
    ///
    /// An empty message would read back as absent, so it is replaced.
    pub fn failure(seen_addr: Multiaddr, message: String, tried_addrs: Vec<Multiaddr>) -> Self {
        let message = if message.is_empty() {
            UNKNOWN_FAILURE.to_string()
        } else {
            message
        };

        Self {
            seen_addr,
            success: false,
            failure_message: Some(message),
            successful_addr: None,
            tried_addrs,
        }
    }

    /// The working address, or the failure as [`Error::ConnectBackFailed`]
    pub fn outcome(&self) -> Result<&Multiaddr> {
        match (&self.successful_addr, self.success) {
            (Some(addr), true) => Ok(addr),
            _ => Err(Error::ConnectBackFailed(
                self.failure_message
                    .clone()
                    .unwrap_or_else(|| "no address reported".to_string()),
            )),
        }
    }

    /// Encode to JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::JsonSerialization)
    }

    /// Decode from JSON
    pub fn from_json(data: &[u8]) -> Result<Self> {
        decode(data)
    }
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| Error::MalformedPayload(e.to_string()))
}

/// Write one length-prefixed frame
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::MalformedPayload(format!(
            "Frame of {} bytes exceeds limit of {}",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::MalformedPayload(format!(
            "Frame of {} bytes exceeds limit of {}",
            len, MAX_FRAME_LEN
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Serialize `message` as JSON and write it as one frame
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    write_frame(writer, &payload).await
}

/// Read one frame and decode it as JSON
pub async fn read_message<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(reader).await?;
    decode(&payload)
}

fn empty_string_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn nullable_vec<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Optional multiaddr carried as a string, empty meaning absent
mod optional_addr {
    use multiaddr::Multiaddr;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Multiaddr>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(addr) => serializer.serialize_str(&addr.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Multiaddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.is_empty() => s.parse().map(Some).map_err(D::Error::custom),
            _ => Ok(None),
        }
    }
}
