//! Subject and service configuration
//!
//! Both sides read an optional JSON file. A missing or empty file yields the
//! defaults, and any field left out of the file keeps its default. Command
//! line flags are applied on top by the binaries.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Rendezvous service queried when none is configured
pub const DEFAULT_SERVER_URL: &str = "http://mars.i.ipfs.team:7777";

/// Well-known HTTPS endpoint used by the fallback probe
pub const DEFAULT_FALLBACK_PROBE_URL: &str = "https://ipfs.io/version";

/// Subject-side settings for one diagnostic run
///
/// # Example
/// ```rust,no_run
/// use natcheck::config::ClientConfig;
///
/// let mut config = ClientConfig::load("natcheck.json").expect("Failed to load");
/// config.listen_port = 4001;
/// config.save("natcheck.json").expect("Failed to save");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the rendezvous service
    pub server_url: String,
    /// Port the listener endpoint binds (0 = any)
    pub listen_port: u16,
    /// Skip the NAT mapping attempt
    pub disable_mapping: bool,
    /// Timeout for the rendezvous lookup in seconds
    pub fetch_timeout_secs: u64,
    /// Timeout for the whole mapping attempt in seconds
    pub mapping_timeout_secs: u64,
    /// Requested lease for the NAT mapping in seconds
    pub mapping_lifetime_secs: u32,
    /// Timeout for the listener announce to peer B in seconds
    pub announce_timeout_secs: u64,
    /// Timeout for the connect-back exchange in seconds, above the
    /// responder's dial-back bound
    pub exchange_timeout_secs: u64,
    /// URL used to test plain outbound HTTPS when the service is unreachable
    pub fallback_probe_url: String,
}

impl ClientConfig {
    /// Load from a JSON file, falling back to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path.as_ref())
    }

    /// Save to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(self, path.as_ref())
    }

    /// Rendezvous lookup timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Mapping attempt timeout
    pub fn mapping_timeout(&self) -> Duration {
        Duration::from_secs(self.mapping_timeout_secs)
    }

    /// Listener announce timeout
    pub fn announce_timeout(&self) -> Duration {
        Duration::from_secs(self.announce_timeout_secs)
    }

    /// Connect-back exchange timeout
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            listen_port: 0,
            disable_mapping: false,
            fetch_timeout_secs: 10,
            mapping_timeout_secs: 15,
            mapping_lifetime_secs: 300,
            announce_timeout_secs: 10,
            exchange_timeout_secs: 30,
            fallback_probe_url: DEFAULT_FALLBACK_PROBE_URL.to_string(),
        }
    }
}

/// Rendezvous service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port of the HTTP `/peerinfo` endpoint
    pub http_port: u16,
    /// Bind address of peer A (connect-back responder)
    pub peer_a_listen: SocketAddr,
    /// Bind address of peer B
    pub peer_b_listen: SocketAddr,
    /// Directory holding the persisted peer keys
    pub key_dir: String,
    /// Public IP advertised instead of interface addresses (when behind a
    /// 1:1 NAT or load balancer)
    pub public_ip: Option<IpAddr>,
    /// Bound on each connect-back dial in seconds
    pub dial_timeout_secs: u64,
}

impl ServerConfig {
    /// Load from a JSON file, falling back to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path.as_ref())
    }

    /// Save to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(self, path.as_ref())
    }

    /// Connect-back dial timeout
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 7777,
            peer_a_listen: SocketAddr::from(([0, 0, 0, 0], 0)),
            peer_b_listen: SocketAddr::from(([0, 0, 0, 0], 0)),
            key_dir: "./natcheck-keys".to_string(),
            public_ip: None,
            dial_timeout_secs: crate::exchange::responder::DEFAULT_DIAL_TIMEOUT.as_secs(),
        }
    }
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    // Empty file means defaults
    if data.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&data)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, json)
        .map_err(|e| Error::Config(format!("Failed to write {}: {}", path.display(), e)))
}
