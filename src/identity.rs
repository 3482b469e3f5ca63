//! Peer identity module
//!
//! Every peer endpoint is identified by a [`PeerId`] derived from an Ed25519
//! public key fingerprint. Subject endpoints use throwaway keys generated per
//! run; the rendezvous service persists its keys so its peer ids survive
//! restarts.

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use ring::digest::{Context, SHA256};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Length of a peer id in hex characters (16 fingerprint bytes)
const PEER_ID_HEX_LEN: usize = 32;

/// Unique peer identifier derived from a public key fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct PeerId(String);

impl PeerId {
    /// Create a PeerId from a public key by computing its SHA-256 fingerprint
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let mut context = Context::new(&SHA256);
        context.update(public_key);
        let digest = context.finish();

        // First 16 bytes of the digest give a 32-character id
        PeerId(hex::encode(&digest.as_ref()[..16]))
    }

    /// Get the PeerId as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let valid = s.len() == PEER_ID_HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        if !valid {
            return Err(Error::Identity(format!("Invalid peer id: {:?}", s)));
        }

        Ok(PeerId(s.to_string()))
    }
}

impl TryFrom<String> for PeerId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Ed25519 signing key together with its derived peer id
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    peer_id: PeerId,
}

impl Keypair {
    /// Generate a fresh keypair
    pub fn generate() -> Self {
        use rand::rngs::OsRng;

        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Rebuild a keypair from its 32-byte secret
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Identity("Invalid secret key length".to_string()))?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&secret)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let peer_id = PeerId::from_public_key(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            peer_id,
        }
    }

    /// The peer id for this keypair
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Raw public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a message with the secret key
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Load a persisted keypair, or generate and persist a new one
    ///
    /// The file holds the base64-encoded 32-byte secret.
    pub fn load_or_generate<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let data = std::fs::read_to_string(path).map_err(|e| {
                Error::Identity(format!("Failed to read key file {}: {}", path.display(), e))
            })?;
            let bytes = STANDARD.decode(data.trim()).map_err(|e| {
                Error::Identity(format!("Failed to decode key file {}: {}", path.display(), e))
            })?;
            let keypair = Self::from_secret_bytes(&bytes)?;
            debug!("Loaded identity {} from {}", keypair.peer_id, path.display());
            return Ok(keypair);
        }

        let keypair = Self::generate();
        keypair.save(path)?;
        info!("Generated new identity {} at {}", keypair.peer_id, path.display());
        Ok(keypair)
    }

    /// Persist the secret key to disk
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Identity(format!("Failed to create key directory: {}", e)))?;
        }

        let encoded = STANDARD.encode(self.signing_key.to_bytes());
        std::fs::write(path, encoded)
            .map_err(|e| Error::Identity(format!("Failed to write key file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

/// Check that `public_key` fingerprints to `expected` and signed `message`
pub fn verify_peer(
    expected: &PeerId,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    let actual = PeerId::from_public_key(public_key);
    if &actual != expected {
        return Err(Error::Identity(format!(
            "Peer id mismatch: expected {}, got {}",
            expected, actual
        )));
    }

    let verifying_key = VerifyingKey::from_bytes(
        public_key
            .try_into()
            .map_err(|_| Error::Identity("Invalid public key length".to_string()))?,
    )
    .map_err(|e| Error::Identity(format!("Invalid public key: {}", e)))?;

    let signature = Signature::from_bytes(
        signature
            .try_into()
            .map_err(|_| Error::Identity("Invalid signature length".to_string()))?,
    );

    verifying_key
        .verify(message, &signature)
        .map_err(|_| Error::Identity(format!("Signature from {} did not verify", expected)))
}

/// Persisted identities of the two standing rendezvous peers
///
/// Loaded once at service start and handed to the service constructor.
#[derive(Debug, Clone)]
pub struct ServiceIdentity {
    /// Key for peer A (connect-back responder)
    pub peer_a: Keypair,
    /// Key for peer B
    pub peer_b: Keypair,
}

impl ServiceIdentity {
    /// Load `peer_a.key` and `peer_b.key` from `key_dir`, creating them if needed
    pub fn load<P: AsRef<Path>>(key_dir: P) -> Result<Self> {
        let key_dir = key_dir.as_ref();
        Ok(Self {
            peer_a: Keypair::load_or_generate(key_dir.join("peer_a.key"))?,
            peer_b: Keypair::load_or_generate(key_dir.join("peer_b.key"))?,
        })
    }
}
