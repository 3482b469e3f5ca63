//! Plain outbound HTTPS probe
//!
//! Used only after the rendezvous lookup failed, to tell "non-standard ports
//! are blocked" apart from "no outbound connectivity at all".

use crate::{Error, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Marker expected in the body of the default probe endpoint
const EXPECTED_BODY_MARKER: &str = "Protocol Version";

/// GET `url` over standard HTTPS and check the body looks genuine
///
/// An error means the request failed or the response was not what the
/// endpoint normally serves, which points at an intercepting proxy.
pub async fn probe_standard_https(url: &str, timeout: Duration) -> Result<()> {
    info!("Probing outbound HTTPS: {}", url);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Transport(format!("Client creation failed: {}", e)))?;

    let response = client.get(url).send().await.map_err(|e| {
        debug!("HTTPS probe request failed: {}", e);
        Error::Transport(e.to_string())
    })?;

    let body = response
        .text()
        .await
        .map_err(|e| Error::Transport(format!("Body read failed: {}", e)))?;

    if !body.contains(EXPECTED_BODY_MARKER) {
        warn!("HTTPS probe body did not contain {:?}", EXPECTED_BODY_MARKER);
        return Err(Error::Transport(
            "https connections appear to be MITMed".to_string(),
        ));
    }

    debug!("HTTPS probe succeeded");
    Ok(())
}
