//! Requester side of the connect-back exchange

use crate::host::{PeerHost, PeerInfo};
use crate::protocol::{read_message, write_message, ConnectBackRequest, ConnectBackResult, PROTOCOL};
use crate::{Error, Result};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Ask `responder` to dial back the endpoint described by `request`
///
/// Sending the request and waiting for the result is bounded by `timeout`,
/// which must cover the responder's own dial-back bound.
///
/// # Errors
///
/// - [`Error::ExchangeUnreachable`] when no stream can be opened
/// - [`Error::MalformedPayload`] when the reply does not decode
/// - [`Error::Transport`] when the stream breaks mid-exchange
/// - [`Error::Timeout`] when no result arrives within `timeout`
pub async fn request_connect_back<H: PeerHost>(
    host: &H,
    responder: &PeerInfo,
    request: &ConnectBackRequest,
    timeout: Duration,
) -> Result<ConnectBackResult> {
    info!("Requesting connect-back from {}", responder.id);

    let mut stream = host
        .open_stream(responder, PROTOCOL)
        .await
        .map_err(|e| Error::ExchangeUnreachable(e.to_string()))?;

    let exchange = async {
        write_message(&mut stream, request).await?;
        debug!("Connect-back request sent, waiting for result");
        read_message::<_, ConnectBackResult>(&mut stream).await
    };

    let result = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(stream_error)?;
    let _ = stream.shutdown().await;

    info!(
        "Connect-back result: success={} seen as {} ({} addresses tried)",
        result.success,
        result.seen_addr,
        result.tried_addrs.len()
    );

    Ok(result)
}

fn stream_error(e: Error) -> Error {
    match e {
        Error::Io(e) => Error::Transport(format!("connect-back stream failed: {}", e)),
        other => other,
    }
}
