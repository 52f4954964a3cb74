//! WebSocket client connection to the device.
//!
//! The device firmware serves a WebSocket endpoint on a fixed port
//! ([`DEVICE_PORT`]) at the root path; the caller supplies only a host or IP
//! address. This module owns connecting, frame encoding, and the close
//! handshake; the link's event loop owns the split read/write halves.

// ============================================================================
// Imports
// ============================================================================

use futures_util::SinkExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::BatchFrame;
use crate::protocol::defs::DEVICE_PORT;

// ============================================================================
// Types
// ============================================================================

/// The underlying WebSocket stream type.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a split stream.
pub type WsSink = SplitSink<WsStream, Message>;

/// Read half of a split stream.
pub type WsSource = SplitStream<WsStream>;

// ============================================================================
// Endpoint
// ============================================================================

/// Builds the device endpoint URL from a host or IP address.
///
/// Format: `ws://{host}:81/`.
///
/// # Errors
///
/// Returns [`Error::Config`] when the host does not form a valid URL (e.g.
/// it already carries a scheme or is empty).
pub fn endpoint_url(host: &str) -> Result<Url> {
    let host = host.trim();
    if host.is_empty() {
        return Err(Error::config("device host must not be empty"));
    }
    if host.contains("://") {
        return Err(Error::config(format!(
            "device host must be a bare host or IP, got URL: {host}"
        )));
    }

    Url::parse(&format!("ws://{host}:{DEVICE_PORT}/"))
        .map_err(|e| Error::config(format!("invalid device host {host:?}: {e}")))
}

// ============================================================================
// Connect
// ============================================================================

/// Opens a WebSocket connection to the device.
///
/// # Errors
///
/// Returns [`Error::Connection`] when the TCP connect or WebSocket upgrade
/// fails. Callers feed the failure to the reconnection manager; it is never
/// surfaced through pin or peripheral calls.
pub async fn connect(endpoint: &Url) -> Result<WsStream> {
    debug!(%endpoint, "Connecting to device");

    let (stream, response) = connect_async(endpoint.as_str())
        .await
        .map_err(|e| Error::connection(e.to_string()))?;

    trace!(status = %response.status(), "WebSocket upgrade completed");
    Ok(stream)
}

// ============================================================================
// Frames
// ============================================================================

/// Serializes and transmits one batch frame.
///
/// The frame is sent atomically as a single text message; it is never
/// partially transmitted at this layer.
///
/// # Errors
///
/// Returns [`Error::Json`] on serialization failure,
/// [`Error::ConnectionClosed`] when the channel is already closed, or
/// [`Error::WebSocket`] for other transport failures — the caller must not
/// assume the frame was delivered.
pub async fn send_frame(sink: &mut WsSink, frame: &BatchFrame) -> Result<()> {
    let json = serde_json::to_string(frame)?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Error::ConnectionClosed,
            other => Error::WebSocket(other),
        })?;

    trace!(descriptors = frame.len(), "Batch frame sent");
    Ok(())
}

/// Closes the write half, terminating the connection.
pub async fn close(sink: &mut WsSink) {
    if let Err(e) = sink.close().await {
        debug!(error = %e, "WebSocket close failed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::CommandDescriptor;

    #[test]
    fn test_endpoint_url_fixed_port_and_path() {
        let url = endpoint_url("192.168.1.50").expect("valid host");
        assert_eq!(url.as_str(), "ws://192.168.1.50:81/");
    }

    #[test]
    fn test_endpoint_url_hostname() {
        let url = endpoint_url("board.local").expect("valid host");
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(81));
        assert_eq!(url.path(), "/");
    }

    #[test]
    fn test_endpoint_url_rejects_empty_host() {
        let err = endpoint_url("  ").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_endpoint_url_rejects_full_url() {
        let err = endpoint_url("ws://192.168.1.50:81/").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_frame_wire_shape() {
        let frame = BatchFrame::new(vec![CommandDescriptor::new(13, 2, vec![1])]);
        let json = serde_json::to_string(&frame).expect("serialize");

        assert_eq!(
            json,
            r#"{"header":{"version":1},"data":[{"id":13,"action":2,"params":[1]}]}"#
        );
    }
}
