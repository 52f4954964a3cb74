//! Shared helpers for integration-style tests: a mock device endpoint and
//! frame-level assertions against what the link puts on the wire.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, accept_async};

use crate::link::Link;
use crate::protocol::BatchFrame;
use crate::transport::WsStream;

pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Installs the test tracing subscriber. Safe to call from every test;
/// only the first call wins.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Binds a mock device endpoint on a random local port.
pub(crate) async fn mock_device() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock device");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

/// Opens a link to a mock device with test-friendly backoff settings.
pub(crate) fn test_link(port: u16) -> Link {
    Link::builder()
        .host("127.0.0.1")
        .port(port)
        .base_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(50))
        .connect()
        .expect("valid config")
}

/// Accepts one WebSocket connection from the link.
pub(crate) async fn accept_link(listener: &TcpListener) -> WsStream {
    let (stream, _) = timeout(TEST_TIMEOUT, listener.accept())
        .await
        .expect("link should connect")
        .expect("accept");
    accept_async(MaybeTlsStream::Plain(stream))
        .await
        .expect("websocket upgrade")
}

/// Reads the next batch frame sent by the link.
pub(crate) async fn next_batch(stream: &mut WsStream) -> BatchFrame {
    loop {
        let message = timeout(TEST_TIMEOUT, stream.next())
            .await
            .expect("frame should arrive")
            .expect("stream open")
            .expect("no websocket error");

        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("valid batch frame");
        }
    }
}

/// Polls until the predicate holds or the test times out.
pub(crate) async fn wait_until(predicate: impl Fn() -> bool) {
    timeout(TEST_TIMEOUT, async {
        while !predicate() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should hold before timeout");
}

/// Asserts the link sends nothing for the given window.
pub(crate) async fn assert_silent(stream: &mut WsStream, window: Duration) {
    let outcome = timeout(window, stream.next()).await;
    assert!(outcome.is_err(), "unexpected frame on the wire");
}
