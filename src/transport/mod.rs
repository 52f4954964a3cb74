//! WebSocket transport layer.
//!
//! Owns the low-level bidirectional connection to the device. The link's
//! event loop drives the split read/write halves directly; this module
//! provides connecting, the endpoint convention, and frame transmission.
//!
//! ```text
//! ┌──────────────┐                          ┌──────────────────┐
//! │  Link (Rust) │         WebSocket        │  Device firmware │
//! │  event loop  │◄────────────────────────►│  (UNO R4 WiFi,   │
//! │              │      ws://host:81/       │   ESP32)         │
//! └──────────────┘                          └──────────────────┘
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client connection to the device.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use socket::{WsSink, WsSource, WsStream, close, connect, endpoint_url, send_frame};
