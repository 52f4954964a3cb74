//! boardlink - WebSocket link to microcontroller I/O.
//!
//! This library controls the pins and peripherals of a WiFi-capable
//! microcontroller (UNO R4 WiFi, ESP32) running the companion WebSocket
//! firmware.
//!
//! # Architecture
//!
//! The link follows a client-device model:
//!
//! - **Client (Rust)**: Queues commands, batches them onto the wire,
//!   consumes pushed readings
//! - **Device (firmware)**: Executes commands against real pins, pushes
//!   readings at registered intervals
//!
//! Key design principles:
//!
//! - One [`Link`] owns: WebSocket connection + outbound queue + event loop
//! - Commands batch into single JSON frames, strict FIFO, even across
//!   reconnects
//! - Throttle gates (time + change threshold) keep chatty callers off the
//!   wire
//! - Connection trouble never surfaces as errors from pin or peripheral
//!   calls; poll [`Link::status`] instead
//!
//! # Quick Start
//!
//! ```no_run
//! use boardlink::{Link, PinMode, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let link = Link::connect("192.168.1.50")?;
//!
//!     // Raw pins
//!     link.pin_mode(13, PinMode::Output);
//!     link.digital_write(13, 1);
//!     let light = link.analog_read(14);
//!     println!("light level: {light}");
//!
//!     // Peripherals
//!     let servo = link.add_servo("arm")?;
//!     servo.attach(9);
//!     servo.write(45.0);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`link`] | The [`Link`] handle, builder, and event loop |
//! | [`peripheral`] | Typed handles: [`Servo`], [`PixelStrip`], [`Ultrasonic`] |
//! | [`protocol`] | Wire constants and frame types |
//! | [`session`] | Queue, reconnection, registry, router (internal) |
//! | [`transport`] | WebSocket transport layer (internal) |
//! | [`error`] | Error types and [`Result`] alias |
//!
//! # Features
//!
//! - **Resilient**: Exponential-backoff reconnection; queued commands
//!   survive the outage and flush in order
//! - **Bandwidth-aware**: Per-channel throttle and change thresholds
//! - **Push-based reads**: The device reports at registered intervals; no
//!   request/response round trip per read

// ============================================================================
// Modules
// ============================================================================

/// Clock abstraction for the throttle gates.
pub mod clock;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// The device link: handle, builder, and event loop.
///
/// Use [`Link::builder()`] or [`Link::connect()`] to open a link.
pub mod link;

/// Typed peripheral handles and the registration table.
///
/// - [`Servo`] - Hobby servo (attach, write, sweep)
/// - [`PixelStrip`] - Addressable RGB(W) strip (buffered, show-to-flush)
/// - [`Ultrasonic`] - Distance sensor (push-based readings)
pub mod peripheral;

/// Wire protocol: action codes, id spaces, frame types.
pub mod protocol;

/// Connection/session core.
///
/// Internal module: outbound queue, reconnection backoff, event registry,
/// inbound router.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module handling connection and frame transmission.
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

// Link types
pub use link::{Link, LinkBuilder, LinkStatus};

// Session types
pub use session::ConnectionState;

// Peripheral types
pub use peripheral::{
    ColorSpec, MessageHandler, PeripheralInfo, PixelStrip, Servo, Ultrasonic, Unit,
};

// Protocol types
pub use protocol::{BatchFrame, CommandDescriptor, DecodedMessage, PinMode};

// Error types
pub use error::{Error, Result};
