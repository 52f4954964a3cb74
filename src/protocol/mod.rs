//! Wire protocol types.
//!
//! This module defines the message format between the host (Rust) and the
//! device firmware, plus the id and action-code tables both sides share.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`BatchFrame`] | Host → Device | Batched command descriptors |
//! | [`InboundFrame`] | Device → Host | Batched readings |
//!
//! # Id Spaces
//!
//! | Range | Meaning |
//! |-------|---------|
//! | `0..1000` | Raw pins/channels |
//! | `1000..2000` | Servo messages (logical id = id − 1000) |
//! | `2000..3000` | Ultrasonic messages (logical id = id − 2000) |

// ============================================================================
// Submodules
// ============================================================================

/// Protocol ids and action codes.
pub mod defs;

/// Wire frame types.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use defs::PinMode;
pub use frame::{BatchFrame, CommandDescriptor, DecodedMessage, FrameHeader, InboundFrame, InboundItem};
