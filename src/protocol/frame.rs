//! Wire frame types.
//!
//! Defines the message format between the host and the device firmware.
//!
//! # Outbound
//!
//! ```json
//! { "header": { "version": 1 },
//!   "data": [ { "id": 13, "action": 2, "params": [1] } ] }
//! ```
//!
//! # Inbound
//!
//! ```json
//! { "data": [ { "id": 14, "type": 5, "value": 512 } ] }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use super::defs::PROTOCOL_VERSION;

// ============================================================================
// CommandDescriptor
// ============================================================================

/// One unit of outbound work.
///
/// Immutable once enqueued; consumed exactly once when a batch is flushed.
/// `id` addresses either a raw pin (`0..1000`) or a device type id for
/// peripheral commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Target channel: pin number or device type id.
    pub id: u16,

    /// Action code (see [`crate::protocol::defs`]).
    pub action: u16,

    /// Action parameters, in wire order.
    pub params: Vec<i64>,
}

impl CommandDescriptor {
    /// Creates a descriptor.
    #[inline]
    #[must_use]
    pub fn new(id: u16, action: u16, params: Vec<i64>) -> Self {
        Self { id, action, params }
    }
}

// ============================================================================
// BatchFrame
// ============================================================================

/// Frame header carrying the protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Wire protocol version.
    pub version: u8,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
        }
    }
}

/// Wire-level outbound unit: a whole queue snapshot, sent atomically.
///
/// Constructed fresh per flush and never partially sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFrame {
    /// Frame header.
    pub header: FrameHeader,

    /// Descriptors in strict enqueue order.
    pub data: Vec<CommandDescriptor>,
}

impl BatchFrame {
    /// Wraps a drained queue snapshot into a frame.
    #[inline]
    #[must_use]
    pub fn new(data: Vec<CommandDescriptor>) -> Self {
        Self {
            header: FrameHeader::default(),
            data,
        }
    }

    /// Number of descriptors in the frame.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the frame carries no descriptors.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// One decoded item of an inbound batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InboundItem {
    /// Raw inbound id: pin number or offset peripheral id.
    pub id: u16,

    /// Action code of the read this item answers.
    #[serde(rename = "type")]
    pub kind: u16,

    /// Reported value.
    pub value: f64,
}

/// A batch of readings pushed by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Items in device order.
    #[serde(default)]
    pub data: Vec<InboundItem>,
}

// ============================================================================
// DecodedMessage
// ============================================================================

/// An inbound item after routing, as delivered to a peripheral handler.
///
/// `id` has had the device-type offset removed and equals the peripheral's
/// logical id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedMessage {
    /// Logical id of the addressed peripheral.
    pub id: u16,

    /// Action code of the read this message answers.
    pub kind: u16,

    /// Reported value, delivered unmodified.
    pub value: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_frame_serialization() {
        let frame = BatchFrame::new(vec![
            CommandDescriptor::new(13, 2, vec![1]),
            CommandDescriptor::new(201, 22, vec![0, 90]),
        ]);

        let json = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(json["header"]["version"], 1);
        assert_eq!(json["data"][0]["id"], 13);
        assert_eq!(json["data"][0]["action"], 2);
        assert_eq!(json["data"][0]["params"][0], 1);
        assert_eq!(json["data"][1]["params"][1], 90);
    }

    #[test]
    fn test_batch_frame_preserves_order() {
        let descriptors: Vec<_> = (0..10)
            .map(|i| CommandDescriptor::new(i, 2, vec![i64::from(i)]))
            .collect();
        let frame = BatchFrame::new(descriptors.clone());

        assert_eq!(frame.len(), 10);
        assert_eq!(frame.data, descriptors);
    }

    #[test]
    fn test_inbound_frame_deserialization() {
        let json = r#"{ "data": [ { "id": 14, "type": 5, "value": 512 },
                                  { "id": 2000, "type": 32, "value": 43.5 } ] }"#;

        let frame: InboundFrame = serde_json::from_str(json).expect("parse");
        assert_eq!(frame.data.len(), 2);
        assert_eq!(frame.data[0].id, 14);
        assert_eq!(frame.data[0].kind, 5);
        assert_eq!(frame.data[1].value, 43.5);
    }

    #[test]
    fn test_inbound_frame_missing_data_is_empty() {
        let frame: InboundFrame = serde_json::from_str("{}").expect("parse");
        assert!(frame.data.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        let frame = BatchFrame::new(Vec::new());
        assert!(frame.is_empty());
        assert_eq!(frame.len(), 0);
    }
}
