//! Inbound frame decoding and dispatch.
//!
//! Each decoded item either updates the event registry (raw pin ids) or is
//! forwarded to the peripheral whose device type and logical id match its
//! offset id space. Unmatched items are reported and dropped; a bad frame
//! never closes the connection.

// ============================================================================
// Imports
// ============================================================================

use tracing::warn;

use crate::error::{Error, Result};
use crate::peripheral::PeripheralTable;
use crate::protocol::defs::{
    PIN_ID_LIMIT, SERVO_CONTROL, SERVO_MESSAGE_BASE, ULTRASONIC_CONTROL, ULTRASONIC_MESSAGE_BASE,
    MESSAGE_SPACE_WIDTH,
};
use crate::protocol::{DecodedMessage, InboundFrame, InboundItem};

use super::registry::EventRegistry;

// ============================================================================
// Route
// ============================================================================

/// Destination class of one inbound id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Raw pin reading: update the event registry.
    Pin,
    /// Peripheral message for a device type, with the logical id recovered
    /// by subtracting the type's id-space base.
    Peripheral {
        /// Device type id owning the id space.
        device_type: u16,
        /// Logical id within the type.
        logical_id: u16,
    },
    /// Id falls outside every known space.
    Unknown,
}

/// Classifies a raw inbound id into its routing destination.
#[must_use]
pub fn classify(id: u16) -> Route {
    if id < PIN_ID_LIMIT {
        return Route::Pin;
    }
    if (SERVO_MESSAGE_BASE..SERVO_MESSAGE_BASE + MESSAGE_SPACE_WIDTH).contains(&id) {
        return Route::Peripheral {
            device_type: SERVO_CONTROL,
            logical_id: id - SERVO_MESSAGE_BASE,
        };
    }
    if (ULTRASONIC_MESSAGE_BASE..ULTRASONIC_MESSAGE_BASE + MESSAGE_SPACE_WIDTH).contains(&id) {
        return Route::Peripheral {
            device_type: ULTRASONIC_CONTROL,
            logical_id: id - ULTRASONIC_MESSAGE_BASE,
        };
    }
    Route::Unknown
}

// ============================================================================
// RouteSummary
// ============================================================================

/// Per-frame routing outcome, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteSummary {
    /// Items that updated the event registry.
    pub pin_updates: usize,
    /// Items delivered to a peripheral handler.
    pub delivered: usize,
    /// Items dropped for lack of a matching registration.
    pub unmatched: usize,
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes one raw inbound text frame.
///
/// # Errors
///
/// Returns [`Error::Decode`] on malformed JSON; callers log and drop the
/// frame, leaving the connection open.
pub fn decode_frame(text: &str) -> Result<InboundFrame> {
    serde_json::from_str(text).map_err(|e| Error::decode(e.to_string()))
}

// ============================================================================
// Routing
// ============================================================================

/// Routes every item of an inbound frame.
pub fn route_frame(
    frame: &InboundFrame,
    registry: &mut EventRegistry,
    peripherals: &mut PeripheralTable,
) -> RouteSummary {
    let mut summary = RouteSummary::default();

    for item in &frame.data {
        route_item(item, registry, peripherals, &mut summary);
    }

    summary
}

fn route_item(
    item: &InboundItem,
    registry: &mut EventRegistry,
    peripherals: &mut PeripheralTable,
    summary: &mut RouteSummary,
) {
    match classify(item.id) {
        Route::Pin => {
            registry.record_inbound(item);
            summary.pin_updates += 1;
        }

        Route::Peripheral {
            device_type,
            logical_id,
        } => {
            let message = DecodedMessage {
                id: logical_id,
                kind: item.kind,
                value: item.value,
            };

            if peripherals.dispatch(device_type, message) {
                summary.delivered += 1;
            } else {
                warn!(
                    id = item.id,
                    device_type, logical_id, "Inbound message matched no peripheral"
                );
                summary.unmatched += 1;
            }
        }

        Route::Unknown => {
            warn!(id = item.id, "Inbound id outside every known id space");
            summary.unmatched += 1;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::clock::manual::ManualClock;
    use crate::peripheral::MessageHandler;
    use crate::protocol::defs::{ANALOG_READ, ULTRASONIC_READ};

    struct Recorder {
        seen: Arc<Mutex<Vec<DecodedMessage>>>,
    }

    impl MessageHandler for Recorder {
        fn handle_message(&mut self, message: DecodedMessage) {
            self.seen.lock().push(message);
        }
    }

    fn fixtures() -> (EventRegistry, PeripheralTable) {
        let clock = Arc::new(ManualClock::at(1_000));
        (EventRegistry::new(clock), PeripheralTable::new())
    }

    #[test]
    fn test_classify_id_spaces() {
        assert_eq!(classify(0), Route::Pin);
        assert_eq!(classify(999), Route::Pin);
        assert_eq!(
            classify(1000),
            Route::Peripheral {
                device_type: SERVO_CONTROL,
                logical_id: 0
            }
        );
        assert_eq!(
            classify(2005),
            Route::Peripheral {
                device_type: ULTRASONIC_CONTROL,
                logical_id: 5
            }
        );
        assert_eq!(classify(3000), Route::Unknown);
    }

    #[test]
    fn test_pin_item_updates_registry() {
        let (mut registry, mut peripherals) = fixtures();

        let frame = InboundFrame {
            data: vec![InboundItem {
                id: 14,
                kind: ANALOG_READ,
                value: 512.0,
            }],
        };

        let summary = route_frame(&frame, &mut registry, &mut peripherals);
        assert_eq!(summary.pin_updates, 1);
        assert_eq!(registry.value(14, ANALOG_READ), Some(512.0));
    }

    #[test]
    fn test_ultrasonic_item_routes_to_matching_logical_id() {
        let (mut registry, mut peripherals) = fixtures();

        let seen = Arc::new(Mutex::new(Vec::new()));
        peripherals
            .register(
                "sonar",
                ULTRASONIC_CONTROL,
                Box::new(Recorder { seen: seen.clone() }),
            )
            .unwrap();

        // Logical id 0 → inbound id 2000.
        let frame = InboundFrame {
            data: vec![InboundItem {
                id: 2000,
                kind: ULTRASONIC_READ,
                value: 43.5,
            }],
        };

        let summary = route_frame(&frame, &mut registry, &mut peripherals);
        assert_eq!(summary.delivered, 1);

        let messages = seen.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 0);
        assert_eq!(messages[0].kind, ULTRASONIC_READ);
        assert_eq!(messages[0].value, 43.5);
    }

    #[test]
    fn test_unmatched_peripheral_reported_not_fatal() {
        let (mut registry, mut peripherals) = fixtures();

        let frame = InboundFrame {
            data: vec![
                InboundItem {
                    id: 2007,
                    kind: ULTRASONIC_READ,
                    value: 1.0,
                },
                InboundItem {
                    id: 14,
                    kind: ANALOG_READ,
                    value: 256.0,
                },
            ],
        };

        // The unmatched item is dropped; the rest of the batch still routes.
        let summary = route_frame(&frame, &mut registry, &mut peripherals);
        assert_eq!(summary.unmatched, 1);
        assert_eq!(summary.pin_updates, 1);
        assert_eq!(registry.value(14, ANALOG_READ), Some(256.0));
    }

    #[test]
    fn test_decode_frame_rejects_malformed_json() {
        let err = decode_frame("{ not json").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_decode_frame_accepts_empty_object() {
        let frame = decode_frame("{}").expect("decode");
        assert!(frame.data.is_empty());
    }
}
