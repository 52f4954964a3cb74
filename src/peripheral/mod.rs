//! Peripheral registrations and message dispatch.
//!
//! Peripherals attach to a link under a user-chosen name. Each registration
//! gets a sequential logical id (process-unique, never reused) and a
//! [`MessageHandler`] the inbound router invokes for messages addressed to
//! that `(device type, logical id)` pair.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `servo` | Hobby servo handle |
//! | `pixel` | Addressable pixel strip handle |
//! | `ultrasonic` | Ultrasonic distance sensor handle |

// ============================================================================
// Submodules
// ============================================================================

/// Addressable pixel strip handle.
pub mod pixel;

/// Hobby servo handle.
pub mod servo;

/// Ultrasonic distance sensor handle.
pub mod ultrasonic;

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::protocol::DecodedMessage;

// ============================================================================
// Re-exports
// ============================================================================

pub use pixel::{ColorSpec, PixelStrip};
pub use servo::Servo;
pub use ultrasonic::{Ultrasonic, Unit};

// ============================================================================
// MessageHandler
// ============================================================================

/// Receiver for inbound messages routed to one peripheral.
///
/// Implemented by each peripheral's shared state so readings (distances,
/// angles, attach status) land where the typed handle can observe them.
pub trait MessageHandler: Send {
    /// Handles one decoded inbound message.
    fn handle_message(&mut self, message: DecodedMessage);
}

// ============================================================================
// Registration
// ============================================================================

/// Public description of one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralInfo {
    /// User-chosen registration name.
    pub name: String,
    /// Device type id (200+).
    pub device_type: u16,
    /// Sequential logical id, unique per process lifetime.
    pub logical_id: u16,
}

struct Registration {
    info: PeripheralInfo,
    handler: Box<dyn MessageHandler>,
}

// ============================================================================
// PeripheralTable
// ============================================================================

/// Name-keyed table of attached peripherals.
pub struct PeripheralTable {
    entries: FxHashMap<String, Registration>,
    next_logical_id: u16,
}

impl std::fmt::Debug for PeripheralTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralTable")
            .field("entries", &self.entries.len())
            .field("next_logical_id", &self.next_logical_id)
            .finish()
    }
}

impl Default for PeripheralTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeripheralTable {
    /// Creates an empty table. Logical ids start at 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            next_logical_id: 0,
        }
    }

    /// Registers a peripheral under a name and assigns the next logical id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralExists`] if the name is already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        device_type: u16,
        handler: Box<dyn MessageHandler>,
    ) -> Result<u16> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(Error::peripheral_exists(name));
        }

        let logical_id = self.next_logical_id;
        self.next_logical_id += 1;

        self.entries.insert(
            name.clone(),
            Registration {
                info: PeripheralInfo {
                    name,
                    device_type,
                    logical_id,
                },
                handler,
            },
        );

        Ok(logical_id)
    }

    /// Delivers a message to the registration matching the device type and
    /// logical id.
    ///
    /// Returns `false` when no registration matches.
    pub fn dispatch(&mut self, device_type: u16, message: DecodedMessage) -> bool {
        let registration = self.entries.values_mut().find(|r| {
            r.info.device_type == device_type && r.info.logical_id == message.id
        });

        match registration {
            Some(registration) => {
                registration.handler.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// Looks up a registration by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PeripheralInfo> {
        self.entries.get(name).map(|r| &r.info)
    }

    /// Lists all registrations, sorted by logical id.
    #[must_use]
    pub fn list(&self) -> Vec<PeripheralInfo> {
        let mut infos: Vec<_> = self.entries.values().map(|r| r.info.clone()).collect();
        infos.sort_by_key(|info| info.logical_id);
        infos
    }

    /// Number of registered peripherals.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no peripherals are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
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

    use crate::protocol::defs::{SERVO_CONTROL, ULTRASONIC_CONTROL};

    struct Recorder {
        seen: Arc<Mutex<Vec<DecodedMessage>>>,
    }

    impl MessageHandler for Recorder {
        fn handle_message(&mut self, message: DecodedMessage) {
            self.seen.lock().push(message);
        }
    }

    fn recorder() -> (Box<dyn MessageHandler>, Arc<Mutex<Vec<DecodedMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Box::new(Recorder { seen: seen.clone() }), seen)
    }

    #[test]
    fn test_logical_ids_are_sequential_from_zero() {
        let mut table = PeripheralTable::new();
        let (handler_a, _) = recorder();
        let (handler_b, _) = recorder();

        let a = table.register("arm", SERVO_CONTROL, handler_a).unwrap();
        let b = table.register("sonar", ULTRASONIC_CONTROL, handler_b).unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut table = PeripheralTable::new();
        let (handler_a, _) = recorder();
        let (handler_b, _) = recorder();

        table.register("arm", SERVO_CONTROL, handler_a).unwrap();
        let err = table.register("arm", SERVO_CONTROL, handler_b).unwrap_err();

        assert!(matches!(err, Error::PeripheralExists { .. }));
        // The failed registration must not burn a logical id.
        let (handler_c, _) = recorder();
        assert_eq!(table.register("arm2", SERVO_CONTROL, handler_c).unwrap(), 1);
    }

    #[test]
    fn test_dispatch_matches_device_type_and_logical_id() {
        let mut table = PeripheralTable::new();
        let (servo_handler, servo_seen) = recorder();
        let (sonar_handler, sonar_seen) = recorder();

        table.register("arm", SERVO_CONTROL, servo_handler).unwrap();
        table
            .register("sonar", ULTRASONIC_CONTROL, sonar_handler)
            .unwrap();

        let message = DecodedMessage {
            id: 1,
            kind: 32,
            value: 43.5,
        };
        assert!(table.dispatch(ULTRASONIC_CONTROL, message));

        assert!(servo_seen.lock().is_empty());
        assert_eq!(sonar_seen.lock().as_slice(), &[message]);
    }

    #[test]
    fn test_dispatch_unmatched_returns_false() {
        let mut table = PeripheralTable::new();
        let (handler, _) = recorder();
        table.register("arm", SERVO_CONTROL, handler).unwrap();

        let message = DecodedMessage {
            id: 7,
            kind: 24,
            value: 90.0,
        };
        assert!(!table.dispatch(SERVO_CONTROL, message));
        assert!(!table.dispatch(ULTRASONIC_CONTROL, message));
    }

    #[test]
    fn test_list_sorted_by_logical_id() {
        let mut table = PeripheralTable::new();
        for name in ["a", "b", "c"] {
            let (handler, _) = recorder();
            table.register(name, SERVO_CONTROL, handler).unwrap();
        }

        let infos = table.list();
        let ids: Vec<_> = infos.iter().map(|i| i.logical_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(table.get("b").unwrap().logical_id, 1);
    }
}
