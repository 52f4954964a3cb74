//! Ultrasonic distance sensor handle.
//!
//! Supports 3-wire sensors (shared trigger/echo pin) and 4-wire sensors
//! (separate pins). Readings are push-based: a one-shot or periodic read
//! request goes out, the device answers asynchronously, and the handle
//! returns the latest cached distance (-1 before the first reading or on
//! sensor timeout).

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::link::Link;
use crate::protocol::CommandDescriptor;
use crate::protocol::defs::{
    END, ULTRASONIC_ATTACH, ULTRASONIC_CONTROL, ULTRASONIC_DETACH, ULTRASONIC_READ,
    ULTRASONIC_SET_TIMEOUT,
};

use super::{DecodedMessage, MessageHandler};

// ============================================================================
// Unit
// ============================================================================

/// Measurement unit for distance readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Unit {
    /// Centimeters.
    #[default]
    Cm,
    /// Inches.
    Inch,
}

impl Unit {
    /// Wire code for the unit parameter.
    #[inline]
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Cm => 0,
            Self::Inch => 1,
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Echo timeout bounds in milliseconds.
const TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=1000;

struct UltrasonicState {
    trig_pin: Option<u16>,
    echo_pin: Option<u16>,
    attached: bool,
    timeout_ms: u64,
    last_distance: f64,
}

impl UltrasonicState {
    fn new() -> Self {
        Self {
            trig_pin: None,
            echo_pin: None,
            attached: false,
            timeout_ms: 20,
            last_distance: -1.0,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Inbound handler: caches the most recent distance reading.
struct UltrasonicEvents {
    state: Arc<Mutex<UltrasonicState>>,
}

impl MessageHandler for UltrasonicEvents {
    fn handle_message(&mut self, message: DecodedMessage) {
        match message.kind {
            ULTRASONIC_READ => {
                self.state.lock().last_distance = message.value;
            }
            _ => {
                debug!(kind = message.kind, "Unhandled ultrasonic message kind");
            }
        }
    }
}

// ============================================================================
// Ultrasonic
// ============================================================================

/// Handle to one ultrasonic distance sensor.
///
/// Obtained from [`Link::add_ultrasonic`].
pub struct Ultrasonic {
    link: Link,
    logical_id: u16,
    state: Arc<Mutex<UltrasonicState>>,
}

impl Ultrasonic {
    pub(crate) fn register(link: Link, name: String) -> Result<Self> {
        let state = Arc::new(Mutex::new(UltrasonicState::new()));

        let logical_id = link.add_peripheral(
            name,
            ULTRASONIC_CONTROL,
            Box::new(UltrasonicEvents {
                state: state.clone(),
            }),
        )?;

        Ok(Self {
            link,
            logical_id,
            state,
        })
    }

    /// Logical id within the ultrasonic device type.
    #[inline]
    #[must_use]
    pub fn logical_id(&self) -> u16 {
        self.logical_id
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    /// Attaches a 3-wire sensor (one shared trigger/echo pin).
    pub fn attach(&self, trig_pin: u16) {
        {
            let mut state = self.state.lock();
            state.trig_pin = Some(trig_pin);
            state.echo_pin = None;
            state.attached = true;
        }

        self.link.enqueue(CommandDescriptor::new(
            ULTRASONIC_CONTROL,
            ULTRASONIC_ATTACH,
            vec![i64::from(self.logical_id), i64::from(trig_pin)],
        ));
    }

    /// Attaches a 4-wire sensor (separate trigger and echo pins).
    pub fn attach_with_echo(&self, trig_pin: u16, echo_pin: u16) {
        {
            let mut state = self.state.lock();
            state.trig_pin = Some(trig_pin);
            state.echo_pin = Some(echo_pin);
            state.attached = true;
        }

        self.link.enqueue(CommandDescriptor::new(
            ULTRASONIC_CONTROL,
            ULTRASONIC_ATTACH,
            vec![
                i64::from(self.logical_id),
                i64::from(trig_pin),
                i64::from(echo_pin),
            ],
        ));
    }

    /// Detaches the sensor, releasing its pins.
    pub fn detach(&self) {
        {
            let mut state = self.state.lock();
            state.attached = false;
            state.trig_pin = None;
            state.echo_pin = None;
        }

        self.link.enqueue(CommandDescriptor::new(
            ULTRASONIC_CONTROL,
            ULTRASONIC_DETACH,
            vec![i64::from(self.logical_id)],
        ));
    }

    /// Returns `true` while the sensor is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    // ========================================================================
    // Readings
    // ========================================================================

    /// Requests a single reading and returns the latest cached distance.
    ///
    /// Returns -1 before the first reading arrives, on sensor timeout, or
    /// when the sensor is not attached.
    #[must_use]
    pub fn read(&self, unit: Unit) -> f64 {
        if !self.is_attached() {
            warn!(logical_id = self.logical_id, "Ultrasonic sensor not attached");
            return -1.0;
        }

        self.link.enqueue(CommandDescriptor::new(
            ULTRASONIC_CONTROL,
            ULTRASONIC_READ,
            vec![i64::from(self.logical_id), unit.code()],
        ));

        self.distance()
    }

    /// Subscribes to periodic readings and returns the latest cached
    /// distance.
    ///
    /// The first call for this sensor sends the subscribe command; repeat
    /// calls just read the cache until [`stop`](Self::stop).
    #[must_use]
    pub fn read_every(&self, unit: Unit, interval_ms: u64) -> f64 {
        if !self.is_attached() {
            warn!(logical_id = self.logical_id, "Ultrasonic sensor not attached");
            return -1.0;
        }

        let subscribe = self.link.shared.registry.lock().admit_read(
            self.logical_id,
            ULTRASONIC_READ,
            interval_ms,
        );

        if subscribe {
            self.link.enqueue(CommandDescriptor::new(
                ULTRASONIC_CONTROL,
                ULTRASONIC_READ,
                vec![i64::from(self.logical_id), unit.code(), interval_ms as i64],
            ));
        }

        self.distance()
    }

    /// As [`read_every`](Self::read_every) with the link's default read
    /// interval.
    #[must_use]
    pub fn read_cm(&self) -> f64 {
        self.read_every(Unit::Cm, self.link.default_read_interval_ms())
    }

    /// As [`read_cm`](Self::read_cm), in inches.
    #[must_use]
    pub fn read_inches(&self) -> f64 {
        self.read_every(Unit::Inch, self.link.default_read_interval_ms())
    }

    /// Stops periodic readings for this sensor.
    pub fn stop(&self) {
        self.link
            .shared
            .registry
            .lock()
            .remove(self.logical_id, ULTRASONIC_READ);

        self.link.enqueue(CommandDescriptor::new(
            ULTRASONIC_CONTROL,
            END,
            vec![i64::from(self.logical_id)],
        ));
    }

    /// Latest cached distance without requesting a new reading.
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.state.lock().last_distance
    }

    /// Returns `true` when a valid reading exists and is at most
    /// `max_distance`.
    #[must_use]
    pub fn is_in_range(&self, max_distance: f64) -> bool {
        let distance = self.distance();
        distance > 0.0 && distance <= max_distance
    }

    // ========================================================================
    // Tuning
    // ========================================================================

    /// Sets the echo timeout, clamped to 1–1000ms.
    pub fn set_timeout(&self, timeout_ms: u64) {
        if !self.is_attached() {
            warn!(logical_id = self.logical_id, "Ultrasonic sensor not attached");
            return;
        }

        let timeout_ms = timeout_ms.clamp(*TIMEOUT_RANGE_MS.start(), *TIMEOUT_RANGE_MS.end());
        self.state.lock().timeout_ms = timeout_ms;

        self.link.enqueue(CommandDescriptor::new(
            ULTRASONIC_CONTROL,
            ULTRASONIC_SET_TIMEOUT,
            vec![i64::from(self.logical_id), timeout_ms as i64],
        ));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_wire_codes() {
        assert_eq!(Unit::Cm.code(), 0);
        assert_eq!(Unit::Inch.code(), 1);
        assert_eq!(Unit::default(), Unit::Cm);
    }

    #[test]
    fn test_events_cache_distance() {
        let state = Arc::new(Mutex::new(UltrasonicState::new()));
        assert_eq!(state.lock().last_distance, -1.0);

        let mut events = UltrasonicEvents {
            state: state.clone(),
        };

        events.handle_message(DecodedMessage {
            id: 0,
            kind: ULTRASONIC_READ,
            value: 43.5,
        });
        assert_eq!(state.lock().last_distance, 43.5);

        // A timeout reading is cached as-is.
        events.handle_message(DecodedMessage {
            id: 0,
            kind: ULTRASONIC_READ,
            value: -1.0,
        });
        assert_eq!(state.lock().last_distance, -1.0);
    }

    #[test]
    fn test_unknown_kind_leaves_cache_untouched() {
        let state = Arc::new(Mutex::new(UltrasonicState::new()));
        let mut events = UltrasonicEvents {
            state: state.clone(),
        };

        events.handle_message(DecodedMessage {
            id: 0,
            kind: 99,
            value: 7.0,
        });
        assert_eq!(state.lock().last_distance, -1.0);
    }
}
