//! Event registry: per-channel polling and throttle state.
//!
//! One [`RegisteredEvent`] exists per `(channel, kind)` pair, where `kind`
//! is the wire action code. A channel can hold a write and a read
//! registration at the same time; ending a channel removes every kind under
//! it.
//!
//! The dual gate in [`EventRegistry::should_send`] (elapsed time AND value
//! change) bounds both the outbound message rate and the device-side bus
//! bandwidth.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::clock::SharedClock;
use crate::protocol::InboundItem;
use crate::protocol::defs::{ANALOG_WRITE, DIGITAL_WRITE};

// ============================================================================
// RegisteredEvent
// ============================================================================

/// Throttle and polling state for one `(channel, kind)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredEvent {
    /// Channel id: pin number or peripheral logical id.
    pub channel: u16,
    /// Wire action code this entry tracks.
    pub kind: u16,
    /// Minimum milliseconds between sends.
    pub interval_ms: u64,
    /// Timestamp of the last send, 0 = never.
    pub last_update_ms: u64,
    /// Latest value reported by the device.
    pub last_value: Option<f64>,
    /// Last value actually transmitted.
    pub last_sent_value: Option<f64>,
    /// Minimum change magnitude worth transmitting (analog writes).
    pub threshold: f64,
}

impl RegisteredEvent {
    fn new(channel: u16, kind: u16, interval_ms: u64, threshold: f64) -> Self {
        Self {
            channel,
            kind,
            interval_ms,
            last_update_ms: 0,
            last_value: None,
            last_sent_value: None,
            threshold,
        }
    }
}

// ============================================================================
// EventRegistry
// ============================================================================

/// Registry of per-channel polling/throttle state.
pub struct EventRegistry {
    events: FxHashMap<(u16, u16), RegisteredEvent>,
    clock: SharedClock,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.events.len())
            .finish()
    }
}

impl EventRegistry {
    /// Creates an empty registry using the given clock.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            events: FxHashMap::default(),
            clock,
        }
    }

    /// Number of registered events.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no events are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Looks up the event for a `(channel, kind)` pair.
    #[inline]
    #[must_use]
    pub fn get(&self, channel: u16, kind: u16) -> Option<&RegisteredEvent> {
        self.events.get(&(channel, kind))
    }

    /// Returns the existing event for the pair, updating its interval and
    /// threshold, or creates a fresh one with `last_update_ms = 0`.
    pub fn register(
        &mut self,
        channel: u16,
        kind: u16,
        interval_ms: u64,
        threshold: f64,
    ) -> &RegisteredEvent {
        let event = self
            .events
            .entry((channel, kind))
            .or_insert_with(|| RegisteredEvent::new(channel, kind, interval_ms, threshold));
        event.interval_ms = interval_ms;
        event.threshold = threshold;
        event
    }

    /// Dual throttle/threshold gate.
    ///
    /// Returns `true` only if at least `interval_ms` has elapsed since the
    /// event's last send AND, for write kinds, the value change clears the
    /// threshold (exact inequality for digital, exceeds-threshold for
    /// analog) or nothing has been sent yet. Read kinds gate on time alone.
    #[must_use]
    pub fn should_send(&self, event: &RegisteredEvent, new_value: f64) -> bool {
        let now = self.clock.now_ms();
        if now.saturating_sub(event.last_update_ms) < event.interval_ms {
            return false;
        }

        if event.kind == DIGITAL_WRITE || event.kind == ANALOG_WRITE {
            let Some(last_sent) = event.last_sent_value else {
                return true;
            };

            if event.kind == DIGITAL_WRITE {
                return new_value != last_sent;
            }
            return (new_value - last_sent).abs() > event.threshold;
        }

        true
    }

    /// Registers a write event and passes it through the gate.
    ///
    /// On admit, the event is stamped with the current time and `value` as
    /// the last sent value, and the caller must transmit the descriptor.
    pub fn admit_write(
        &mut self,
        channel: u16,
        kind: u16,
        interval_ms: u64,
        threshold: f64,
        value: f64,
    ) -> bool {
        self.register(channel, kind, interval_ms, threshold);

        let event = &self.events[&(channel, kind)];
        let admit = event.last_update_ms == 0 || self.should_send(event, value);

        if admit {
            self.mark_sent(channel, kind, value);
        }
        admit
    }

    /// Registers a periodic read and reports whether the subscribe command
    /// still needs to be sent (first registration only).
    pub fn admit_read(&mut self, channel: u16, kind: u16, interval_ms: u64) -> bool {
        self.register(channel, kind, interval_ms, 0.0);

        let now = self.clock.now_ms();
        let event = self
            .events
            .get_mut(&(channel, kind))
            .expect("just registered");
        if event.last_update_ms == 0 {
            event.last_update_ms = now;
            return true;
        }
        false
    }

    /// Stamps an event as sent with the transmitted value.
    pub fn mark_sent(&mut self, channel: u16, kind: u16, value: f64) {
        let now = self.clock.now_ms();
        if let Some(event) = self.events.get_mut(&(channel, kind)) {
            event.last_update_ms = now;
            event.last_sent_value = Some(value);
        }
    }

    /// Records an inbound pin reading.
    ///
    /// Updates the matching event's latest value; when none exists, creates
    /// a passive entry so unsolicited values are still observable.
    pub fn record_inbound(&mut self, item: &InboundItem) {
        let event = self
            .events
            .entry((item.id, item.kind))
            .or_insert_with(|| RegisteredEvent::new(item.id, item.kind, 0, 0.0));
        event.last_value = Some(item.value);
    }

    /// Latest device-reported value for a pair, searching all kinds when the
    /// exact pair has none.
    #[must_use]
    pub fn value(&self, channel: u16, kind: u16) -> Option<f64> {
        if let Some(value) = self.events.get(&(channel, kind)).and_then(|e| e.last_value) {
            return Some(value);
        }

        // Unsolicited values may have landed under the inbound type rather
        // than the kind the caller registered.
        self.events
            .values()
            .filter(|e| e.channel == channel)
            .find_map(|e| e.last_value)
    }

    /// Removes every kind registered under a channel.
    ///
    /// Returns the number of entries removed.
    pub fn end(&mut self, channel: u16) -> usize {
        let before = self.events.len();
        self.events.retain(|&(id, _), _| id != channel);
        before - self.events.len()
    }

    /// Removes one `(channel, kind)` pair.
    pub fn remove(&mut self, channel: u16, kind: u16) -> bool {
        self.events.remove(&(channel, kind)).is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::clock::manual::ManualClock;
    use crate::protocol::defs::{ANALOG_READ, DIGITAL_READ};

    fn registry_at(now_ms: u64) -> (EventRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(now_ms));
        (EventRegistry::new(clock.clone()), clock)
    }

    #[test]
    fn test_register_creates_fresh_entry() {
        let (mut registry, _clock) = registry_at(5_000);

        let event = registry.register(13, DIGITAL_WRITE, 100, 0.0);
        assert_eq!(event.last_update_ms, 0);
        assert_eq!(event.last_sent_value, None);
        assert_eq!(event.interval_ms, 100);
    }

    #[test]
    fn test_register_updates_interval_and_threshold() {
        let (mut registry, _clock) = registry_at(5_000);

        registry.register(14, ANALOG_WRITE, 100, 2.0);
        registry.mark_sent(14, ANALOG_WRITE, 42.0);

        let event = registry.register(14, ANALOG_WRITE, 250, 5.0);
        assert_eq!(event.interval_ms, 250);
        assert_eq!(event.threshold, 5.0);
        // Send state survives re-registration.
        assert_eq!(event.last_sent_value, Some(42.0));
    }

    #[test]
    fn test_digital_write_first_call_sends() {
        let (mut registry, _clock) = registry_at(5_000);

        let event = registry.register(13, DIGITAL_WRITE, 100, 0.0).clone();
        assert!(registry.should_send(&event, 1.0));
    }

    #[test]
    fn test_digital_write_same_value_never_resends() {
        let (mut registry, clock) = registry_at(5_000);

        assert!(registry.admit_write(13, DIGITAL_WRITE, 100, 0.0, 1.0));

        // Far beyond the interval; value unchanged.
        clock.advance(60_000);
        let event = registry.get(13, DIGITAL_WRITE).unwrap().clone();
        assert!(!registry.should_send(&event, 1.0));
        assert!(!registry.admit_write(13, DIGITAL_WRITE, 100, 0.0, 1.0));
    }

    #[test]
    fn test_digital_write_changed_value_sends_after_interval() {
        let (mut registry, clock) = registry_at(5_000);

        assert!(registry.admit_write(13, DIGITAL_WRITE, 100, 0.0, 1.0));

        // Interval not yet elapsed.
        clock.advance(50);
        assert!(!registry.admit_write(13, DIGITAL_WRITE, 100, 0.0, 0.0));

        clock.advance(50);
        assert!(registry.admit_write(13, DIGITAL_WRITE, 100, 0.0, 0.0));
    }

    #[test]
    fn test_analog_write_threshold_gate() {
        let (mut registry, clock) = registry_at(5_000);

        assert!(registry.admit_write(9, ANALOG_WRITE, 100, 2.0, 100.0));
        clock.advance(200);

        // Within 2 units: suppressed.
        let event = registry.get(9, ANALOG_WRITE).unwrap().clone();
        assert!(!registry.should_send(&event, 101.0));
        assert!(!registry.should_send(&event, 98.0));

        // Beyond the threshold: admitted.
        assert!(registry.should_send(&event, 103.0));
        assert!(registry.should_send(&event, 97.0));
    }

    #[test]
    fn test_read_kind_gates_on_time_alone() {
        let (mut registry, clock) = registry_at(5_000);

        registry.register(14, ANALOG_READ, 200, 0.0);
        registry.mark_sent(14, ANALOG_READ, 0.0);

        let event = registry.get(14, ANALOG_READ).unwrap().clone();
        assert!(!registry.should_send(&event, 0.0));

        clock.advance(200);
        let event = registry.get(14, ANALOG_READ).unwrap().clone();
        assert!(registry.should_send(&event, 0.0));
    }

    #[test]
    fn test_admit_read_subscribes_once() {
        let (mut registry, clock) = registry_at(5_000);

        assert!(registry.admit_read(14, ANALOG_READ, 200));
        assert!(!registry.admit_read(14, ANALOG_READ, 200));

        // Still subscribed; time passing changes nothing.
        clock.advance(10_000);
        assert!(!registry.admit_read(14, ANALOG_READ, 200));
    }

    #[test]
    fn test_write_and_read_coexist_on_one_channel() {
        let (mut registry, _clock) = registry_at(5_000);

        assert!(registry.admit_write(7, DIGITAL_WRITE, 100, 0.0, 1.0));
        assert!(registry.admit_read(7, DIGITAL_READ, 200));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(7, DIGITAL_WRITE).is_some());
        assert!(registry.get(7, DIGITAL_READ).is_some());
    }

    #[test]
    fn test_end_removes_all_kinds_for_channel() {
        let (mut registry, _clock) = registry_at(5_000);

        registry.admit_write(7, DIGITAL_WRITE, 100, 0.0, 1.0);
        registry.admit_read(7, DIGITAL_READ, 200);
        registry.admit_read(8, ANALOG_READ, 200);

        assert_eq!(registry.end(7), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(8, ANALOG_READ).is_some());

        // Re-registration after end starts fresh.
        let event = registry.register(7, DIGITAL_READ, 200, 0.0);
        assert_eq!(event.last_update_ms, 0);
    }

    #[test]
    fn test_record_inbound_updates_registered_entry() {
        let (mut registry, _clock) = registry_at(5_000);

        registry.admit_read(14, ANALOG_READ, 200);
        registry.record_inbound(&InboundItem {
            id: 14,
            kind: ANALOG_READ,
            value: 512.0,
        });

        assert_eq!(registry.value(14, ANALOG_READ), Some(512.0));
    }

    #[test]
    fn test_record_inbound_creates_passive_entry() {
        let (mut registry, _clock) = registry_at(5_000);

        // Unsolicited reading for a channel nobody registered.
        registry.record_inbound(&InboundItem {
            id: 3,
            kind: DIGITAL_READ,
            value: 1.0,
        });

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.value(3, DIGITAL_READ), Some(1.0));
    }
}
