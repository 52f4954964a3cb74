//! Servo peripheral handle.
//!
//! Mirrors the classic hobby-servo API (attach, write, sweep) on top of the
//! link's command queue. Writes carry a change threshold and a short
//! coalescing throttle so rapid calls (e.g. driven by a UI slider) do not
//! flood the device; only the newest pending angle survives the throttle
//! window.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::link::Link;
use crate::protocol::CommandDescriptor;
use crate::protocol::defs::{
    SERVO_ATTACH, SERVO_ATTACHED, SERVO_CONTROL, SERVO_DETACH, SERVO_READ, SERVO_WRITE,
    SERVO_WRITE_MICROSECONDS,
};

use super::{DecodedMessage, MessageHandler};

// ============================================================================
// Constants
// ============================================================================

/// Default minimum pulse width in microseconds (0°).
pub const DEFAULT_MIN_PULSE_US: i64 = 544;

/// Default maximum pulse width in microseconds (180°).
pub const DEFAULT_MAX_PULSE_US: i64 = 2400;

/// Default minimum milliseconds between transmitted writes.
const DEFAULT_WRITE_THROTTLE_MS: u64 = 20;

/// Default change threshold in degrees.
const DEFAULT_THRESHOLD_DEG: f64 = 1.0;

// ============================================================================
// State
// ============================================================================

struct ServoState {
    pin: Option<u16>,
    attached: bool,
    current_angle: f64,
    current_us: f64,
    min_pulse: i64,
    max_pulse: i64,
    threshold_deg: f64,
    write_throttle_ms: u64,
    last_write_ms: u64,
    pending: Option<JoinHandle<()>>,
    sweep_epoch: u64,
}

impl ServoState {
    fn new() -> Self {
        Self {
            pin: None,
            attached: false,
            current_angle: 90.0,
            current_us: 1500.0,
            min_pulse: DEFAULT_MIN_PULSE_US,
            max_pulse: DEFAULT_MAX_PULSE_US,
            threshold_deg: DEFAULT_THRESHOLD_DEG,
            write_throttle_ms: DEFAULT_WRITE_THROTTLE_MS,
            last_write_ms: 0,
            pending: None,
            sweep_epoch: 0,
        }
    }

    fn angle_to_us(&self, angle: f64) -> f64 {
        self.min_pulse as f64 + (angle / 180.0) * (self.max_pulse - self.min_pulse) as f64
    }

    fn us_to_angle(&self, microseconds: f64) -> f64 {
        (microseconds - self.min_pulse as f64) / (self.max_pulse - self.min_pulse) as f64 * 180.0
    }

    /// Cancels any coalesced write still waiting out the throttle window.
    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Inbound handler: keeps the cached angle and attach flag current.
struct ServoEvents {
    state: Arc<Mutex<ServoState>>,
}

impl MessageHandler for ServoEvents {
    fn handle_message(&mut self, message: DecodedMessage) {
        let mut state = self.state.lock();

        match message.kind {
            SERVO_READ => {
                state.current_angle = message.value;
                state.current_us = state.angle_to_us(message.value);
            }
            SERVO_ATTACHED => {
                state.attached = message.value == 1.0;
            }
            _ => {
                debug!(kind = message.kind, "Unhandled servo message kind");
            }
        }
    }
}

// ============================================================================
// Servo
// ============================================================================

/// Handle to one servo on the device.
///
/// Obtained from [`Link::add_servo`]. Call [`attach`](Self::attach) before
/// writing; writes on a detached servo are warned about and dropped.
pub struct Servo {
    link: Link,
    logical_id: u16,
    state: Arc<Mutex<ServoState>>,
}

impl Servo {
    pub(crate) fn register(link: Link, name: String) -> Result<Self> {
        let state = Arc::new(Mutex::new(ServoState::new()));

        let logical_id = link.add_peripheral(
            name,
            SERVO_CONTROL,
            Box::new(ServoEvents {
                state: state.clone(),
            }),
        )?;

        Ok(Self {
            link,
            logical_id,
            state,
        })
    }

    /// Logical id within the servo device type.
    #[inline]
    #[must_use]
    pub fn logical_id(&self) -> u16 {
        self.logical_id
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    /// Attaches the servo to a pin with the default pulse range
    /// (544–2400µs).
    pub fn attach(&self, pin: u16) {
        self.attach_with_range(pin, DEFAULT_MIN_PULSE_US, DEFAULT_MAX_PULSE_US);
    }

    /// Attaches the servo with an explicit pulse range in microseconds.
    pub fn attach_with_range(&self, pin: u16, min_pulse_us: i64, max_pulse_us: i64) {
        {
            let mut state = self.state.lock();
            state.pin = Some(pin);
            state.min_pulse = min_pulse_us;
            state.max_pulse = max_pulse_us;
            state.attached = true;
        }

        self.link.enqueue(CommandDescriptor::new(
            SERVO_CONTROL,
            SERVO_ATTACH,
            vec![
                i64::from(self.logical_id),
                i64::from(pin),
                min_pulse_us,
                max_pulse_us,
            ],
        ));
    }

    /// Detaches the servo, releasing its pin.
    pub fn detach(&self) {
        {
            let mut state = self.state.lock();
            state.attached = false;
            state.pin = None;
            state.cancel_pending();
        }

        self.link.enqueue(CommandDescriptor::new(
            SERVO_CONTROL,
            SERVO_DETACH,
            vec![i64::from(self.logical_id)],
        ));
    }

    /// Last known attach state (updated by device responses to
    /// [`query_attached`](Self::query_attached)).
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    /// Asks the device whether the servo is attached and returns the cached
    /// answer; the fresh one arrives asynchronously.
    pub fn query_attached(&self) -> bool {
        self.link.enqueue(CommandDescriptor::new(
            SERVO_CONTROL,
            SERVO_ATTACHED,
            vec![i64::from(self.logical_id)],
        ));

        self.is_attached()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Moves the servo to an angle (clamped to 0–180, rounded).
    ///
    /// Dropped when the change is below the threshold. Inside the throttle
    /// window the write is coalesced: it is deferred to the end of the
    /// window, and a newer angle replaces it.
    pub fn write(&self, angle: f64) {
        let mut state = self.state.lock();

        // Any direct write cancels a running sweep.
        state.sweep_epoch += 1;

        if !state.attached {
            warn!(logical_id = self.logical_id, "Servo not attached");
            return;
        }

        let angle = angle.round().clamp(0.0, 180.0);
        if (angle - state.current_angle).abs() < state.threshold_deg {
            return;
        }

        let now = self.link.clock.now_ms();
        let elapsed = now.saturating_sub(state.last_write_ms);

        if elapsed < state.write_throttle_ms {
            state.cancel_pending();

            let remaining = state.write_throttle_ms - elapsed;
            let link = self.link.clone();
            let shared = self.state.clone();
            let logical_id = self.logical_id;

            state.pending = Some(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(remaining)).await;
                send_angle(&link, &shared, logical_id, angle);
                shared.lock().pending = None;
            }));
        } else {
            // A stale coalesced angle must never fire after this newer one.
            state.cancel_pending();
            drop(state);
            send_angle(&self.link, &self.state, self.logical_id, angle);
        }
    }

    /// Moves the servo by pulse width (clamped to the attached range).
    ///
    /// The degree threshold is converted to microseconds for the change
    /// check; below-threshold writes are dropped. Sent immediately, outside
    /// the write throttle.
    pub fn write_microseconds(&self, microseconds: f64) {
        let mut state = self.state.lock();
        state.sweep_epoch += 1;

        if !state.attached {
            warn!(logical_id = self.logical_id, "Servo not attached");
            return;
        }

        let microseconds = microseconds
            .round()
            .clamp(state.min_pulse as f64, state.max_pulse as f64);

        let us_per_degree = (state.max_pulse - state.min_pulse) as f64 / 180.0;
        let us_threshold = state.threshold_deg * us_per_degree;
        if (microseconds - state.current_us).abs() < us_threshold {
            return;
        }

        state.current_us = microseconds;
        state.current_angle = state.us_to_angle(microseconds);
        state.last_write_ms = self.link.clock.now_ms();
        drop(state);

        self.link.enqueue(CommandDescriptor::new(
            SERVO_CONTROL,
            SERVO_WRITE_MICROSECONDS,
            vec![i64::from(self.logical_id), microseconds as i64],
        ));
    }

    /// Moves to 90°.
    pub fn center(&self) {
        self.write(90.0);
    }

    /// Moves to 0°.
    pub fn min(&self) {
        self.write(0.0);
    }

    /// Moves to 180°.
    pub fn max(&self) {
        self.write(180.0);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Last known angle in degrees. Requests a fresh reading from the
    /// device; the answer updates the cache asynchronously.
    #[must_use]
    pub fn read(&self) -> f64 {
        self.link.enqueue(CommandDescriptor::new(
            SERVO_CONTROL,
            SERVO_READ,
            vec![i64::from(self.logical_id)],
        ));

        self.state.lock().current_angle
    }

    /// Last known angle without requesting a fresh reading.
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.state.lock().current_angle
    }

    // ========================================================================
    // Sweep
    // ========================================================================

    /// Sweeps between two angles over a duration, in discrete steps.
    ///
    /// Steps bypass the threshold and throttle so the motion stays smooth.
    /// Any direct write issued while the sweep runs aborts it at the next
    /// step boundary.
    pub async fn sweep(&self, start_angle: f64, end_angle: f64, duration_ms: u64, steps: u32) {
        let epoch = {
            let mut state = self.state.lock();

            if !state.attached {
                warn!(logical_id = self.logical_id, "Servo not attached");
                return;
            }

            state.cancel_pending();
            state.sweep_epoch += 1;
            state.sweep_epoch
        };

        let steps = steps.max(1);
        let step_delay = Duration::from_millis(duration_ms / u64::from(steps));
        let angle_step = (end_angle - start_angle) / f64::from(steps);

        for i in 0..=steps {
            if self.state.lock().sweep_epoch != epoch {
                debug!(logical_id = self.logical_id, "Sweep aborted");
                return;
            }

            let angle = (start_angle + angle_step * f64::from(i))
                .round()
                .clamp(0.0, 180.0);
            send_angle(&self.link, &self.state, self.logical_id, angle);

            tokio::time::sleep(step_delay).await;
        }
    }

    // ========================================================================
    // Tuning
    // ========================================================================

    /// Sets the minimum milliseconds between transmitted writes.
    pub fn set_write_throttle(&self, throttle_ms: u64) {
        self.state.lock().write_throttle_ms = throttle_ms;
    }

    /// Sets the change threshold in whole degrees.
    pub fn set_threshold(&self, threshold_deg: f64) {
        self.state.lock().threshold_deg = threshold_deg.round().max(0.0);
    }
}

/// Transmits one angle and syncs the cached state.
fn send_angle(link: &Link, state: &Mutex<ServoState>, logical_id: u16, angle: f64) {
    link.enqueue(CommandDescriptor::new(
        SERVO_CONTROL,
        SERVO_WRITE,
        vec![i64::from(logical_id), angle as i64],
    ));

    let mut state = state.lock();
    state.current_angle = angle;
    state.current_us = state.angle_to_us(angle);
    state.last_write_ms = link.clock.now_ms();
}

// ============================================================================
// Tests
// ============================================================================
