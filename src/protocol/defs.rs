//! Protocol ids and action codes.
//!
//! These constants mirror the firmware's command table. Every outbound
//! descriptor carries one of the action codes below; inbound items carry the
//! action code of the read they answer in their `type` field.

// ============================================================================
// Core Actions (1-99)
// ============================================================================

/// Configure a pin's mode. Params: `[mode]`.
pub const PIN_MODE: u16 = 1;
/// Set a digital output. Params: `[value]`.
pub const DIGITAL_WRITE: u16 = 2;
/// Subscribe to a digital input. Params: `[interval_ms]`.
pub const DIGITAL_READ: u16 = 3;
/// Set an analog (PWM/DAC) output. Params: `[value]`.
pub const ANALOG_WRITE: u16 = 4;
/// Subscribe to an analog input. Params: `[interval_ms]`.
pub const ANALOG_READ: u16 = 5;
/// Stop all periodic activity on an id. Params: `[]` (pins) or
/// `[logical_id]` (peripherals).
pub const END: u16 = 6;

// ============================================================================
// Device Type Ids (200+)
// ============================================================================

/// First id reserved for peripheral device types.
pub const RESERVED_START: u16 = 200;
/// Addressable RGB(W) pixel strip.
pub const PIXEL_STRIP: u16 = 200;
/// Hobby servo controller.
pub const SERVO_CONTROL: u16 = 201;
/// Ultrasonic distance sensor.
pub const ULTRASONIC_CONTROL: u16 = 202;

// ============================================================================
// Pixel Strip Actions (10-19)
// ============================================================================

/// Set up a strip. Params: `[strip_id, pin, num_pixels, strip_type]`.
pub const PIXEL_INIT: u16 = 10;
/// Set one pixel. Params: `[strip_id, index, r, g, b (, w)]`.
pub const PIXEL_SET: u16 = 11;
/// Fill a range. Params: `[strip_id, packed_color, first, count]`.
pub const PIXEL_FILL: u16 = 12;
/// Clear all pixels. Params: `[strip_id]`.
pub const PIXEL_CLEAR: u16 = 13;
/// Set global brightness. Params: `[strip_id, value]`.
pub const PIXEL_BRIGHTNESS: u16 = 14;
/// Push the strip buffer to the LEDs. Params: `[strip_id]`.
pub const PIXEL_SHOW: u16 = 15;

// ============================================================================
// Servo Actions (20-29)
// ============================================================================

/// Attach a servo. Params: `[servo_id, pin, min_us, max_us]`.
pub const SERVO_ATTACH: u16 = 20;
/// Detach a servo. Params: `[servo_id]`.
pub const SERVO_DETACH: u16 = 21;
/// Write an angle in degrees. Params: `[servo_id, angle]`.
pub const SERVO_WRITE: u16 = 22;
/// Write a pulse width. Params: `[servo_id, microseconds]`.
pub const SERVO_WRITE_MICROSECONDS: u16 = 23;
/// Request the current angle. Params: `[servo_id]`.
pub const SERVO_READ: u16 = 24;
/// Request attach status. Params: `[servo_id]`.
pub const SERVO_ATTACHED: u16 = 25;

// ============================================================================
// Ultrasonic Actions (30-39)
// ============================================================================

/// Attach a sensor. Params: `[sensor_id, trig_pin (, echo_pin)]`.
pub const ULTRASONIC_ATTACH: u16 = 30;
/// Detach a sensor. Params: `[sensor_id]`.
pub const ULTRASONIC_DETACH: u16 = 31;
/// Read distance. Params: `[sensor_id, unit (, interval_ms)]`.
pub const ULTRASONIC_READ: u16 = 32;
/// Set echo timeout. Params: `[sensor_id, timeout_ms]`.
pub const ULTRASONIC_SET_TIMEOUT: u16 = 33;

// ============================================================================
// Inbound Id Spaces
// ============================================================================

/// Ids below this address raw pins directly.
pub const PIN_ID_LIMIT: u16 = 1000;
/// Base of the servo inbound id space (`1000..2000`).
pub const SERVO_MESSAGE_BASE: u16 = 1000;
/// Base of the ultrasonic inbound id space (`2000..3000`).
pub const ULTRASONIC_MESSAGE_BASE: u16 = 2000;
/// Width of each per-device-type inbound id space.
pub const MESSAGE_SPACE_WIDTH: u16 = 1000;

// ============================================================================
// Transport
// ============================================================================

/// Fixed WebSocket port the device firmware listens on.
pub const DEVICE_PORT: u16 = 81;
/// Wire protocol version carried in every outbound frame header.
pub const PROTOCOL_VERSION: u8 = 1;

// ============================================================================
// PinMode
// ============================================================================

/// Pin mode for [`Link::pin_mode`](crate::Link::pin_mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// Digital input.
    Input,
    /// Digital output.
    Output,
    /// Digital input with internal pull-up.
    InputPullup,
    /// Digital input with internal pull-down.
    InputPulldown,
    /// Open-drain digital output.
    OutputOpenDrain,
    /// Analog input (ADC).
    AnalogInput,
    /// Analog output (DAC/PWM).
    AnalogOutput,
}

impl PinMode {
    /// Wire encoding of the mode.
    #[inline]
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
            Self::InputPullup => 2,
            Self::InputPulldown => 3,
            Self::OutputOpenDrain => 4,
            Self::AnalogInput => 8,
            Self::AnalogOutput => 10,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_codes_match_firmware_table() {
        assert_eq!(PIN_MODE, 1);
        assert_eq!(DIGITAL_WRITE, 2);
        assert_eq!(DIGITAL_READ, 3);
        assert_eq!(ANALOG_WRITE, 4);
        assert_eq!(ANALOG_READ, 5);
        assert_eq!(END, 6);
    }

    #[test]
    fn test_device_type_ids() {
        assert_eq!(PIXEL_STRIP, 200);
        assert_eq!(SERVO_CONTROL, 201);
        assert_eq!(ULTRASONIC_CONTROL, 202);
        assert!(PIXEL_STRIP >= RESERVED_START);
    }

    #[test]
    fn test_pin_mode_codes() {
        assert_eq!(PinMode::Input.code(), 0);
        assert_eq!(PinMode::Output.code(), 1);
        assert_eq!(PinMode::InputPullup.code(), 2);
        assert_eq!(PinMode::AnalogInput.code(), 8);
        assert_eq!(PinMode::AnalogOutput.code(), 10);
    }

    #[test]
    fn test_message_spaces_do_not_overlap_pins() {
        assert!(SERVO_MESSAGE_BASE >= PIN_ID_LIMIT);
        assert_eq!(
            ULTRASONIC_MESSAGE_BASE,
            SERVO_MESSAGE_BASE + MESSAGE_SPACE_WIDTH
        );
    }
}
