//! Addressable RGB(W) pixel strip handle.
//!
//! Pixel operations buffer locally and transmit nothing until
//! [`PixelStrip::show`], which flushes the accumulated commands as one batch
//! followed by a show command. A Euclidean color-distance threshold drops
//! per-pixel updates too small to see, so animation loops stay cheap on the
//! wire.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::Result;
use crate::link::Link;
use crate::protocol::CommandDescriptor;
use crate::protocol::defs::{
    PIXEL_BRIGHTNESS, PIXEL_CLEAR, PIXEL_FILL, PIXEL_INIT, PIXEL_SET, PIXEL_SHOW, PIXEL_STRIP,
};

use super::{DecodedMessage, MessageHandler};

// ============================================================================
// Strip wiring constants
// ============================================================================

/// Color-order and signal-frequency flags for [`PixelStrip::init_with_type`].
///
/// Combine one color order with one frequency, e.g. `GRB + KHZ800` (the
/// default for most strips).
pub mod strip_type {
    /// Red, green, blue order.
    pub const RGB: i64 = 0x06;
    /// Green, red, blue order (WS2812 and friends).
    pub const GRB: i64 = 0x52;
    /// Blue, red, green order.
    pub const BRG: i64 = 0x58;
    /// Blue, green, red order.
    pub const BGR: i64 = 0xA4;

    /// 800 kHz data signal (most modern strips).
    pub const KHZ800: i64 = 0x0000;
    /// 400 kHz data signal (older strips).
    pub const KHZ400: i64 = 0x0100;
}

/// Default change threshold: Euclidean distance in RGBW space.
const DEFAULT_COLOR_THRESHOLD: f64 = 5.0;

// ============================================================================
// ColorSpec
// ============================================================================

/// A color given either packed or by components.
///
/// Packed layout is `0xWWRRGGBB`; the white channel is only transmitted when
/// non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpec {
    /// Packed `0xWWRRGGBB`.
    Packed(u32),
    /// Explicit channels.
    Rgbw {
        /// Red channel.
        r: u8,
        /// Green channel.
        g: u8,
        /// Blue channel.
        b: u8,
        /// White channel (RGBW strips only).
        w: u8,
    },
}

impl ColorSpec {
    /// An RGB color (white channel zero).
    #[inline]
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::Rgbw { r, g, b, w: 0 }
    }

    /// An RGBW color.
    #[inline]
    #[must_use]
    pub const fn rgbw(r: u8, g: u8, b: u8, w: u8) -> Self {
        Self::Rgbw { r, g, b, w }
    }

    /// Packs into `0xWWRRGGBB`.
    #[must_use]
    pub const fn pack(self) -> u32 {
        let (r, g, b, w) = self.components();
        ((w as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
    }

    /// Splits into `(r, g, b, w)` channels.
    #[must_use]
    pub const fn components(self) -> (u8, u8, u8, u8) {
        match self {
            Self::Packed(color) => (
                ((color >> 16) & 0xFF) as u8,
                ((color >> 8) & 0xFF) as u8,
                (color & 0xFF) as u8,
                ((color >> 24) & 0xFF) as u8,
            ),
            Self::Rgbw { r, g, b, w } => (r, g, b, w),
        }
    }
}

impl From<u32> for ColorSpec {
    fn from(color: u32) -> Self {
        Self::Packed(color)
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Rgbw {
    r: u8,
    g: u8,
    b: u8,
    w: u8,
}

impl Rgbw {
    fn distance(self, other: Self) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        let dw = f64::from(self.w) - f64::from(other.w);
        (dr * dr + dg * dg + db * db + dw * dw).sqrt()
    }

    fn pack(self) -> u32 {
        ColorSpec::rgbw(self.r, self.g, self.b, self.w).pack()
    }
}

struct PixelState {
    buffer: FxHashMap<u32, Rgbw>,
    pending: Vec<CommandDescriptor>,
    brightness: i64,
    num_pixels: u32,
    threshold: f64,
}

impl PixelState {
    fn new() -> Self {
        Self {
            buffer: FxHashMap::default(),
            pending: Vec::new(),
            brightness: 255,
            num_pixels: 0,
            threshold: DEFAULT_COLOR_THRESHOLD,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// The strip device type reports nothing back; log anything unexpected.
struct PixelEvents;

impl MessageHandler for PixelEvents {
    fn handle_message(&mut self, message: DecodedMessage) {
        debug!(
            id = message.id,
            kind = message.kind,
            "Unexpected pixel-strip message"
        );
    }
}

// ============================================================================
// PixelStrip
// ============================================================================

/// Handle to one addressable pixel strip.
///
/// Obtained from [`Link::add_pixel_strip`]. Nothing reaches the device until
/// [`show`](Self::show).
pub struct PixelStrip {
    link: Link,
    logical_id: u16,
    state: Arc<Mutex<PixelState>>,
}

impl PixelStrip {
    pub(crate) fn register(link: Link, name: String) -> Result<Self> {
        let logical_id = link.add_peripheral(name, PIXEL_STRIP, Box::new(PixelEvents))?;

        Ok(Self {
            link,
            logical_id,
            state: Arc::new(Mutex::new(PixelState::new())),
        })
    }

    /// Logical id within the pixel-strip device type.
    #[inline]
    #[must_use]
    pub fn logical_id(&self) -> u16 {
        self.logical_id
    }

    /// Initializes the strip on a pin with `GRB + KHZ800` wiring.
    pub fn init(&self, pin: u16, num_pixels: u32) {
        self.init_with_type(pin, num_pixels, strip_type::GRB + strip_type::KHZ800);
    }

    /// Initializes the strip with explicit [`strip_type`] flags.
    ///
    /// Buffered until [`show`](Self::show), like every other strip command.
    pub fn init_with_type(&self, pin: u16, num_pixels: u32, kind: i64) {
        let mut state = self.state.lock();
        state.num_pixels = num_pixels;
        state.buffer.clear();

        state.pending.push(CommandDescriptor::new(
            PIXEL_STRIP,
            PIXEL_INIT,
            vec![
                i64::from(self.logical_id),
                i64::from(pin),
                i64::from(num_pixels),
                kind,
            ],
        ));
    }

    /// Buffers one pixel's color.
    ///
    /// Dropped when the change from the buffered color is within the
    /// threshold. The white channel is only put on the wire when non-zero.
    pub fn set_pixel(&self, index: u32, color: impl Into<ColorSpec>) {
        let (r, g, b, w) = color.into().components();
        let next = Rgbw { r, g, b, w };

        let mut state = self.state.lock();
        let last = state.buffer.get(&index).copied().unwrap_or_default();
        if next.distance(last) <= state.threshold {
            return;
        }

        let mut params = vec![
            i64::from(self.logical_id),
            i64::from(index),
            i64::from(r),
            i64::from(g),
            i64::from(b),
        ];
        if w > 0 {
            params.push(i64::from(w));
        }

        state
            .pending
            .push(CommandDescriptor::new(PIXEL_STRIP, PIXEL_SET, params));
        state.buffer.insert(index, next);
    }

    /// Buffers a fill of `count` pixels starting at `first`; `count` 0
    /// means the rest of the strip.
    ///
    /// One fill command is buffered when at least one covered pixel changes
    /// beyond the threshold.
    pub fn fill(&self, color: impl Into<ColorSpec>, first: u32, count: u32) {
        let color = color.into();
        let (r, g, b, w) = color.components();
        let next = Rgbw { r, g, b, w };

        let mut state = self.state.lock();
        let num_to_fill = if count == 0 {
            state.num_pixels.saturating_sub(first)
        } else {
            count
        };

        let mut changed = false;
        let end = first.saturating_add(num_to_fill).min(state.num_pixels);
        for i in first..end {
            let last = state.buffer.get(&i).copied().unwrap_or_default();
            if next.distance(last) > state.threshold {
                state.buffer.insert(i, next);
                changed = true;
            }
        }

        if changed {
            state.pending.push(CommandDescriptor::new(
                PIXEL_STRIP,
                PIXEL_FILL,
                vec![
                    i64::from(self.logical_id),
                    i64::from(color.pack()),
                    i64::from(first),
                    i64::from(num_to_fill),
                ],
            ));
        }
    }

    /// Buffers a fill of the whole strip.
    pub fn fill_all(&self, color: impl Into<ColorSpec>) {
        self.fill(color, 0, 0);
    }

    /// Buffers a clear: every pixel to black.
    pub fn clear(&self) {
        let mut state = self.state.lock();

        state.pending.push(CommandDescriptor::new(
            PIXEL_STRIP,
            PIXEL_CLEAR,
            vec![i64::from(self.logical_id)],
        ));

        let num_pixels = state.num_pixels;
        state.buffer.clear();
        for i in 0..num_pixels {
            state.buffer.insert(i, Rgbw::default());
        }
    }

    /// Buffers a brightness change (0–255); dropped when the change is
    /// below the threshold.
    pub fn set_brightness(&self, value: u8) {
        let mut state = self.state.lock();
        let value = i64::from(value);

        if (value - state.brightness).abs() as f64 >= state.threshold {
            state.pending.push(CommandDescriptor::new(
                PIXEL_STRIP,
                PIXEL_BRIGHTNESS,
                vec![i64::from(self.logical_id), value],
            ));
            state.brightness = value;
        }
    }

    /// Flushes buffered commands followed by a show command.
    ///
    /// No-op when nothing is buffered, so redundant calls inside an
    /// animation loop cost nothing.
    pub fn show(&self) {
        let pending = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                return;
            }
            std::mem::take(&mut state.pending)
        };

        self.link.enqueue_batch(pending);
        self.link.enqueue(CommandDescriptor::new(
            PIXEL_STRIP,
            PIXEL_SHOW,
            vec![i64::from(self.logical_id)],
        ));
    }

    /// The buffered color of a pixel as packed `0xWWRRGGBB`; 0 when out of
    /// range.
    #[must_use]
    pub fn pixel_color(&self, index: u32) -> u32 {
        let state = self.state.lock();
        if index >= state.num_pixels {
            return 0;
        }
        state.buffer.get(&index).copied().unwrap_or_default().pack()
    }

    /// Configured strip length.
    #[must_use]
    pub fn num_pixels(&self) -> u32 {
        self.state.lock().num_pixels
    }

    /// Sets the color-distance change threshold.
    pub fn set_threshold(&self, threshold: f64) {
        self.state.lock().threshold = threshold.round();
    }
}

// ============================================================================
// Tests
// ============================================================================
