//! Rate feedback for asynchronous USB audio.
//!
//! The device's audio clock, not the host's, decides the true sample rate.
//! The host learns it from the feedback endpoint, which reports the number of
//! samples per (micro)frame the device wants. That number is kept in a
//! [`FeedbackAccumulator`]: an integral controller on the receive buffer fill
//! level, nudged once per audio update.
//!
//! ## Fixed-point format
//!
//! The accumulator holds Q8.24 samples per 1 ms frame. The feedback endpoint
//! sends it shifted down to the wire format for the negotiated speed (see
//! [`UsbSpeed::feedback_shift`]):
//!
//! | Speed | Bytes | Format | Unit |
//! |-------|-------|--------|------|
//! | full  | 3 | 10.14 | samples per 1 ms frame |
//! | high  | 4 | 16.16 | samples per 125 µs microframe |

use core::sync::atomic::{AtomicU32, Ordering};

use super::config::{StreamConfig, UsbSpeed};

/// Fractional bits of the accumulator.
pub const FEEDBACK_FRAC_BITS: u32 = 24;

/// Accumulator change per sample of fill-level error, per audio update.
pub const DEFAULT_FILL_GAIN: i32 = 1;

/// Extra accumulator change on an update that found no received block.
pub const DEFAULT_UNDERRUN_BIAS: i32 = 3500;

/// Largest accepted [`FeedbackTuning::fill_gain`]. With a fill error of at
/// most one block, a full update's correction stays far below `i32::MAX`.
pub const MAX_FILL_GAIN: i32 = 1 << 16;

/// Largest accepted [`FeedbackTuning::underrun_bias`].
pub const MAX_UNDERRUN_BIAS: i32 = 1 << 20;

/// The accumulator stays within nominal ± nominal >> `FEEDBACK_LIMIT_SHIFT`
/// (12.5 %), inside what hosts accept from an asynchronous endpoint.
pub const FEEDBACK_LIMIT_SHIFT: u32 = 3;

/// Controller constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackTuning {
    pub fill_gain: i32,
    pub underrun_bias: i32,
}

impl FeedbackTuning {
    pub const DEFAULT: FeedbackTuning = FeedbackTuning {
        fill_gain: DEFAULT_FILL_GAIN,
        underrun_bias: DEFAULT_UNDERRUN_BIAS,
    };
}

impl Default for FeedbackTuning {
    fn default() -> Self {
        FeedbackTuning::DEFAULT
    }
}

/// Shared feedback value.
///
/// Written only from the audio update context, read from the feedback
/// endpoint's completion handler. Every store is a single 32-bit atomic, so a
/// reader sees either the old or the new value, never a mix.
pub struct FeedbackAccumulator {
    value: AtomicU32,
    floor: AtomicU32,
    ceiling: AtomicU32,
}

impl FeedbackAccumulator {
    pub const fn new() -> Self {
        let seed = StreamConfig::DEFAULT.feedback_seed();
        FeedbackAccumulator {
            value: AtomicU32::new(seed),
            floor: AtomicU32::new(seed - (seed >> FEEDBACK_LIMIT_SHIFT)),
            ceiling: AtomicU32::new(seed.saturating_add(seed >> FEEDBACK_LIMIT_SHIFT)),
        }
    }

    /// Restart from `nominal` (Q8.24 samples per frame).
    pub fn seed(&self, nominal: u32) {
        let span = nominal >> FEEDBACK_LIMIT_SHIFT;
        self.floor.store(nominal - span, Ordering::Relaxed);
        self.ceiling
            .store(nominal.saturating_add(span), Ordering::Relaxed);
        self.value.store(nominal, Ordering::Relaxed);
    }

    /// Current value, Q8.24 samples per frame.
    pub fn get(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }

    /// Add `delta` (Q8.24), clamped to the allowed band.
    ///
    /// Single writer only: the read-modify-write is not atomic as a whole.
    pub fn adjust(&self, delta: i32) {
        let floor = self.floor.load(Ordering::Relaxed);
        let ceiling = self.ceiling.load(Ordering::Relaxed);
        let next = self
            .get()
            .saturating_add_signed(delta)
            .clamp(floor, ceiling);
        self.value.store(next, Ordering::Relaxed);
    }

    /// Write the wire-format feedback for `speed` into `out`, returning the
    /// number of bytes written.
    pub fn encode(&self, speed: UsbSpeed, out: &mut [u8]) -> usize {
        encode_feedback(self.get(), speed, out)
    }
}

impl Default for FeedbackAccumulator {
    fn default() -> Self {
        FeedbackAccumulator::new()
    }
}

/// Format a Q8.24 samples-per-frame `value` as a little-endian feedback
/// payload for `speed`. Truncated if `out` is too short.
pub fn encode_feedback(value: u32, speed: UsbSpeed, out: &mut [u8]) -> usize {
    let wire = (value >> speed.feedback_shift()).to_le_bytes();
    let len = speed.feedback_len().min(out.len());
    out[..len].copy_from_slice(&wire[..len]);
    len
}
