//! Per-session stream configuration.
//!
//! A [`StreamConfig`] is fixed for the lifetime of a USB session: it is
//! applied by [`UsbAudio::configure`](super::UsbAudio::configure) whenever the
//! host (re)configures the device and every derived quantity (feedback seed,
//! feedback wire format, packet pacing) is computed from it.

use thiserror::Error;

use crate::constants::{AUDIO_BLOCK_SAMPLES, AUDIO_SAMPLE_RATE, USB_FRAMES_PER_SECOND};

use super::feedback::{FeedbackTuning, FEEDBACK_FRAC_BITS, MAX_FILL_GAIN, MAX_UNDERRUN_BIAS};
use super::pacing::RateAdapter;

/// Negotiated USB operating speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbSpeed {
    /// 12 Mbit/s, 1 ms frames.
    Full,
    /// 480 Mbit/s, 125 µs microframes.
    High,
}

impl UsbSpeed {
    /// Size of a feedback endpoint payload in bytes.
    pub const fn feedback_len(self) -> usize {
        match self {
            UsbSpeed::Full => 3,
            UsbSpeed::High => 4,
        }
    }

    /// Right shift taking the Q8.24 samples-per-frame accumulator to the wire
    /// format: 10.14 samples per frame at full speed, 16.16 samples per
    /// microframe at high speed (one extra bit per halving of the interval,
    /// three for the 8 microframes of a frame).
    pub const fn feedback_shift(self) -> u32 {
        match self {
            UsbSpeed::Full => FEEDBACK_FRAC_BITS - 14,
            UsbSpeed::High => FEEDBACK_FRAC_BITS - 16 + 3,
        }
    }
}

/// Reasons a [`StreamConfig`] cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("at least one transmit channel is required")]
    NoChannels,
    #[error("{samples} samples per packet exceed one {capacity}-sample block")]
    PacketExceedsBlock { samples: usize, capacity: usize },
    #[error("feedback tuning out of range (fill gain {fill_gain}, underrun bias {underrun_bias})")]
    TuningOutOfRange { fill_gain: i32, underrun_bias: i32 },
}

/// Static description of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Nominal sample rate in Hz, shared by both directions.
    pub sample_rate: u32,
    pub speed: UsbSpeed,
    pub tuning: FeedbackTuning,
}

impl StreamConfig {
    pub const DEFAULT: StreamConfig = StreamConfig::new();

    pub const fn new() -> Self {
        StreamConfig {
            sample_rate: AUDIO_SAMPLE_RATE,
            speed: UsbSpeed::Full,
            tuning: FeedbackTuning::DEFAULT,
        }
    }

    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub const fn with_speed(mut self, speed: UsbSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub const fn with_tuning(mut self, tuning: FeedbackTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Nominal rate as Q8.24 samples per 1 ms frame, rounded to nearest.
    pub const fn feedback_seed(&self) -> u32 {
        let scaled = (self.sample_rate as u64) << FEEDBACK_FRAC_BITS;
        let per_frame = (scaled + USB_FRAMES_PER_SECOND as u64 / 2) / USB_FRAMES_PER_SECOND as u64;
        if per_frame > u32::MAX as u64 {
            u32::MAX
        } else {
            per_frame as u32
        }
    }

    /// Largest sample count the transmit pacer will ask for in one packet.
    pub const fn max_packet_samples(&self) -> usize {
        self.pacer().max_target()
    }

    /// A fresh transmit pacer for this session.
    pub const fn pacer(&self) -> RateAdapter {
        RateAdapter::new(self.sample_rate, USB_FRAMES_PER_SECOND)
    }

    /// Check the settings both directions share: a non-zero rate and
    /// controller constants small enough that one update's correction
    /// cannot overflow.
    pub fn validate_stream(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        let FeedbackTuning {
            fill_gain,
            underrun_bias,
        } = self.tuning;
        if !(0..=MAX_FILL_GAIN).contains(&fill_gain)
            || !(0..=MAX_UNDERRUN_BIAS).contains(&underrun_bias)
        {
            return Err(ConfigError::TuningOutOfRange {
                fill_gain,
                underrun_bias,
            });
        }
        Ok(())
    }

    /// Check that this configuration can drive `channels` transmit channels.
    ///
    /// A packet may drain at most one block promotion, so the per-packet
    /// target (including the carry sample) must fit in one block.
    pub fn validate(&self, channels: usize) -> Result<(), ConfigError> {
        self.validate_stream()?;
        if channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        let samples = self.max_packet_samples();
        if samples > AUDIO_BLOCK_SAMPLES {
            return Err(ConfigError::PacketExceedsBlock {
                samples,
                capacity: AUDIO_BLOCK_SAMPLES,
            });
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig::new()
    }
}
