//! The complete USB audio function.
//!
//! [`UsbAudio`] ties the receive path, the transmit path, the feedback
//! endpoint and the feature unit to one session configuration. Board support
//! code forwards endpoint completions to the `*_event` methods; the audio
//! update drives the two nodes through [`input`](UsbAudio::input) and
//! [`output`](UsbAudio::output).
//!
//! ## Usage with RTIC
//!
//! ```ignore
//! static AUDIO: UsbAudio<2> = UsbAudio::new();
//!
//! // On SET_CONFIGURATION:
//! AUDIO.configure(StreamConfig::new().with_speed(UsbSpeed::High))?;
//! AUDIO.start(&mut rx_ep, &mut sync_ep, &mut tx_ep);
//!
//! // Endpoint completion ISRs:
//! AUDIO.rx_event(&mut rx_ep, Some(received_len));
//! AUDIO.sync_event(&mut sync_ep);
//! AUDIO.tx_event(&mut tx_ep);
//!
//! // Audio update:
//! let from_host = AUDIO.input().handoff();
//! AUDIO.output().enqueue([left, right]);
//! ```

use core::cell::Cell;

use critical_section::Mutex;

use super::config::{ConfigError, StreamConfig};
use super::endpoint::IsoEndpoint;
use super::features::FeatureUnit;
use super::input::AudioInputUsb;
use super::output::AudioOutputUsb;

/// Counter snapshot for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    pub rx_overruns: u32,
    pub rx_underruns: u32,
    pub tx_overruns: u32,
    pub tx_underruns: u32,
    /// Current feedback accumulator, Q8.24 samples per frame.
    pub feedback: u32,
}

/// USB audio function with a stereo receive stream and a `CH`-channel
/// transmit stream.
pub struct UsbAudio<const CH: usize> {
    input: AudioInputUsb,
    output: AudioOutputUsb<CH>,
    features: FeatureUnit,
    config: Mutex<Cell<StreamConfig>>,
}

impl<const CH: usize> UsbAudio<CH> {
    pub const fn new() -> Self {
        UsbAudio {
            input: AudioInputUsb::new(),
            output: AudioOutputUsb::new(),
            features: FeatureUnit::new(),
            config: Mutex::new(Cell::new(StreamConfig::DEFAULT)),
        }
    }

    /// Begin a new session with `config`.
    ///
    /// Every queued block is released, counters and feedback are reset and
    /// transmit streaming is disabled. An invalid configuration is rejected
    /// before anything is touched.
    pub fn configure(&self, config: StreamConfig) -> Result<(), ConfigError> {
        config.validate(CH)?;
        self.input.configure(&config)?;
        self.output.configure(&config)?;
        critical_section::with(|cs| self.config.borrow(cs).set(config));
        self.features.reset();
        log::info!(
            "usb audio configured: {} Hz, {:?} speed, {} tx channels",
            config.sample_rate,
            config.speed,
            CH
        );
        Ok(())
    }

    pub fn config(&self) -> StreamConfig {
        critical_section::with(|cs| self.config.borrow(cs).get())
    }

    /// Prime all three endpoints after configuration.
    pub fn start<R, S, T>(&self, rx: &mut R, sync: &mut S, tx: &mut T)
    where
        R: IsoEndpoint,
        S: IsoEndpoint,
        T: IsoEndpoint,
    {
        self.rx_event(rx, None);
        self.sync_event(sync);
        self.tx_event(tx);
    }

    /// Receive completion: absorb `received` bytes, if any, and re-arm.
    pub fn rx_event<E: IsoEndpoint>(&self, ep: &mut E, received: Option<usize>) {
        let buf = ep.buffer();
        let capacity = buf.len();
        if let Some(len) = received {
            self.input.receive(&buf[..len.min(capacity)]);
        }
        ep.arm(capacity);
    }

    /// Feedback completion: report the current rate and re-arm.
    pub fn sync_event<E: IsoEndpoint>(&self, ep: &mut E) {
        let speed = self.config().speed;
        let len = self.input.feedback().encode(speed, ep.buffer());
        ep.arm(len);
    }

    /// Transmit completion: build the next packet and arm it.
    pub fn tx_event<E: IsoEndpoint>(&self, ep: &mut E) {
        let len = self.output.packetize(ep.buffer());
        ep.arm(len);
    }

    pub fn input(&self) -> &AudioInputUsb {
        &self.input
    }

    pub fn output(&self) -> &AudioOutputUsb<CH> {
        &self.output
    }

    pub fn features(&self) -> &FeatureUnit {
        &self.features
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            rx_overruns: self.input.overrun_count(),
            rx_underruns: self.input.underrun_count(),
            tx_overruns: self.output.overrun_count(),
            tx_underruns: self.output.underrun_count(),
            feedback: self.input.feedback().get(),
        }
    }
}

impl<const CH: usize> Default for UsbAudio<CH> {
    fn default() -> Self {
        UsbAudio::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::pool::{self, POOL};
    use crate::usb::config::UsbSpeed;
    use crate::usb::feedback::FeedbackTuning;
    use crate::usb::endpoint::TestEndpoint;

    #[test]
    fn start_primes_every_endpoint() {
        let _pool = pool::exclusive();
        let audio = UsbAudio::<2>::new();
        audio.configure(StreamConfig::new()).unwrap();

        let mut rx = TestEndpoint::<192>::new();
        let mut sync = TestEndpoint::<4>::new();
        let mut tx = TestEndpoint::<180>::new();
        audio.start(&mut rx, &mut sync, &mut tx);

        assert_eq!(rx.armed, [192]);
        assert_eq!(sync.armed, [3]);
        assert_eq!(
            u32::from_le_bytes([sync.buf[0], sync.buf[1], sync.buf[2], 0]),
            722_534
        );
        assert_eq!(tx.armed, [44 * 2 * 2]);
        assert!(tx.payload().iter().all(|&b| b == 0));
    }

    #[test]
    fn rx_event_rearms_even_on_oversized_report() {
        let _pool = pool::exclusive();
        let audio = UsbAudio::<2>::new();
        audio.configure(StreamConfig::new()).unwrap();

        let mut rx = TestEndpoint::<16>::new();
        rx.buf.copy_from_slice(&[1; 16]);
        audio.rx_event(&mut rx, Some(1000));
        assert_eq!(rx.armed, [16]);
        assert_eq!(audio.input().fill_level(), 4);
    }

    #[test]
    fn high_speed_feedback_is_per_microframe() {
        let _pool = pool::exclusive();
        let audio = UsbAudio::<2>::new();
        audio
            .configure(StreamConfig::new().with_sample_rate(48_000).with_speed(UsbSpeed::High))
            .unwrap();

        let mut sync = TestEndpoint::<4>::new();
        audio.sync_event(&mut sync);
        assert_eq!(sync.armed, [4]);
        assert_eq!(u32::from_le_bytes(sync.buf), 6 << 16);
    }

    #[test]
    fn invalid_config_keeps_session() {
        let _pool = pool::exclusive();
        let audio = UsbAudio::<2>::new();
        let session = StreamConfig::new().with_sample_rate(48_000);
        audio.configure(session).unwrap();
        audio.output().set_enabled(true);
        audio.output().enqueue([None, None]);

        assert_eq!(
            audio.configure(StreamConfig::new().with_sample_rate(0)),
            Err(ConfigError::ZeroSampleRate)
        );
        let runaway = FeedbackTuning {
            fill_gain: i32::MAX,
            underrun_bias: 0,
        };
        assert!(matches!(
            audio.configure(session.with_tuning(runaway)),
            Err(ConfigError::TuningOutOfRange { .. })
        ));
        assert_eq!(audio.config(), session);
        assert!(audio.output().is_enabled());
        assert_eq!(POOL.allocated_count(), 2);

        assert_eq!(
            UsbAudio::<0>::new().configure(StreamConfig::new()),
            Err(ConfigError::NoChannels)
        );
    }

    #[test]
    fn configure_resets_features_and_stats() {
        let _pool = pool::exclusive();
        let audio = UsbAudio::<2>::new();
        audio.configure(StreamConfig::new()).unwrap();
        audio.input().handoff();
        audio
            .features()
            .set_feature(
                &crate::usb::features::SetupPacket::from_bytes([0x21, 0x01, 0, 0x01, 0, 0, 1, 0]),
                &[1],
            )
            .unwrap();
        assert_eq!(audio.stats().rx_underruns, 1);
        assert!(audio.features().mute());

        audio.configure(StreamConfig::new()).unwrap();
        assert_eq!(
            audio.stats(),
            StreamStats {
                feedback: StreamConfig::new().feedback_seed(),
                ..StreamStats::default()
            }
        );
        assert!(!audio.features().mute());
    }
}
