//! USB audio receive path (host → device).
//!
//! [`AudioInputUsb`] reassembles the irregular isochronous packets the host
//! sends into 128-sample left/right blocks and hands them to the audio graph
//! once per update. Fill level at update time drives the rate feedback.
//!
//! ## Architecture
//!
//! ```text
//! RX completion (ISR)                          audio update
//! ┌─────────────┐   ┌──────────────┐   ┌───────┐   ┌──────────────┐
//! │ N×4 bytes   ├──►│ incoming L/R ├──►│ ready ├──►│ outputs[0,1] │
//! │ L R L R ... │   │ count / 128  │   │ (1)   │   └──────────────┘
//! └─────────────┘   └──────────────┘   └───────┘   fill → feedback
//! ```
//!
//! The receive state has two modes:
//!
//! - **accumulating**: `incoming` has room; arrivals are copied in, and every
//!   completed pair moves to the empty `ready` mailbox.
//! - **stalled**: `incoming` is full and `ready` is still occupied because
//!   the graph has not drained it. Further arrivals are dropped and counted
//!   as overruns until the next update empties the mailbox.
//!
//! Both contexts reach the state through one critical section, so the
//! completion handler can never observe a half-drained mailbox.
//!
//! Overruns are logged at `warn` on the 1st, 2nd, 4th, 8th, ... occurrence
//! of a session; [`AudioInputUsb::overrun_count`] has the exact figure.
//!
//! ## Reference
//!
//! Ported from `teensy4/usb_audio.cpp` (`AudioInputUSB`).

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use crate::block::{AudioBlockMut, AudioBlockRef};
use crate::constants::AUDIO_BLOCK_SAMPLES;
use crate::node::AudioNode;

use super::config::{ConfigError, StreamConfig};
use super::feedback::{FeedbackAccumulator, FeedbackTuning};
use super::wire::{deinterleave_stereo, RX_FRAME_BYTES};

/// Fill level the feedback loop steers towards at update time.
const FILL_TARGET: i32 = (AUDIO_BLOCK_SAMPLES / 2) as i32;

/// Whether the `count`th event of a kind is logged: powers of two only.
pub(crate) fn worth_reporting(count: u32) -> bool {
    count.is_power_of_two()
}

/// Observable receive mode, see the [module docs](self).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    Accumulating,
    Stalled,
}

struct StereoPair {
    left: AudioBlockMut,
    right: AudioBlockMut,
}

impl StereoPair {
    fn alloc() -> Option<Self> {
        let left = AudioBlockMut::alloc()?;
        let right = AudioBlockMut::alloc()?;
        Some(StereoPair { left, right })
    }
}

/// What happened to one arrival.
enum Absorbed {
    All,
    /// Mailbox full; this many trailing bytes were dropped.
    Overrun(usize),
    /// No block available; this many bytes were dropped.
    OutOfBlocks(usize),
}

struct RxState {
    incoming: Option<StereoPair>,
    /// Samples already written to `incoming`.
    count: usize,
    ready: Option<StereoPair>,
    /// Host traffic seen since the last update.
    active: bool,
}

impl RxState {
    const fn new() -> Self {
        RxState {
            incoming: None,
            count: 0,
            ready: None,
            active: false,
        }
    }

    /// Empty the state, returning it so the blocks are released by the caller.
    fn reset(&mut self) -> RxState {
        core::mem::replace(self, RxState::new())
    }

    fn absorb(&mut self, mut src: &[u8]) -> Absorbed {
        if src.is_empty() {
            return Absorbed::All;
        }
        let mut pair = match self.incoming.take() {
            Some(pair) => pair,
            None => match StereoPair::alloc() {
                Some(pair) => {
                    self.count = 0;
                    pair
                }
                None => return Absorbed::OutOfBlocks(src.len()),
            },
        };

        loop {
            let frames = (AUDIO_BLOCK_SAMPLES - self.count).min(src.len() / RX_FRAME_BYTES);
            if frames > 0 {
                let (chunk, rest) = src.split_at(frames * RX_FRAME_BYTES);
                let span = self.count..self.count + frames;
                deinterleave_stereo(chunk, &mut pair.left[span.clone()], &mut pair.right[span]);
                self.count += frames;
                src = rest;
            }

            if self.count < AUDIO_BLOCK_SAMPLES {
                self.incoming = Some(pair);
                return Absorbed::All;
            }

            if self.ready.is_some() {
                self.incoming = Some(pair);
                return if src.is_empty() {
                    Absorbed::All
                } else {
                    Absorbed::Overrun(src.len())
                };
            }

            self.ready = Some(pair);
            self.count = 0;
            pair = match StereoPair::alloc() {
                Some(next) => next,
                None if src.is_empty() => return Absorbed::All,
                None => return Absorbed::OutOfBlocks(src.len()),
            };
        }
    }
}

/// USB audio receive node: isochronous OUT endpoint → two graph outputs.
///
/// Implements [`AudioNode`] with 0 inputs and 2 outputs (left, right).
///
/// All methods take `&self`, so one instance can be shared between the
/// endpoint's completion handler ([`receive`](Self::receive)) and the audio
/// update ([`handoff`](Self::handoff)), typically from a `static`.
pub struct AudioInputUsb {
    state: Mutex<RefCell<RxState>>,
    tuning: Mutex<Cell<FeedbackTuning>>,
    feedback: FeedbackAccumulator,
    overruns: AtomicU32,
    underruns: AtomicU32,
}

impl AudioInputUsb {
    pub const fn new() -> Self {
        AudioInputUsb {
            state: Mutex::new(RefCell::new(RxState::new())),
            tuning: Mutex::new(Cell::new(FeedbackTuning::DEFAULT)),
            feedback: FeedbackAccumulator::new(),
            overruns: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
        }
    }

    /// Start a new session: release every held block, reseed the feedback
    /// loop and zero the counters.
    ///
    /// A configuration that fails [`StreamConfig::validate_stream`] is
    /// rejected and the current session is left untouched.
    pub fn configure(&self, config: &StreamConfig) -> Result<(), ConfigError> {
        config.validate_stream()?;
        let previous = critical_section::with(|cs| {
            self.tuning.borrow(cs).set(config.tuning);
            self.state.borrow_ref_mut(cs).reset()
        });
        drop(previous);
        self.feedback.seed(config.feedback_seed());
        self.overruns.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Consume one completed receive transfer.
    ///
    /// `data` is interleaved stereo; a trailing partial frame is ignored.
    /// Never blocks and never grows memory: whatever does not fit is dropped.
    pub fn receive(&self, data: &[u8]) {
        let whole = data.len() - data.len() % RX_FRAME_BYTES;
        let outcome = critical_section::with(|cs| {
            let mut rx = self.state.borrow_ref_mut(cs);
            rx.active = true;
            rx.absorb(&data[..whole])
        });

        match outcome {
            Absorbed::All => {}
            Absorbed::Overrun(dropped) => {
                let overruns = self.overruns.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
                if worth_reporting(overruns) {
                    log::warn!("usb rx overrun #{}, dropped {} bytes", overruns, dropped);
                }
            }
            Absorbed::OutOfBlocks(dropped) => {
                log::debug!("usb rx out of audio blocks, dropped {} bytes", dropped);
            }
        }
    }

    /// Take the completed block pair, if any, and run one feedback step.
    ///
    /// Call once per audio update. Returns `(left, right)`; ownership moves to
    /// the caller. An empty mailbox counts as an underrun.
    pub fn handoff(&self) -> Option<(AudioBlockMut, AudioBlockMut)> {
        let (ready, fill, active, tuning) = critical_section::with(|cs| {
            let mut rx = self.state.borrow_ref_mut(cs);
            let active = core::mem::take(&mut rx.active);
            (rx.ready.take(), rx.count, active, self.tuning.borrow(cs).get())
        });

        if active {
            let diff = FILL_TARGET - fill as i32;
            self.feedback.adjust(diff.saturating_mul(tuning.fill_gain));
        }

        match ready {
            Some(pair) => Some((pair.left, pair.right)),
            None => {
                self.underruns.fetch_add(1, Ordering::Relaxed);
                if active {
                    self.feedback.adjust(tuning.underrun_bias);
                }
                log::trace!("usb rx underrun");
                None
            }
        }
    }

    pub fn feedback(&self) -> &FeedbackAccumulator {
        &self.feedback
    }

    /// Samples written to the block pair currently being filled.
    pub fn fill_level(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).count)
    }

    pub fn state(&self) -> ReceiveState {
        critical_section::with(|cs| {
            let rx = self.state.borrow_ref(cs);
            if rx.ready.is_some() && rx.count >= AUDIO_BLOCK_SAMPLES {
                ReceiveState::Stalled
            } else {
                ReceiveState::Accumulating
            }
        })
    }

    /// Arrivals that lost data because the mailbox was full.
    pub fn overrun_count(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Updates that found no completed block pair.
    pub fn underrun_count(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl Default for AudioInputUsb {
    fn default() -> Self {
        AudioInputUsb::new()
    }
}

impl AudioNode for AudioInputUsb {
    const NUM_INPUTS: usize = 0;
    const NUM_OUTPUTS: usize = 2;

    fn update(
        &mut self,
        _inputs: &[Option<AudioBlockRef>],
        outputs: &mut [Option<AudioBlockMut>],
    ) {
        let (left, right) = match self.handoff() {
            Some((left, right)) => (Some(left), Some(right)),
            None => (None, None),
        };
        outputs[0] = left;
        outputs[1] = right;
    }
}
