//! USB audio transmit path (device → host).
//!
//! [`AudioOutputUsb`] takes `CH` channel blocks from the audio graph on each
//! update and streams them to the host, a few dozen samples per isochronous
//! packet, through a two-slot queue.
//!
//! ## Architecture
//!
//! ```text
//! audio update                                 TX opportunity (ISR)
//! ┌────────────┐   ┌──────────┐   ┌──────────────────┐   ┌────────────────┐
//! │ inputs[CH] ├──►│ ready    ├──►│ outgoing @offset ├──►│ c0 c1 .. cN-1  │
//! └────────────┘   └──────────┘   └──────────────────┘   │ c0 c1 .. (LE)  │
//!                                                         └────────────────┘
//! ```
//!
//! Each slot holds either every channel's block or nothing, so the channels
//! are always at the same offset. Packet sizes come from a [`RateAdapter`],
//! which keeps the long-run sample count exact for non-integer rates.
//!
//! ## Reference
//!
//! Ported from `teensy4/usb_audio.cpp` (`AudioOutputUSB`).

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::block::{AudioBlockMut, AudioBlockRef};
use crate::constants::AUDIO_BLOCK_SAMPLES;
use crate::node::AudioNode;

use super::config::{ConfigError, StreamConfig};
use super::pacing::RateAdapter;
use super::wire::{interleave_channels, silence, SAMPLE_BYTES};

/// One block per channel, all at the same read position.
type ChannelSet<const CH: usize> = [AudioBlockRef; CH];

/// Observable queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitState {
    Empty,
    /// Only `outgoing` is held.
    Single,
    /// `outgoing` and `ready` are both held.
    Double,
}

struct TxState<const CH: usize> {
    outgoing: Option<ChannelSet<CH>>,
    ready: Option<ChannelSet<CH>>,
    /// Samples of `outgoing` already sent.
    offset: usize,
    pacer: RateAdapter,
}

impl<const CH: usize> TxState<CH> {
    const fn new(config: &StreamConfig) -> Self {
        TxState {
            outgoing: None,
            ready: None,
            offset: 0,
            pacer: config.pacer(),
        }
    }

    /// Empty both slots, returning whatever they held.
    fn drain(&mut self) -> [Option<ChannelSet<CH>>; 2] {
        self.offset = 0;
        [self.outgoing.take(), self.ready.take()]
    }

    /// Install a new set. Returns the set discarded on overrun.
    fn install(&mut self, set: ChannelSet<CH>) -> Option<ChannelSet<CH>> {
        if self.outgoing.is_none() {
            self.outgoing = Some(set);
            self.offset = 0;
            None
        } else if self.ready.is_none() {
            self.ready = Some(set);
            None
        } else {
            self.offset = 0;
            let stale = core::mem::replace(&mut self.outgoing, self.ready.take());
            self.ready = Some(set);
            stale
        }
    }

    /// Write the next `frames` frames into `dest`, returning how many came
    /// from real blocks. Stops at the first gap and zero-fills from there.
    fn drain_into(&mut self, dest: &mut [u8], frames: usize) -> (usize, Option<ChannelSet<CH>>) {
        let frame_bytes = CH * SAMPLE_BYTES;
        let mut written = 0;
        let mut released = None;

        while written < frames {
            let Some(outgoing) = self.outgoing.as_ref() else {
                silence(&mut dest[written * frame_bytes..frames * frame_bytes]);
                return (written, released);
            };

            let run = (frames - written).min(AUDIO_BLOCK_SAMPLES - self.offset);
            let out = &mut dest[written * frame_bytes..(written + run) * frame_bytes];
            interleave_channels(out, outgoing, self.offset);
            written += run;
            self.offset += run;

            if self.offset >= AUDIO_BLOCK_SAMPLES {
                debug_assert!(released.is_none(), "two blocks finished in one packet");
                released = core::mem::replace(&mut self.outgoing, self.ready.take());
                self.offset = 0;
            }
        }
        (written, released)
    }
}

/// USB audio transmit node: `CH` graph inputs → isochronous IN endpoint.
///
/// Implements [`AudioNode`] with `CH` inputs and 0 outputs.
///
/// Like [`AudioInputUsb`](super::AudioInputUsb), every method takes `&self`;
/// [`enqueue`](Self::enqueue) runs in the audio update and
/// [`packetize`](Self::packetize) in the transmit completion handler.
pub struct AudioOutputUsb<const CH: usize> {
    state: Mutex<RefCell<TxState<CH>>>,
    enabled: AtomicBool,
    overruns: AtomicU32,
    underruns: AtomicU32,
}

impl<const CH: usize> AudioOutputUsb<CH> {
    pub const fn new() -> Self {
        AudioOutputUsb {
            state: Mutex::new(RefCell::new(TxState::new(&StreamConfig::DEFAULT))),
            enabled: AtomicBool::new(false),
            overruns: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
        }
    }

    /// Start a new session: release queued blocks, rebuild the pacer for
    /// `config`, zero the counters and disable streaming until the host
    /// selects the streaming alternate setting.
    ///
    /// The configuration must pass [`StreamConfig::validate`] for `CH`
    /// channels; otherwise it is rejected and the current session is kept.
    pub fn configure(&self, config: &StreamConfig) -> Result<(), ConfigError> {
        config.validate(CH)?;
        let previous = critical_section::with(|cs| {
            core::mem::replace(&mut *self.state.borrow_ref_mut(cs), TxState::new(config))
        });
        drop(previous);
        self.enabled.store(false, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::Relaxed) != enabled {
            log::info!("usb tx streaming {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Queue one update's worth of channel blocks.
    ///
    /// Missing channels are sent as silence. While streaming is disabled the
    /// blocks, and anything still queued, are released instead.
    pub fn enqueue(&self, channels: [Option<AudioBlockRef>; CH]) {
        if !self.is_enabled() {
            let discarded = critical_section::with(|cs| self.state.borrow_ref_mut(cs).drain());
            drop((channels, discarded));
            return;
        }

        let Some(set) = complete_set(channels) else {
            log::warn!("usb tx out of audio blocks, skipped one update");
            return;
        };

        let stale = critical_section::with(|cs| self.state.borrow_ref_mut(cs).install(set));
        if let Some(stale) = stale {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            log::warn!("usb tx overrun, discarded {} unsent blocks", stale.len());
        }
    }

    /// Fill `buf` with the next packet and return its length in bytes.
    ///
    /// The packet holds as many frames as the pacer asks for, clamped to
    /// what fits in `buf`. Missing data is sent as silence and counts as
    /// an underrun.
    pub fn packetize(&self, buf: &mut [u8]) -> usize {
        let frame_bytes = CH * SAMPLE_BYTES;
        if frame_bytes == 0 {
            return 0;
        }

        let (filled, target, released) = critical_section::with(|cs| {
            let mut tx = self.state.borrow_ref_mut(cs);
            let target = tx.pacer.next_target().min(buf.len() / frame_bytes);
            let (filled, released) = tx.drain_into(buf, target);
            (filled, target, released)
        });
        drop(released);

        if filled < target {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            log::trace!("usb tx underrun, {} of {} frames silent", target - filled, target);
        }
        target * frame_bytes
    }

    pub fn state(&self) -> TransmitState {
        critical_section::with(|cs| {
            let tx = self.state.borrow_ref(cs);
            match (&tx.outgoing, &tx.ready) {
                (None, _) => TransmitState::Empty,
                (Some(_), None) => TransmitState::Single,
                (Some(_), Some(_)) => TransmitState::Double,
            }
        })
    }

    /// Samples of the current outgoing blocks already sent.
    pub fn read_offset(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).offset)
    }

    /// Updates whose blocks replaced unsent data.
    pub fn overrun_count(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Packets that were padded with silence.
    pub fn underrun_count(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }
}

/// Fill missing channels with fresh silent blocks. `None` if the pool runs
/// dry; every block obtained so far is released on return.
fn complete_set<const CH: usize>(
    mut channels: [Option<AudioBlockRef>; CH],
) -> Option<ChannelSet<CH>> {
    for channel in channels.iter_mut().filter(|c| c.is_none()) {
        *channel = Some(AudioBlockMut::alloc()?.into_shared());
    }
    Some(channels.map(|channel| match channel {
        Some(block) => block,
        None => unreachable!("every channel was filled above"),
    }))
}

impl<const CH: usize> Default for AudioOutputUsb<CH> {
    fn default() -> Self {
        AudioOutputUsb::new()
    }
}

impl<const CH: usize> AudioNode for AudioOutputUsb<CH> {
    const NUM_INPUTS: usize = CH;
    const NUM_OUTPUTS: usize = 0;

    fn update(
        &mut self,
        inputs: &[Option<AudioBlockRef>],
        _outputs: &mut [Option<AudioBlockMut>],
    ) {
        let channels = core::array::from_fn(|ch| inputs.get(ch).cloned().flatten());
        self.enqueue(channels);
    }
}
