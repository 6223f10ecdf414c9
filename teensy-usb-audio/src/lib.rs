//! # teensy-usb-audio
//!
//! A `no_std`, zero-allocation USB Audio Class streaming core for the
//! [Teensy 4.x](https://www.pjrc.com/teensy/) (i.MX RT1062, Cortex-M7). It
//! moves 16-bit PCM between isochronous USB endpoints and a block-based audio
//! graph, and keeps the host locked to the device's audio clock through an
//! asynchronous feedback endpoint.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Memory | [`block`] | Fixed-size audio block pool with refcounted handles |
//! | Trait | [`node`] | `AudioNode`, the graph's update contract |
//! | USB | [`usb`] | Receive/transmit streams, rate feedback, feature unit |
//!
//! The USB controller driver is not part of this crate: board support code
//! implements [`usb::IsoEndpoint`] for its three isochronous endpoints and
//! forwards their completions to a [`usb::UsbAudio`].
//!
//! ## Quick start
//!
//! ```ignore
//! use teensy_usb_audio::usb::{StreamConfig, UsbAudio};
//!
//! static AUDIO: UsbAudio<2> = UsbAudio::new();
//!
//! // Host selected the audio configuration:
//! AUDIO.configure(StreamConfig::new())?;
//! AUDIO.start(&mut rx_ep, &mut sync_ep, &mut tx_ep);
//!
//! // Every audio update (128 samples):
//! if let Some((left, right)) = AUDIO.input().handoff() {
//!     // process, then send something back
//!     AUDIO.output().enqueue([Some(left.into_shared()), Some(right.into_shared())]);
//! }
//! ```
//!
//! ## Audio parameters
//!
//! - **Block size:** 128 samples ([`constants::AUDIO_BLOCK_SAMPLES`])
//! - **Nominal USB rate:** 44 100 Hz ([`constants::AUDIO_SAMPLE_RATE`]),
//!   configurable per session
//! - **Sample format:** `i16` (signed 16-bit, little endian on the wire)
//! - **Block pool:** 32 blocks ([`constants::POOL_SIZE`])
//!
//! ## Logging
//!
//! Events are reported through the [`log`] facade; the application installs
//! whatever logger suits its transport.

#![cfg_attr(not(test), no_std)]

pub mod constants;
pub mod block;
pub mod node;
pub mod usb;
