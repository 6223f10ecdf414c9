//! USB Audio Class streaming.
//!
//! This module moves audio between isochronous USB endpoints and the block
//! based audio graph. The host plays into the device through a stereo receive
//! stream and records from it through a `CH`-channel transmit stream; an
//! asynchronous feedback endpoint lets the device clock set the pace.
//!
//! ## Components
//!
//! | Node | Inputs | Outputs | Description |
//! |------|--------|---------|-------------|
//! | [`AudioInputUsb`] | 0 | 2 (L, R) | Host → graph, with rate feedback |
//! | [`AudioOutputUsb`] | CH | 0 | Graph → host, paced packets |
//!
//! [`UsbAudio`] bundles both with the [`FeatureUnit`] (mute/volume) and the
//! session [`StreamConfig`], and is what endpoint completion handlers call.
//!
//! ## Utilities
//!
//! - [`wire`]: PCM wire format conversion
//! - [`pacing`]: integer-carry packet sizing
//! - [`feedback`]: feedback accumulator and wire encoding
//! - [`endpoint`]: the [`IsoEndpoint`] transfer-layer trait
//!
//! ## Contexts
//!
//! Endpoint completions run in interrupt context; the audio update runs in a
//! lower-priority task. Neither ever blocks. Shared state sits behind short
//! `critical_section` regions and blocks are released outside them.

pub mod config;
pub mod endpoint;
pub mod feedback;
pub mod pacing;
pub mod wire;
pub mod input;
pub mod output;
pub mod features;
pub mod device;

pub use config::{ConfigError, StreamConfig, UsbSpeed};
pub use device::{StreamStats, UsbAudio};
pub use endpoint::IsoEndpoint;
pub use features::{ControlError, FeatureUnit, Features, SetupPacket};
pub use feedback::{FeedbackAccumulator, FeedbackTuning};
pub use input::{AudioInputUsb, ReceiveState};
pub use output::{AudioOutputUsb, TransmitState};
pub use pacing::RateAdapter;
