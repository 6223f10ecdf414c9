/// Number of 16-bit samples per audio block.
pub const AUDIO_BLOCK_SAMPLES: usize = 128;

/// Number of audio blocks in the global pool.
pub const POOL_SIZE: usize = 32;

/// Nominal sample rate advertised to the USB host, in Hz.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Isochronous data packets per second. Data endpoints are serviced once per
/// 1 ms frame at both full and high speed.
pub const USB_FRAMES_PER_SECOND: u32 = 1_000;

/// Upper bound of the feature unit volume control (range is `0..=MAX`).
pub const FEATURE_MAX_VOLUME: u16 = 0xFF;
