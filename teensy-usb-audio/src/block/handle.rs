use core::ops::{Deref, DerefMut};

use crate::constants::AUDIO_BLOCK_SAMPLES;

use super::pool::POOL;

/// Exclusive handle to a pooled audio block.
///
/// Exactly one `AudioBlockMut` exists per allocated slot, so the holder may
/// write samples freely. Dropping it releases the slot.
pub struct AudioBlockMut {
    slot: u8,
}

impl AudioBlockMut {
    /// Allocate a zeroed block from the global pool, or `None` when the pool
    /// is exhausted.
    pub fn alloc() -> Option<Self> {
        POOL.alloc().map(|slot| AudioBlockMut { slot })
    }

    /// Give up exclusivity. No copy and no refcount change.
    pub fn into_shared(self) -> AudioBlockRef {
        let slot = self.slot;
        core::mem::forget(self);
        AudioBlockRef { slot }
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }
}

impl Deref for AudioBlockMut {
    type Target = [i16; AUDIO_BLOCK_SAMPLES];

    fn deref(&self) -> &Self::Target {
        // SAFETY: this handle owns the slot exclusively.
        unsafe { &(*POOL.data_ptr(self.slot)).samples }
    }
}

impl DerefMut for AudioBlockMut {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: this handle owns the slot exclusively.
        unsafe { &mut (*POOL.data_ptr(self.slot)).samples }
    }
}

impl Drop for AudioBlockMut {
    fn drop(&mut self) {
        POOL.dec_ref(self.slot);
    }
}

impl core::fmt::Debug for AudioBlockMut {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioBlockMut").field("slot", &self.slot).finish()
    }
}

/// Shared, read-only handle to a pooled audio block.
///
/// This is how the graph hands blocks to sinks: each clone adds a reference
/// and the slot is released when the last one is dropped.
pub struct AudioBlockRef {
    slot: u8,
}

impl AudioBlockRef {
    pub fn slot(&self) -> u8 {
        self.slot
    }
}

impl Deref for AudioBlockRef {
    type Target = [i16; AUDIO_BLOCK_SAMPLES];

    fn deref(&self) -> &Self::Target {
        // SAFETY: the slot stays allocated while any reference exists and is
        // never written through a shared handle.
        unsafe { &(*POOL.data_ptr(self.slot)).samples }
    }
}

impl AsRef<[i16]> for AudioBlockRef {
    fn as_ref(&self) -> &[i16] {
        &self[..]
    }
}

impl Clone for AudioBlockRef {
    fn clone(&self) -> Self {
        POOL.inc_ref(self.slot);
        AudioBlockRef { slot: self.slot }
    }
}

impl Drop for AudioBlockRef {
    fn drop(&mut self) {
        POOL.dec_ref(self.slot);
    }
}

impl core::fmt::Debug for AudioBlockRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioBlockRef").field("slot", &self.slot).finish()
    }
}
