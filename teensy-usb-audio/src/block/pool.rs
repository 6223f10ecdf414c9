use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::constants::{AUDIO_BLOCK_SAMPLES, POOL_SIZE};

/// Raw audio block storage: 128 signed 16-bit samples, 4-byte aligned.
///
/// The alignment lets the USB receive path write two samples per channel as
/// a single 32-bit word once the write offset is even.
#[derive(Clone, Copy)]
#[repr(C, align(4))]
pub struct AudioBlockData {
    pub samples: [i16; AUDIO_BLOCK_SAMPLES],
}

impl AudioBlockData {
    const ZEROED: AudioBlockData = AudioBlockData {
        samples: [0i16; AUDIO_BLOCK_SAMPLES],
    };
}

/// Snapshot of pool occupancy, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUsage {
    /// Blocks currently allocated.
    pub in_use: u32,
    /// Highest simultaneous allocation since the last [`AudioBlockPool::reset_usage_max`].
    pub in_use_max: u32,
    /// Allocation attempts that found the pool exhausted.
    pub alloc_failures: u32,
}

/// Global lock-free pool allocator for audio blocks.
///
/// An atomic bitmap tracks which slots are allocated and per-slot atomic
/// reference counts track shared handles. Every operation is lock-free, so
/// both the USB completion handlers and the audio update task may allocate
/// and release blocks.
pub struct AudioBlockPool {
    /// Bit N set means slot N is allocated.
    bitmap: AtomicU32,
    refcounts: [AtomicU8; POOL_SIZE],
    in_use_max: AtomicU32,
    alloc_failures: AtomicU32,
    storage: UnsafeCell<[AudioBlockData; POOL_SIZE]>,
}

// SAFETY: all bookkeeping is atomic. A storage slot is only dereferenced by
// the handle(s) that own it according to the bitmap and refcount.
unsafe impl Sync for AudioBlockPool {}

impl AudioBlockPool {
    #[allow(clippy::declare_interior_mut_const)]
    const fn new() -> Self {
        const FREE: AtomicU8 = AtomicU8::new(0);
        AudioBlockPool {
            bitmap: AtomicU32::new(0),
            refcounts: [FREE; POOL_SIZE],
            in_use_max: AtomicU32::new(0),
            alloc_failures: AtomicU32::new(0),
            storage: UnsafeCell::new([AudioBlockData::ZEROED; POOL_SIZE]),
        }
    }

    /// Claim a free slot, zero it and return its index with refcount 1.
    ///
    /// Returns `None` (and counts a failure) when every slot is in use.
    pub fn alloc(&self) -> Option<u8> {
        let mut bitmap = self.bitmap.load(Ordering::Acquire);
        loop {
            let slot = (!bitmap).trailing_zeros();
            if slot >= POOL_SIZE as u32 {
                self.alloc_failures.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            let claimed = bitmap | (1u32 << slot);
            match self.bitmap.compare_exchange_weak(
                bitmap,
                claimed,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.refcounts[slot as usize].store(1, Ordering::Release);
                    // SAFETY: the CAS above gave us sole ownership of `slot`.
                    unsafe {
                        *self.data_ptr(slot as u8) = AudioBlockData::ZEROED;
                    }
                    self.in_use_max
                        .fetch_max(claimed.count_ones(), Ordering::Relaxed);
                    return Some(slot as u8);
                }
                Err(current) => bitmap = current,
            }
        }
    }

    /// Add a reference to an allocated slot.
    pub fn inc_ref(&self, slot: u8) {
        debug_assert!((slot as usize) < POOL_SIZE);
        let old = self.refcounts[slot as usize].fetch_add(1, Ordering::AcqRel);
        debug_assert!(old > 0, "inc_ref on unallocated slot");
        debug_assert!(old < u8::MAX, "refcount overflow");
    }

    /// Drop a reference; the last one returns the slot to the pool.
    pub fn dec_ref(&self, slot: u8) {
        debug_assert!((slot as usize) < POOL_SIZE);
        let old = self.refcounts[slot as usize].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0, "block {slot} released twice");
        if old == 1 {
            self.bitmap.fetch_and(!(1u32 << slot), Ordering::Release);
        }
    }

    pub fn refcount(&self, slot: u8) -> u8 {
        self.refcounts[slot as usize].load(Ordering::Acquire)
    }

    /// Pointer to the storage of `slot`.
    ///
    /// # Safety
    /// The slot must be allocated and the caller must respect the handle
    /// ownership rules (exclusive for writes, shared for reads).
    pub unsafe fn data_ptr(&self, slot: u8) -> *mut AudioBlockData {
        debug_assert!((slot as usize) < POOL_SIZE);
        unsafe { self.storage.get().cast::<AudioBlockData>().add(slot as usize) }
    }

    /// Number of slots currently allocated.
    pub fn allocated_count(&self) -> u32 {
        self.bitmap.load(Ordering::Acquire).count_ones()
    }

    pub fn usage(&self) -> PoolUsage {
        PoolUsage {
            in_use: self.allocated_count(),
            in_use_max: self.in_use_max.load(Ordering::Relaxed),
            alloc_failures: self.alloc_failures.load(Ordering::Relaxed),
        }
    }

    /// Restart peak tracking from the current occupancy.
    pub fn reset_usage_max(&self) {
        self.in_use_max
            .store(self.allocated_count(), Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn reset(&self) {
        self.bitmap.store(0, Ordering::Release);
        for rc in &self.refcounts {
            rc.store(0, Ordering::Release);
        }
        self.in_use_max.store(0, Ordering::Relaxed);
        self.alloc_failures.store(0, Ordering::Relaxed);
    }
}

/// The global audio block pool instance.
pub static POOL: AudioBlockPool = AudioBlockPool::new();

/// Serialize a test against every other test that touches [`POOL`], and start
/// it from an empty pool.
#[cfg(test)]
pub(crate) fn exclusive() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let guard = LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    POOL.reset();
    guard
}

/// Allocate every free slot, returning the handles so the caller decides
/// when the pool becomes available again.
#[cfg(test)]
pub(crate) fn exhaust() -> std::vec::Vec<crate::block::AudioBlockMut> {
    core::iter::from_fn(crate::block::AudioBlockMut::alloc).collect()
}
