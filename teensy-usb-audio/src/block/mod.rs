//! Fixed-size audio block memory.
//!
//! Every audio block exchanged with the graph or the USB endpoints lives in
//! the global [`POOL`](pool::POOL). Code never touches slots directly; it holds
//! one of two handle types:
//!
//! | Handle | Ownership | Access |
//! |--------|-----------|--------|
//! | [`AudioBlockMut`] | exclusive, exactly one per slot | read/write |
//! | [`AudioBlockRef`] | shared, refcounted | read-only |
//!
//! Dropping the last handle returns the slot to the pool. A handle that has
//! been moved cannot be used again, so a block is released exactly once.

pub mod pool;
mod handle;

pub use handle::{AudioBlockMut, AudioBlockRef};
pub use pool::{AudioBlockData, PoolUsage, POOL};
