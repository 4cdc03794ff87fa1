//! Episodic memory of past (embedding, category) associations
//!
//! Serves the classification fast path: a file that looks like something
//! already sorted goes where that thing went, without running the voters.

pub mod index;
pub mod record;
pub mod store;

pub use index::{LinearIndex, LshIndex, RecallIndex};
pub use record::{MemoryRecord, Recall};
pub use store::Memory;
