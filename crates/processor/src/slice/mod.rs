//! Slices and thread-local slice stores
//!
//! A slice holds the partial aggregates of one time bucket. Each worker owns a
//! [`ThreadLocalSliceStore`] and mutates its slices without synchronization;
//! partial state leaves the store only by being moved into a merge task.

pub mod state;
pub mod store;

pub use state::{LoweredRow, SliceState};
pub use store::{Slice, ThreadLocalSliceStore};
