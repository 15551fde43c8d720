//! Windowing module
//!
//! Windows are evaluated from slices: fixed-length, non-overlapping time
//! buckets that hold partial aggregates.
//!
//! ## Tumbling Windows
//! Fixed-size, non-overlapping windows. Each window is exactly one slice.
//!
//! ```text
//! Time:     0----5----10---15---20---25---30
//! Windows:  [----][----][----][----][----]
//! ```
//!
//! ## Sliding Windows
//! Fixed-size, overlapping windows. The slice length is the slide, and each
//! window combines `size / slide` consecutive slices.
//!
//! ```text
//! Time:     0----5----10---15---20
//! Slices:   [----][----][----][----]
//! Windows:  [----------]
//!                [----------]
//!                     [----------]
//! ```

pub mod assigner;
pub mod types;

pub use assigner::{SliceAssigner, SliceIndex};
pub use types::{WindowBounds, WindowType};
