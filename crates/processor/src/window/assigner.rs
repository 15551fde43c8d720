//! Slice assignment
//!
//! Maps event timestamps to slices. A slice is the unit of partial
//! aggregation; its length is the window's slide. Tumbling windows consist of
//! exactly one slice, sliding windows of `size / slide` consecutive slices.
//!
//! ```text
//! Window size: 10, slide: 5
//! Slices:   [0,5) [5,10) [10,15) [15,20)
//! Windows:  [0,10) = [0,5)+[5,10)
//!                 [5,15) = [5,10)+[10,15)
//! ```

use super::types::{WindowBounds, WindowType};
use crate::error::{SliceError, SliceResult};
use slicestream_types::Timestamp;

/// Dense, gapless index of a slice
pub type SliceIndex = u64;

/// Pure mapping from timestamps to slice boundaries and indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceAssigner {
    window_type: WindowType,
    /// Window size
    size: u64,
    /// Slice length (equals `size` for tumbling windows)
    slide: u64,
}

impl SliceAssigner {
    /// Create an assigner for tumbling windows of `size` milliseconds
    pub fn tumbling(size: u64) -> SliceResult<Self> {
        if size == 0 {
            return Err(SliceError::InvalidSlideSize { slide: size });
        }
        Ok(Self {
            window_type: WindowType::Tumbling,
            size,
            slide: size,
        })
    }

    /// Create an assigner for sliding windows
    ///
    /// The window size must be a positive multiple of the slide so that every
    /// window is made of whole slices.
    pub fn sliding(size: u64, slide: u64) -> SliceResult<Self> {
        if slide == 0 {
            return Err(SliceError::InvalidSlideSize { slide });
        }
        if size == 0 || size % slide != 0 {
            return Err(SliceError::InvalidWindowSize { size, slide });
        }
        Ok(Self {
            window_type: WindowType::Sliding,
            size,
            slide,
        })
    }

    /// Window type this assigner slices for
    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    /// Window size in milliseconds
    pub fn window_size(&self) -> u64 {
        self.size
    }

    /// Slice length in milliseconds
    pub fn slide(&self) -> u64 {
        self.slide
    }

    /// Number of slices that make up one window
    pub fn slices_per_window(&self) -> u64 {
        self.size / self.slide
    }

    /// Index of the slice owning `ts`
    #[inline]
    pub fn slice_index_for(&self, ts: Timestamp) -> SliceIndex {
        ts.millis() / self.slide
    }

    /// Start of the slice owning `ts`
    #[inline]
    pub fn slice_start_for(&self, ts: Timestamp) -> Timestamp {
        Timestamp::new(self.slice_index_for(ts) * self.slide)
    }

    /// End of the slice owning `ts`
    #[inline]
    pub fn slice_end_for(&self, ts: Timestamp) -> Timestamp {
        self.slice_start_for(ts).saturating_add(self.slide)
    }

    /// Bounds of the slice with the given index
    pub fn bounds_for_index(&self, index: SliceIndex) -> WindowBounds {
        let start = index * self.slide;
        WindowBounds::new(start, start.saturating_add(self.slide))
    }

    /// Bounds of the slice owning `ts`
    pub fn slice_bounds_for(&self, ts: Timestamp) -> WindowBounds {
        self.bounds_for_index(self.slice_index_for(ts))
    }

    /// All windows that contain the slice starting at `slice_start`
    ///
    /// Windows never start before time zero, so early slices belong to fewer
    /// windows.
    pub fn windows_containing(&self, slice_start: Timestamp) -> Vec<WindowBounds> {
        let start = slice_start.millis();
        let first_start = (start + self.slide).saturating_sub(self.size);

        let mut windows = Vec::with_capacity(self.slices_per_window() as usize);
        let mut current = first_start;
        while current <= start {
            windows.push(WindowBounds::new(current, current.saturating_add(self.size)));
            current += self.slide;
        }
        windows
    }
}
