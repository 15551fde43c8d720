//! Window and slice bounds
//!
//! Both slices and windows are half-open time ranges `[start, end)`.

use serde::{Deserialize, Serialize};
use slicestream_types::Timestamp;
use std::fmt;

/// Represents the time bounds of a slice or window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowBounds {
    /// Start time (inclusive)
    pub start: Timestamp,
    /// End time (exclusive)
    pub end: Timestamp,
}

impl WindowBounds {
    /// Create new bounds
    pub fn new(start: impl Into<Timestamp>, end: impl Into<Timestamp>) -> Self {
        let (start, end) = (start.into(), end.into());
        assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    /// Length of the range in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.end.millis() - self.start.millis()
    }

    /// Check if a timestamp falls within these bounds
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Check if `other` lies completely inside these bounds
    pub fn covers(&self, other: &WindowBounds) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Check if these bounds overlap with another range
    pub fn overlaps(&self, other: &WindowBounds) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.millis(), self.end.millis())
    }
}

impl PartialOrd for WindowBounds {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WindowBounds {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

/// Window type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// Fixed-size, non-overlapping windows: one slice per window
    Tumbling,
    /// Fixed-size, overlapping windows made of consecutive slices
    Sliding,
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowType::Tumbling => write!(f, "tumbling"),
            WindowType::Sliding => write!(f, "sliding"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds_contains() {
        let bounds = WindowBounds::new(1000u64, 2000u64);

        assert!(!bounds.contains(Timestamp::new(999)));
        assert!(bounds.contains(Timestamp::new(1000)));
        assert!(bounds.contains(Timestamp::new(1999)));
        assert!(!bounds.contains(Timestamp::new(2000)));
        assert_eq!(bounds.duration_ms(), 1000);
    }

    #[test]
    #[should_panic(expected = "Window start must be before end")]
    fn test_window_bounds_invalid() {
        WindowBounds::new(2000u64, 1000u64);
    }

    #[test]
    fn test_window_bounds_covers_and_overlaps() {
        let window = WindowBounds::new(0u64, 20u64);
        let inner = WindowBounds::new(10u64, 20u64);
        let outer = WindowBounds::new(15u64, 25u64);

        assert!(window.covers(&inner));
        assert!(!window.covers(&outer));
        assert!(window.overlaps(&outer));
        assert!(!inner.overlaps(&WindowBounds::new(20u64, 30u64)));
    }

    #[test]
    fn test_window_ordering() {
        let a = WindowBounds::new(0u64, 10u64);
        let b = WindowBounds::new(0u64, 20u64);
        let c = WindowBounds::new(10u64, 20u64);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.to_string(), "[0, 10)");
    }
}
