//! Timestamp type
//!
//! Timestamps are unsigned 64-bit millisecond values. They are either event
//! time (read from a record field) or ingestion time (wall clock at arrival).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in time, in milliseconds
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The smallest representable timestamp
    pub const MIN: Timestamp = Timestamp(0);

    /// The largest representable timestamp
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a timestamp from raw milliseconds
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Raw millisecond value
    pub const fn millis(self) -> u64 {
        self.0
    }

    /// Add a duration in milliseconds, saturating at [`Timestamp::MAX`]
    pub fn saturating_add(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Subtract a duration in milliseconds, saturating at [`Timestamp::MIN`]
    pub fn saturating_sub(self, millis: u64) -> Self {
        Self(self.0.saturating_sub(millis))
    }
}

impl From<u64> for Timestamp {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
