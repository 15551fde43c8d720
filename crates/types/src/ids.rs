//! Identifiers for origins, workers, and sequenced batches

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one upstream producer with its own sequence-number space
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OriginId(pub u64);

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "origin-{}", self.0)
    }
}

/// Identifies one worker thread of a running query
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Per-origin sequence number. Strictly increasing, starting at 1.
pub type SequenceNumber = u64;

/// Position of a chunk within a fragmented batch, starting at 1
pub type ChunkNumber = u64;

/// Sequencing information carried by every batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceData {
    /// Sequence number of the batch within its origin
    pub sequence_number: SequenceNumber,
    /// Chunk of the batch this fragment carries
    pub chunk_number: ChunkNumber,
    /// Whether this is the final chunk of the batch
    pub last_chunk: bool,
}

impl SequenceData {
    /// Sequencing for an unfragmented batch
    pub fn new(sequence_number: SequenceNumber) -> Self {
        Self {
            sequence_number,
            chunk_number: 1,
            last_chunk: true,
        }
    }

    /// Sequencing for one chunk of a fragmented batch
    pub fn chunk(sequence_number: SequenceNumber, chunk_number: ChunkNumber, last_chunk: bool) -> Self {
        Self {
            sequence_number,
            chunk_number,
            last_chunk,
        }
    }

    /// Whether the batch was delivered in one piece
    pub fn is_whole(&self) -> bool {
        self.chunk_number == 1 && self.last_chunk
    }
}

impl fmt::Display for SequenceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seq={} chunk={}{}",
            self.sequence_number,
            self.chunk_number,
            if self.last_chunk { " (last)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_batch() {
        let seq = SequenceData::new(7);
        assert!(seq.is_whole());
        assert_eq!(seq.to_string(), "seq=7 chunk=1 (last)");
    }

    #[test]
    fn test_chunked_batch() {
        let seq = SequenceData::chunk(3, 2, false);
        assert!(!seq.is_whole());
        assert_eq!(seq.chunk_number, 2);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(OriginId(4).to_string(), "origin-4");
        assert_eq!(WorkerId(1).to_string(), "worker-1");
    }
}
