//! Messages passed from workers to the merge coordinator

use crate::slice::SliceState;
use crate::window::WindowBounds;
use slicestream_types::{OriginId, SequenceNumber, Timestamp, WorkerId};

/// Signal that a worker's partial state for one slice is final
///
/// The worker gives up ownership of the state, so the coordinator never reads
/// memory another thread may still write.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceMergeTask {
    /// Worker that produced the partial state
    pub worker: WorkerId,
    /// Slice bounds
    pub slice: WindowBounds,
    /// Sequence number whose processing finalized the slice, 0 for idle ticks
    pub sequence_number: SequenceNumber,
    /// Partial aggregation state of the slice on this worker
    pub state: SliceState,
}

impl SliceMergeTask {
    pub fn slice_start(&self) -> Timestamp {
        self.slice.start
    }

    pub fn slice_end(&self) -> Timestamp {
        self.slice.end
    }
}

/// Everything a worker can tell the merge thread
#[derive(Debug)]
pub enum MergeMessage {
    /// A finalized slice
    Partial(SliceMergeTask),

    /// The worker finalized every slice ending (plus lateness) at or before
    /// `frontier`; all its merge tasks up to that point were sent before this
    Progress { worker: WorkerId, frontier: Timestamp },

    /// The worker drained its input and exited
    Finished { worker: WorkerId },

    /// The worker hit a fatal error and exited
    Failed {
        worker: WorkerId,
        origin: Option<OriginId>,
        reason: String,
    },
}
