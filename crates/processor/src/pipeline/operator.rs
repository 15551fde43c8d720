//! Pre-aggregation operator
//!
//! Each worker thread owns one [`PreAggregationOperator`]. It lifts records
//! into the worker's thread-local slice store and, whenever the global
//! watermark moves, hands finalized slices to the merge coordinator as
//! [`SliceMergeTask`]s.

use super::context::QueryContext;
use super::task::SliceMergeTask;
use crate::error::Result;
use crate::slice::ThreadLocalSliceStore;
use slicestream_types::{
    OriginId, Record, RecordBatch, SequenceData, SequenceNumber, Timestamp, WorkerId,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Lifted into a slice
    Accepted,
    /// Dropped because its slice was already final on this worker
    Late,
}

/// Thread-local pre-aggregation of one worker
#[derive(Debug)]
pub struct PreAggregationOperator {
    worker: WorkerId,
    context: Arc<QueryContext>,
    store: ThreadLocalSliceStore,
    /// Global watermark this worker has finalized through
    frontier: Timestamp,
}

impl PreAggregationOperator {
    /// Create the operator for `worker`
    pub fn new(worker: WorkerId, context: Arc<QueryContext>) -> Self {
        let store = ThreadLocalSliceStore::new(
            worker,
            context.assigner().clone(),
            context.store_capacity(),
            context.empty_state(),
        );
        Self {
            worker,
            context,
            store,
            frontier: Timestamp::MIN,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Global watermark through which slices have been finalized
    pub fn frontier(&self) -> Timestamp {
        self.frontier
    }

    pub fn store(&self) -> &ThreadLocalSliceStore {
        &self.store
    }

    /// Lift one record into its slice
    ///
    /// A record whose slice end plus allowed lateness is at or before the
    /// frontier is dropped and counted, never an error.
    pub fn execute(&mut self, record: &Record) -> Result<RecordOutcome> {
        let ts = self.context.time_function().timestamp(record)?;
        let metrics = self.context.metrics();

        if self.is_late(ts) {
            metrics.late_records_dropped.inc();
            warn!(
                worker = %self.worker,
                timestamp = %ts,
                frontier = %self.frontier,
                "dropped late record"
            );
            return Ok(RecordOutcome::Late);
        }

        let key = match self.context.key_extractor() {
            Some(extractor) => Some(extractor.extract_key(record)?),
            None => None,
        };

        let created_before = self.store.slices_created();
        let slice = self.store.find_or_create_slice_for(ts)?;
        slice.state_mut().lift(record, key, self.context.specs())?;

        let created = self.store.slices_created() - created_before;
        if created > 0 {
            metrics.slices_created.inc_by(created);
        }
        metrics.records_processed.inc();
        Ok(RecordOutcome::Accepted)
    }

    /// Process every record of a batch, then close it
    ///
    /// The batch's sequence (or chunk) is claimed before any record is
    /// lifted. A re-delivery fails as stale and lifts nothing, even while the
    /// first delivery is still in flight on another worker.
    pub fn process_batch(&mut self, batch: &RecordBatch) -> Result<Vec<SliceMergeTask>> {
        self.context
            .watermarks()
            .tracker(batch.origin)?
            .claim(batch.sequence)?;

        for record in &batch.records {
            self.execute(record)?;
        }
        self.close(batch.watermark, batch.origin, batch.sequence)
    }

    /// Report a processed batch and finalize whatever the watermark allows
    ///
    /// Returns one task per non-empty slice that became final. Nothing
    /// happens to the store if the global watermark did not advance.
    pub fn close(
        &mut self,
        watermark: Timestamp,
        origin: OriginId,
        sequence: SequenceData,
    ) -> Result<Vec<SliceMergeTask>> {
        let global = self
            .context
            .watermarks()
            .update_watermark(origin, sequence, watermark)?;
        self.context
            .metrics()
            .global_watermark
            .set(global.millis().min(i64::MAX as u64) as i64);

        Ok(self.finalize_through(global, sequence.sequence_number))
    }

    /// Finalize every slice whose end plus lateness is at or before `watermark`
    ///
    /// Finalized slices are evicted from the store. Empty slices are evicted
    /// without producing a task.
    pub fn finalize_through(
        &mut self,
        watermark: Timestamp,
        trigger: SequenceNumber,
    ) -> Vec<SliceMergeTask> {
        if watermark <= self.frontier {
            return Vec::new();
        }
        self.frontier = watermark;

        let lateness = self.context.allowed_lateness();
        let mut tasks = Vec::new();
        while let Some(slice) = self.store.first_mut() {
            if slice.end().saturating_add(lateness) > watermark {
                break;
            }
            let index = slice.index();
            if !slice.is_empty() {
                tasks.push(SliceMergeTask {
                    worker: self.worker,
                    slice: slice.bounds(),
                    sequence_number: trigger,
                    state: slice.take_state(),
                });
            }
            self.store.evict_through(index);
        }

        if !tasks.is_empty() {
            self.context
                .metrics()
                .merge_tasks_emitted
                .inc_by(tasks.len() as u64);
            debug!(
                worker = %self.worker,
                watermark = %watermark,
                sequence = trigger,
                tasks = tasks.len(),
                "finalized slices"
            );
        }
        tasks
    }

    /// Drop every slice that never became final
    ///
    /// Returns how many of them held data.
    pub fn discard(&mut self) -> usize {
        let discarded = self.store.clear();
        if discarded > 0 {
            self.context
                .metrics()
                .slices_discarded
                .inc_by(discarded as u64);
            debug!(worker = %self.worker, discarded, "discarded open slices");
        }
        discarded
    }

    fn is_late(&self, ts: Timestamp) -> bool {
        self.context
            .assigner()
            .slice_end_for(ts)
            .saturating_add(self.context.allowed_lateness())
            <= self.frontier
    }
}
