//! Global merge and trigger engine
//!
//! Workers finalize slices independently. The coordinator folds their partial
//! states per slice and tracks, per worker, the global watermark the worker
//! has finalized through. The minimum of those frontiers is the merged
//! frontier: a slice is complete once its end plus allowed lateness is at or
//! before it, because every worker sends its merge tasks before reporting the
//! progress that covers them.
//!
//! Windows whose end plus lateness is crossed by the merged frontier are
//! combined from the merged slices they cover, lowered and emitted in
//! window-end order.

use super::context::QueryContext;
use super::task::SliceMergeTask;
use crate::error::{ProcessorError, Result};
use crate::slice::SliceState;
use crate::window::WindowBounds;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use slicestream_types::{Timestamp, WindowResult, WorkerId};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// What became of a merge task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Folded into the slice's merged state
    Folded,
    /// Ignored: the worker already contributed, or the slice is complete
    Duplicate,
}

/// Partial states of one slice received so far
#[derive(Debug, Default)]
struct PendingSlice {
    state: Option<SliceState>,
    contributors: HashSet<WorkerId>,
}

#[derive(Debug, Clone, Copy, Default)]
struct WorkerProgress {
    frontier: Timestamp,
    finished: bool,
}

/// Complete slices still needed by windows that have not fired
#[derive(Debug, Default)]
struct MergedSlices {
    frontier: Timestamp,
    slices: BTreeMap<Timestamp, (WindowBounds, SliceState)>,
}

/// Folds worker partials into complete slices and fires windows
#[derive(Debug)]
pub struct MergeCoordinator {
    context: Arc<QueryContext>,
    workers: DashMap<WorkerId, WorkerProgress>,
    pending: DashMap<WindowBounds, Arc<Mutex<PendingSlice>>>,
    merged: RwLock<MergedSlices>,
}

impl MergeCoordinator {
    /// Create a coordinator expecting partials from `parallelism` workers
    pub fn new(context: Arc<QueryContext>, parallelism: usize) -> Self {
        let workers = (0..parallelism)
            .map(|index| (WorkerId(index), WorkerProgress::default()))
            .collect();
        Self {
            context,
            workers,
            pending: DashMap::new(),
            merged: RwLock::new(MergedSlices::default()),
        }
    }

    /// Minimum frontier over all workers
    pub fn merged_frontier(&self) -> Timestamp {
        self.merged.read().frontier
    }

    /// Slices with at least one partial that are not yet complete
    pub fn pending_slices(&self) -> usize {
        self.pending.len()
    }

    /// Fold one worker's partial state into its slice
    pub fn on_partial(&self, task: SliceMergeTask) -> Result<MergeOutcome> {
        let merged = self.merged.read();
        let lateness = self.context.allowed_lateness();

        if !self.workers.contains_key(&task.worker) {
            return Err(ProcessorError::Unexpected(format!(
                "merge task from unknown {}",
                task.worker
            )));
        }
        if task.slice_end().saturating_add(lateness) <= merged.frontier {
            return Ok(self.duplicate(&task, "slice already complete"));
        }

        let slot = self
            .pending
            .entry(task.slice)
            .or_insert_with(|| Arc::new(Mutex::new(PendingSlice::default())))
            .clone();
        let mut pending = slot.lock();

        if !pending.contributors.insert(task.worker) {
            return Ok(self.duplicate(&task, "worker already contributed"));
        }
        match pending.state.as_mut() {
            Some(state) => state.combine(&task.state)?,
            None => pending.state = Some(task.state),
        }
        drop(pending);
        drop(merged);

        self.context
            .metrics()
            .pending_merges
            .set(self.pending.len() as i64);
        trace!(
            worker = %task.worker,
            slice = %task.slice,
            sequence = task.sequence_number,
            "folded partial slice"
        );
        Ok(MergeOutcome::Folded)
    }

    /// Record a worker's frontier and fire every window it completes
    ///
    /// Returns the window results in window-end order, empty windows omitted.
    pub fn on_progress(&self, worker: WorkerId, frontier: Timestamp) -> Result<Vec<WindowResult>> {
        {
            let mut progress = self.workers.get_mut(&worker).ok_or_else(|| {
                ProcessorError::Unexpected(format!("progress from unknown {}", worker))
            })?;
            progress.frontier = progress.frontier.max(frontier);
        }

        let candidate = self
            .workers
            .iter()
            .map(|entry| entry.value().frontier)
            .min()
            .unwrap_or(Timestamp::MIN);

        let mut merged = self.merged.write();
        if candidate <= merged.frontier {
            return Ok(Vec::new());
        }
        let previous = merged.frontier;
        self.complete_slices(&mut merged, candidate)?;
        let results = self.fire_windows(&merged, previous, candidate)?;
        self.reclaim(&mut merged, candidate);
        merged.frontier = candidate;

        let metrics = self.context.metrics();
        metrics.windows_emitted.inc_by(results.len() as u64);
        metrics.pending_merges.set(self.pending.len() as i64);
        debug!(
            frontier = %candidate,
            windows = results.len(),
            "merged frontier advanced"
        );
        Ok(results)
    }

    /// Mark a worker as drained; returns true once every worker is
    pub fn on_finished(&self, worker: WorkerId) -> bool {
        if let Some(mut progress) = self.workers.get_mut(&worker) {
            progress.finished = true;
        }
        self.workers.iter().all(|entry| entry.value().finished)
    }

    /// Drop every slice that never became complete
    ///
    /// Returns how many incomplete slices held data.
    pub fn discard_incomplete(&self) -> usize {
        let mut merged = self.merged.write();
        let discarded = self.pending.len();
        self.pending.clear();
        merged.slices.clear();

        let metrics = self.context.metrics();
        metrics.slices_discarded.inc_by(discarded as u64);
        metrics.pending_merges.set(0);
        if discarded > 0 {
            debug!(discarded, "discarded incomplete slices");
        }
        discarded
    }

    fn duplicate(&self, task: &SliceMergeTask, reason: &str) -> MergeOutcome {
        self.context.metrics().duplicate_merge_signals.inc();
        debug!(
            worker = %task.worker,
            slice = %task.slice,
            sequence = task.sequence_number,
            reason,
            "ignored duplicate merge task"
        );
        MergeOutcome::Duplicate
    }

    /// Move every pending slice completed by `frontier` into the merged set
    fn complete_slices(&self, merged: &mut MergedSlices, frontier: Timestamp) -> Result<()> {
        let lateness = self.context.allowed_lateness();
        let ready: Vec<WindowBounds> = self
            .pending
            .iter()
            .filter(|entry| entry.key().end.saturating_add(lateness) <= frontier)
            .map(|entry| *entry.key())
            .collect();

        for bounds in ready {
            let Some((_, slot)) = self.pending.remove(&bounds) else {
                continue;
            };
            let Some(state) = slot.lock().state.take() else {
                continue;
            };
            self.context.metrics().slices_merged.inc();
            match merged.slices.get_mut(&bounds.start) {
                Some((_, existing)) => existing.combine(&state)?,
                None => {
                    merged.slices.insert(bounds.start, (bounds, state));
                }
            }
        }
        Ok(())
    }

    /// Windows whose end plus lateness lies in `(previous, frontier]`
    fn fire_windows(
        &self,
        merged: &MergedSlices,
        previous: Timestamp,
        frontier: Timestamp,
    ) -> Result<Vec<WindowResult>> {
        let lateness = self.context.allowed_lateness();
        let assigner = self.context.assigner();

        let mut due = BTreeSet::new();
        for (bounds, _) in merged.slices.values() {
            for window in assigner.windows_containing(bounds.start) {
                let fires_at = window.end.saturating_add(lateness);
                if fires_at > previous && fires_at <= frontier {
                    due.insert((window.end, window.start));
                }
            }
        }

        let specs = self.context.specs();
        let mut results = Vec::new();
        for (end, start) in due {
            let mut combined: Option<SliceState> = None;
            for (_, state) in merged.slices.range(start..end).map(|(_, slice)| slice) {
                match combined.as_mut() {
                    Some(acc) => acc.combine(state)?,
                    None => combined = Some(state.clone()),
                }
            }
            let Some(window_state) = combined else {
                continue;
            };
            for (key, values) in window_state.lower(specs)? {
                results.push(WindowResult {
                    window_start: start,
                    window_end: end,
                    key,
                    values,
                });
            }
        }
        Ok(results)
    }

    /// Drop merged slices that no window still waiting to fire covers
    fn reclaim(&self, merged: &mut MergedSlices, frontier: Timestamp) {
        let horizon = self
            .context
            .assigner()
            .window_size()
            .saturating_add(self.context.allowed_lateness());
        merged
            .slices
            .retain(|start, _| start.saturating_add(horizon) > frontier);
    }
}
