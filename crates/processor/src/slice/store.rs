//! Thread-local slice store
//!
//! A fixed-capacity ring of consecutive slices owned by one worker thread.
//! Slice `i` lives in slot `i % capacity`. Slots are reset and reused when
//! the ring extends; they are never freed individually.
//!
//! ```text
//! capacity = 4, live slices 5..=7
//!
//! slot:    [0]   [1]   [2]   [3]
//! slice:    8?    5     6     7
//!           ^ free (evicted 4, reusable for 8)
//! ```

use super::state::SliceState;
use crate::error::{SliceError, SliceResult};
use crate::window::{SliceAssigner, SliceIndex, WindowBounds};
use slicestream_types::{Timestamp, WorkerId};
use tracing::{debug, trace};

/// One slice: a time bucket and its partial aggregation state
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    index: SliceIndex,
    bounds: WindowBounds,
    state: SliceState,
}

impl Slice {
    pub fn new(index: SliceIndex, bounds: WindowBounds, state: SliceState) -> Self {
        Self {
            index,
            bounds,
            state,
        }
    }

    pub fn index(&self) -> SliceIndex {
        self.index
    }

    pub fn bounds(&self) -> WindowBounds {
        self.bounds
    }

    pub fn start(&self) -> Timestamp {
        self.bounds.start
    }

    pub fn end(&self) -> Timestamp {
        self.bounds.end
    }

    pub fn state(&self) -> &SliceState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SliceState {
        &mut self.state
    }

    /// Move the partial state out, leaving the slice empty
    pub fn take_state(&mut self) -> SliceState {
        self.state.take()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Reassign the slot to a new slice, clearing its state
    fn reset(&mut self, index: SliceIndex, bounds: WindowBounds) {
        self.index = index;
        self.bounds = bounds;
        self.state.reset();
    }
}

/// Bounded ring of consecutive slices for one worker
#[derive(Debug)]
pub struct ThreadLocalSliceStore {
    worker: WorkerId,
    assigner: SliceAssigner,
    slots: Vec<Option<Slice>>,
    /// Inclusive range of live slice indices
    live: Option<(SliceIndex, SliceIndex)>,
    /// Empty state cloned into newly created slots
    template: SliceState,
    slices_created: u64,
}

impl ThreadLocalSliceStore {
    /// Create a store with `capacity` slots
    pub fn new(
        worker: WorkerId,
        assigner: SliceAssigner,
        capacity: usize,
        template: SliceState,
    ) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            worker,
            assigner,
            slots,
            live: None,
            template,
            slices_created: 0,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn assigner(&self) -> &SliceAssigner {
        &self.assigner
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live slices
    pub fn len(&self) -> usize {
        match self.live {
            Some((first, last)) => (last - first + 1) as usize,
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_none()
    }

    /// Total number of slices created (or slots reset) since construction
    pub fn slices_created(&self) -> u64 {
        self.slices_created
    }

    /// Find the slice owning `ts`, creating slices as needed
    ///
    /// An empty store is anchored at the slice owning `ts`. Timestamps past
    /// the newest slice append slices until covered; timestamps before the
    /// oldest live slice prepend them. Fails when the live range would span
    /// more slices than the ring holds.
    pub fn find_or_create_slice_for(&mut self, ts: Timestamp) -> SliceResult<&mut Slice> {
        let index = self.assigner.slice_index_for(ts);

        match self.live {
            None => {
                self.create_slice(index);
                self.live = Some((index, index));
            }
            Some((first, last)) if index > last => {
                self.check_span(first, index, index)?;
                for next in last + 1..=index {
                    self.create_slice(next);
                }
                self.live = Some((first, index));
            }
            Some((first, last)) if index < first => {
                self.check_span(index, last, index)?;
                for next in index..first {
                    self.create_slice(next);
                }
                self.live = Some((index, last));
            }
            Some(_) => {}
        }

        let err = SliceError::CapacityExceeded {
            worker: self.worker,
            capacity: self.slots.len(),
            requested_index: index,
            oldest_live_index: index,
        };
        let slot = self.slot_of(index);
        self.slots[slot].as_mut().ok_or(err)
    }

    /// Release every live slice up to and including `index`
    ///
    /// Returns the number of slices released. Released slots keep their
    /// memory and are reset when reused.
    pub fn evict_through(&mut self, index: SliceIndex) -> usize {
        let Some((first, last)) = self.live else {
            return 0;
        };
        if index < first {
            return 0;
        }

        let evicted = if index >= last {
            self.live = None;
            last - first + 1
        } else {
            self.live = Some((index + 1, last));
            index - first + 1
        };

        debug!(
            worker = %self.worker,
            through = index,
            evicted,
            "evicted slices"
        );
        evicted as usize
    }

    /// Oldest live slice
    pub fn first(&self) -> Option<&Slice> {
        self.live.and_then(|(first, _)| self.get(first))
    }

    /// Newest live slice
    pub fn last(&self) -> Option<&Slice> {
        self.live.and_then(|(_, last)| self.get(last))
    }

    /// Oldest live slice, mutably
    pub fn first_mut(&mut self) -> Option<&mut Slice> {
        let (first, _) = self.live?;
        self.get_mut(first)
    }

    /// Live slice with the given index
    pub fn get(&self, index: SliceIndex) -> Option<&Slice> {
        if !self.is_live(index) {
            return None;
        }
        self.slots[self.slot_of(index)].as_ref()
    }

    /// Live slice with the given index, mutably
    pub fn get_mut(&mut self, index: SliceIndex) -> Option<&mut Slice> {
        if !self.is_live(index) {
            return None;
        }
        let slot = self.slot_of(index);
        self.slots[slot].as_mut()
    }

    /// Live slices from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Slice> + '_ {
        let range = match self.live {
            Some((first, last)) => first..last + 1,
            None => 0..0,
        };
        range.filter_map(move |index| self.get(index))
    }

    /// Drop every live slice, returning how many held data
    pub fn clear(&mut self) -> usize {
        let discarded = self.iter().filter(|slice| !slice.is_empty()).count();
        self.live = None;
        discarded
    }

    fn is_live(&self, index: SliceIndex) -> bool {
        matches!(self.live, Some((first, last)) if index >= first && index <= last)
    }

    fn slot_of(&self, index: SliceIndex) -> usize {
        (index % self.slots.len() as u64) as usize
    }

    fn check_span(
        &self,
        first: SliceIndex,
        last: SliceIndex,
        requested: SliceIndex,
    ) -> SliceResult<()> {
        let capacity = self.slots.len();
        if last - first >= capacity as u64 {
            return Err(SliceError::CapacityExceeded {
                worker: self.worker,
                capacity,
                requested_index: requested,
                oldest_live_index: self.live.map(|(oldest, _)| oldest).unwrap_or(first),
            });
        }
        Ok(())
    }

    fn create_slice(&mut self, index: SliceIndex) {
        let bounds = self.assigner.bounds_for_index(index);
        let slot = self.slot_of(index);
        match self.slots[slot].as_mut() {
            Some(slice) => slice.reset(index, bounds),
            None => self.slots[slot] = Some(Slice::new(index, bounds, self.template.clone())),
        }
        self.slices_created += 1;

        trace!(
            worker = %self.worker,
            slice_start = %bounds.start,
            slice_end = %bounds.end,
            slot,
            "created slice"
        );
    }
}
