//! Partial aggregation state of one slice

use crate::aggregation::{AccumulatorSet, AggregateSpec};
use crate::error::AggregationResult;
use serde::{Deserialize, Serialize};
use slicestream_types::{GroupKey, Record, Value};
use std::collections::HashMap;

/// Lowered output of one slice or window: one row per key
pub type LoweredRow = (Option<GroupKey>, Vec<(String, Value)>);

/// Aggregation state of a slice: a single accumulator set, or one per key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SliceState {
    Global(AccumulatorSet),
    Keyed(HashMap<GroupKey, AccumulatorSet>),
}

impl SliceState {
    /// Empty state for a query with the given aggregates
    pub fn new(specs: &[AggregateSpec], keyed: bool) -> Self {
        if keyed {
            SliceState::Keyed(HashMap::new())
        } else {
            SliceState::Global(AccumulatorSet::new(specs))
        }
    }

    /// Apply `lift` for one record
    ///
    /// `key` must be present exactly when the state is keyed.
    pub fn lift(
        &mut self,
        record: &Record,
        key: Option<GroupKey>,
        specs: &[AggregateSpec],
    ) -> AggregationResult<()> {
        match (self, key) {
            (SliceState::Keyed(groups), Some(key)) => groups
                .entry(key)
                .or_insert_with(|| AccumulatorSet::new(specs))
                .lift(record, specs),
            (SliceState::Keyed(groups), None) => groups
                .entry(GroupKey::default())
                .or_insert_with(|| AccumulatorSet::new(specs))
                .lift(record, specs),
            (SliceState::Global(set), _) => set.lift(record, specs),
        }
    }

    /// Combine another partial state into this one, key by key
    pub fn combine(&mut self, other: &SliceState) -> AggregationResult<()> {
        match (self, other) {
            (SliceState::Global(a), SliceState::Global(b)) => a.combine(b),
            (SliceState::Keyed(a), SliceState::Keyed(b)) => {
                for (key, set) in b {
                    match a.get_mut(key) {
                        Some(existing) => existing.combine(set)?,
                        None => {
                            a.insert(key.clone(), set.clone());
                        }
                    }
                }
                Ok(())
            }
            (a, b) => Err(crate::error::AggregationError::IncompatibleAccumulators {
                left: a.shape().to_string(),
                right: b.shape().to_string(),
            }),
        }
    }

    /// Apply `lower`, producing rows ordered by key
    ///
    /// Empty states produce no rows.
    pub fn lower(&self, specs: &[AggregateSpec]) -> AggregationResult<Vec<LoweredRow>> {
        match self {
            SliceState::Global(set) if set.is_empty() => Ok(Vec::new()),
            SliceState::Global(set) => Ok(vec![(None, set.lower(specs)?)]),
            SliceState::Keyed(groups) => {
                let mut keys: Vec<&GroupKey> = groups
                    .iter()
                    .filter(|(_, set)| !set.is_empty())
                    .map(|(key, _)| key)
                    .collect();
                keys.sort();
                keys.into_iter()
                    .map(|key| Ok((Some(key.clone()), groups[key].lower(specs)?)))
                    .collect()
            }
        }
    }

    pub fn reset(&mut self) {
        match self {
            SliceState::Global(set) => set.reset(),
            SliceState::Keyed(groups) => groups.clear(),
        }
    }

    /// Move the state out, leaving an empty state of the same shape behind
    pub fn take(&mut self) -> SliceState {
        let mut empty = match self {
            SliceState::Global(set) => SliceState::Global(set.clone()),
            SliceState::Keyed(_) => SliceState::Keyed(HashMap::new()),
        };
        empty.reset();
        std::mem::replace(self, empty)
    }

    /// Number of records lifted into this state
    pub fn records(&self) -> u64 {
        match self {
            SliceState::Global(set) => set.records(),
            SliceState::Keyed(groups) => groups.values().map(AccumulatorSet::records).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records() == 0
    }

    /// Number of distinct keys, or 1 for a non-empty global state
    pub fn key_count(&self) -> usize {
        match self {
            SliceState::Global(set) => usize::from(!set.is_empty()),
            SliceState::Keyed(groups) => groups.len(),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            SliceState::Global(_) => "global",
            SliceState::Keyed(_) => "keyed",
        }
    }
}
