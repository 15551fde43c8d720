//! Input records and sequenced batches

use crate::ids::{OriginId, SequenceData};
use crate::time::Timestamp;
use crate::values::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single input record: a set of named field values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: HashMap<String, Value>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set a field
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Read a field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A batch of records emitted by one origin
///
/// Every batch carries the sequencing data of its origin and the event-time
/// watermark the producer knew at emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    /// Producer of the batch
    pub origin: OriginId,
    /// Sequence number, chunk number and last-chunk flag
    pub sequence: SequenceData,
    /// Producer watermark at emission time
    pub watermark: Timestamp,
    /// Records carried by the batch
    pub records: Vec<Record>,
}

impl RecordBatch {
    /// Create an unfragmented batch
    pub fn new(
        origin: OriginId,
        sequence_number: u64,
        watermark: impl Into<Timestamp>,
        records: Vec<Record>,
    ) -> Self {
        Self {
            origin,
            sequence: SequenceData::new(sequence_number),
            watermark: watermark.into(),
            records,
        }
    }

    /// Replace the sequencing data, e.g. to describe one chunk of a fragmented batch
    pub fn with_sequence(mut self, sequence: SequenceData) -> Self {
        self.sequence = sequence;
        self
    }

    /// Number of records in the batch
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch carries no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
