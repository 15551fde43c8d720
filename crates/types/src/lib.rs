//! Core types shared by the slicestream windowed aggregation engine
//!
//! This crate provides the value types that flow through the engine:
//! timestamps, origin and worker identifiers, sequenced record batches,
//! field values and grouping keys, and finalized window result rows.

pub mod errors;
pub mod ids;
pub mod records;
pub mod results;
pub mod time;
pub mod values;

pub use errors::{Result, TypesError};
pub use ids::{ChunkNumber, OriginId, SequenceData, SequenceNumber, WorkerId};
pub use records::{Record, RecordBatch};
pub use results::WindowResult;
pub use time::Timestamp;
pub use values::{GroupKey, KeyPart, Value};
