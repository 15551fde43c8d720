//! Error types for the windowed aggregation engine
//!
//! Errors are split by concern (slice stores, aggregation, watermarks, buffers)
//! and folded into [`ProcessorError`]. Late records are not errors: they are
//! dropped and counted.

use slicestream_types::{OriginId, SequenceNumber, Timestamp, TypesError, WorkerId};
use thiserror::Error;

/// Main processor error type
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Slice store errors
    #[error("slice error: {0}")]
    Slice(#[from] SliceError),

    /// Aggregation-related errors
    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// Watermark and sequence tracking errors
    #[error("watermark error: {0}")]
    Watermark(#[from] WatermarkError),

    /// Result buffer errors
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Configuration errors
    #[error("configuration error: {source}")]
    Configuration {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Execution errors
    #[error("execution error: {source}")]
    Execution {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic error for unexpected conditions
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ProcessorError {
    /// Whether the error terminates the affected query
    ///
    /// Capacity violations and computational errors inside aggregation
    /// functions are fatal. Backpressure from the sequence tracker, stale
    /// (re-delivered) batches and an exhausted buffer pool are recoverable.
    pub fn is_fatal(&self) -> bool {
        match self {
            ProcessorError::Slice(_) | ProcessorError::Aggregation(_) => true,
            ProcessorError::Watermark(err) => !err.is_recoverable(),
            ProcessorError::Buffer(BufferError::PoolExhausted { .. }) => false,
            ProcessorError::Buffer(_) => true,
            ProcessorError::Configuration { .. } => true,
            ProcessorError::Execution { .. } => true,
            ProcessorError::Serialization(_) | ProcessorError::Unexpected(_) => true,
        }
    }

    /// Shorthand for an execution error with a message
    pub fn execution(message: impl Into<String>) -> Self {
        ProcessorError::Execution {
            source: message.into().into(),
        }
    }

    /// Shorthand for a configuration error with a message
    pub fn configuration(message: impl Into<String>) -> Self {
        ProcessorError::Configuration {
            source: message.into().into(),
        }
    }
}

/// Thread-local slice store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SliceError {
    /// The ring would have to reuse a slot whose slice is still live
    #[error("slice store capacity exceeded on {worker}: capacity={capacity}, requested slice {requested_index}, oldest live slice {oldest_live_index}")]
    CapacityExceeded {
        worker: WorkerId,
        capacity: usize,
        requested_index: u64,
        oldest_live_index: u64,
    },

    /// Slide size must be positive
    #[error("invalid slide size: {slide}ms, must be greater than 0")]
    InvalidSlideSize { slide: u64 },

    /// Window size must be a positive multiple of the slide
    #[error("invalid window size: {size}ms, must be a positive multiple of slide {slide}ms")]
    InvalidWindowSize { size: u64, slide: u64 },
}

/// Aggregation computation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// Numeric overflow during aggregation
    #[error("numeric overflow in {operation}: {details}")]
    NumericOverflow { operation: String, details: String },

    /// Type mismatch in aggregation
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Input field missing from a record
    #[error("record has no field '{field}'")]
    MissingField { field: String },

    /// Grouping key could not be built
    #[error("invalid grouping key: {0}")]
    InvalidGroupKey(#[from] TypesError),

    /// Accumulators of different shapes were combined
    #[error("cannot combine {left} accumulator with {right} accumulator")]
    IncompatibleAccumulators { left: String, right: String },
}

/// Watermark and sequence tracking errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatermarkError {
    /// Batch came from an origin the query does not know about
    #[error("unknown origin: {origin}")]
    UnknownOrigin { origin: OriginId },

    /// Sequence number was already applied
    #[error("stale sequence number {sequence} for {origin}: already applied through {current}")]
    StaleSequence {
        origin: OriginId,
        sequence: SequenceNumber,
        current: SequenceNumber,
    },

    /// Sequence number is too far ahead of the contiguous prefix
    #[error("sequence number {sequence} for {origin} is beyond the tracking window: current={current}, window={window}")]
    TrackingWindowExceeded {
        origin: OriginId,
        sequence: SequenceNumber,
        current: SequenceNumber,
        window: usize,
    },

    /// Chunk numbering is inconsistent
    #[error("invalid chunk {chunk} for sequence {sequence} of {origin}: {reason}")]
    InvalidChunk {
        origin: OriginId,
        sequence: SequenceNumber,
        chunk: u64,
        reason: String,
    },

    /// Watermark went backwards
    #[error("watermark regression: new watermark {new_watermark} is before current {current_watermark}")]
    WatermarkRegression {
        current_watermark: Timestamp,
        new_watermark: Timestamp,
    },
}

impl WatermarkError {
    /// Whether the error is a backpressure signal rather than a defect
    pub fn is_backpressure(&self) -> bool {
        matches!(self, WatermarkError::TrackingWindowExceeded { .. })
    }

    /// Whether processing can continue after the error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WatermarkError::TrackingWindowExceeded { .. } | WatermarkError::StaleSequence { .. }
        )
    }
}

/// Result buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Every region of the pool is in use
    #[error("buffer pool exhausted: all {regions} regions are in use")]
    PoolExhausted { regions: usize },

    /// A single row does not fit into one region
    #[error("row of {required} bytes does not fit into a region of {capacity} bytes")]
    RegionOverflow { required: usize, capacity: usize },
}

/// Result type alias for processor operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Result type alias for slice store operations
pub type SliceResult<T> = std::result::Result<T, SliceError>;

/// Result type alias for aggregation operations
pub type AggregationResult<T> = std::result::Result<T, AggregationError>;

/// Result type alias for watermark operations
pub type WatermarkResult<T> = std::result::Result<T, WatermarkError>;

/// Result type alias for buffer operations
pub type BufferResult<T> = std::result::Result<T, BufferError>;

impl From<bincode::Error> for ProcessorError {
    fn from(err: bincode::Error) -> Self {
        ProcessorError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ProcessorError {
    fn from(err: serde_json::Error) -> Self {
        ProcessorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ProcessorError {
    fn from(err: anyhow::Error) -> Self {
        ProcessorError::Unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_error_display() {
        let err = SliceError::CapacityExceeded {
            worker: WorkerId(2),
            capacity: 4,
            requested_index: 9,
            oldest_live_index: 3,
        };
        assert!(err.to_string().contains("capacity exceeded on worker-2"));
    }

    #[test]
    fn test_aggregation_error_display() {
        let err = AggregationError::NumericOverflow {
            operation: "sum".to_string(),
            details: "i64 overflow".to_string(),
        };
        assert!(err.to_string().contains("numeric overflow in sum"));
    }

    #[test]
    fn test_watermark_error_display() {
        let err = WatermarkError::TrackingWindowExceeded {
            origin: OriginId(1),
            sequence: 500,
            current: 2,
            window: 100,
        };
        assert!(err.to_string().contains("beyond the tracking window"));
        assert!(err.is_backpressure());
    }

    #[test]
    fn test_fatal_classification() {
        let capacity: ProcessorError = SliceError::InvalidSlideSize { slide: 0 }.into();
        assert!(capacity.is_fatal());

        let backpressure: ProcessorError = WatermarkError::TrackingWindowExceeded {
            origin: OriginId(0),
            sequence: 200,
            current: 1,
            window: 100,
        }
        .into();
        assert!(!backpressure.is_fatal());

        let exhausted: ProcessorError = BufferError::PoolExhausted { regions: 8 }.into();
        assert!(!exhausted.is_fatal());

        let unknown: ProcessorError = WatermarkError::UnknownOrigin {
            origin: OriginId(7),
        }
        .into();
        assert!(unknown.is_fatal());
    }

    #[test]
    fn test_processor_error_from_slice_error() {
        let err: ProcessorError = SliceError::InvalidSlideSize { slide: 0 }.into();
        assert!(matches!(err, ProcessorError::Slice(_)));
    }
}
