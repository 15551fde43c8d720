//! Time-sliced windowed aggregation engine
//!
//! Records are pre-aggregated per worker into non-overlapping time slices.
//! When the watermark passes a slice, its partial state is handed to a merge
//! coordinator that folds every worker's contribution exactly once and fires
//! tumbling or sliding windows from the merged slices.

pub mod aggregation;
pub mod buffer;
pub mod config;
pub mod core;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod slice;
pub mod watermark;
pub mod window;

// Re-export commonly used types
pub use core::{
    EventTimeFunction, FieldKeyExtractor, IngestionTimeFunction, KeyExtractor, TimeFunction,
};

pub use window::{SliceAssigner, SliceIndex, WindowBounds, WindowType};

pub use aggregation::{Accumulator, AccumulatorSet, AggregateKind, AggregateSpec};

pub use slice::{Slice, SliceState, ThreadLocalSliceStore};

pub use watermark::{SequenceTracker, WatermarkProcessor};

pub use error::{
    AggregationError, BufferError, ProcessorError, Result as ProcessorResult, SliceError,
    WatermarkError,
};

pub use config::{
    AggregationConfig, BufferConfig, ProcessorConfig, SliceStoreConfig, TimeConfig,
    WatermarkConfig, WindowConfig,
};

pub use buffer::{BufferHandle, BufferPool, ResultBuffer};

pub use sink::{ChannelSink, CollectingSink, WindowSink};

pub use metrics::{EngineMetrics, EngineStats, MetricsRegistry};

pub use pipeline::{
    Engine, LoggingLifecycle, MergeCoordinator, PreAggregationOperator, QueryBuilder,
    QueryContext, QueryHandle, QueryId, QueryLifecycle, QueryStatus, SliceMergeTask,
};
