//! Query pipeline
//!
//! A query runs in three stages:
//! - Pre-aggregation: each worker lifts records into its own slice store
//! - Merge: finalized slices from all workers are folded exactly once
//! - Trigger: windows fire when the merged watermark frontier passes them
//!
//! # Example
//!
//! ```rust,no_run
//! use slicestream_processor::pipeline::QueryBuilder;
//! use slicestream_processor::sink::CollectingSink;
//! use slicestream_types::{OriginId, Record, RecordBatch, Timestamp};
//! use std::sync::Arc;
//!
//! # fn example() -> slicestream_processor::error::Result<()> {
//! let sink = CollectingSink::new();
//! let query = QueryBuilder::new()
//!     .with_tumbling_window(1_000)
//!     .with_allowed_lateness(0)
//!     .with_sink(Arc::new(sink.clone()))
//!     .start()?;
//!
//! query.submit(RecordBatch::new(
//!     OriginId(0),
//!     1,
//!     Timestamp::new(1_000),
//!     vec![Record::new().with("timestamp", 250u64)],
//! ))?;
//! query.stop()?;
//!
//! for row in sink.results() {
//!     println!("{}", row);
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod context;
pub mod executor;
pub mod lifecycle;
pub mod merge;
pub mod operator;
pub mod task;

pub use builder::QueryBuilder;
pub use context::{QueryContext, QueryId};
pub use executor::{Engine, QueryHandle, QueryStatus};
pub use lifecycle::{LoggingLifecycle, QueryLifecycle};
pub use merge::{MergeCoordinator, MergeOutcome};
pub use operator::{PreAggregationOperator, RecordOutcome};
pub use task::{MergeMessage, SliceMergeTask};
