//! Watermark tracking
//!
//! A watermark is the timestamp below which an origin guarantees no further
//! records. Each origin's batches are closed out of order by the workers; the
//! [`SequenceTracker`] turns those closes into a monotonic safe watermark, and
//! the [`WatermarkProcessor`] takes the minimum over all origins of a query.
//!
//! # Example
//!
//! ```rust
//! use slicestream_processor::watermark::WatermarkProcessor;
//! use slicestream_types::{OriginId, SequenceData, Timestamp};
//!
//! let processor = WatermarkProcessor::new(&[OriginId(0)], 100);
//!
//! // Sequence 2 arrives first: nothing is safe yet
//! let wm = processor
//!     .update_watermark(OriginId(0), SequenceData::new(2), Timestamp::new(20))
//!     .unwrap();
//! assert_eq!(wm, Timestamp::new(0));
//!
//! let wm = processor
//!     .update_watermark(OriginId(0), SequenceData::new(1), Timestamp::new(10))
//!     .unwrap();
//! assert_eq!(wm, Timestamp::new(20));
//! ```

pub mod multi_origin;
pub mod tracker;

pub use multi_origin::WatermarkProcessor;
pub use tracker::SequenceTracker;
