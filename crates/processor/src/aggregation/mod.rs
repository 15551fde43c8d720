//! Aggregation functions for slice pre-aggregation
//!
//! Each aggregate follows the lift / combine / lower contract:
//!
//! - **lift**: incorporate one record into a slice's partial state
//! - **combine**: merge partial states from different workers
//! - **lower**: produce the final value of a window
//!
//! The set of aggregates is closed ([`AggregateKind`]) and dispatched through
//! the [`Accumulator`] enum.
//!
//! # Available Accumulators
//!
//! - [`CountAccumulator`]: Count records or non-null values
//! - [`SumAccumulator`]: Sum numeric values (checked integer arithmetic)
//! - [`MinAccumulator`]: Track the minimum value
//! - [`MaxAccumulator`]: Track the maximum value
//! - [`AverageAccumulator`]: Compute the mean
//!
//! # Examples
//!
//! ```rust
//! use slicestream_processor::aggregation::{AccumulatorSet, AggregateSpec};
//! use slicestream_types::{Record, Value};
//!
//! let specs = vec![AggregateSpec::count("n"), AggregateSpec::avg("latency", "avg_latency")];
//!
//! // Two workers pre-aggregate independently
//! let mut worker1 = AccumulatorSet::new(&specs);
//! worker1.lift(&Record::new().with("latency", 100i64), &specs).unwrap();
//!
//! let mut worker2 = AccumulatorSet::new(&specs);
//! worker2.lift(&Record::new().with("latency", 200i64), &specs).unwrap();
//!
//! // The merge combines partials and lowers the result
//! worker1.combine(&worker2).unwrap();
//! let values = worker1.lower(&specs).unwrap();
//! assert_eq!(values[0].1, Value::UInt(2));
//! assert_eq!(values[1].1, Value::Float(150.0));
//! ```

mod accumulator;
mod avg;
mod count;
mod minmax;
mod number;
mod sum;
mod trait_;

pub use accumulator::{Accumulator, AccumulatorSet, AggregateKind, AggregateSpec};
pub use avg::AverageAccumulator;
pub use count::CountAccumulator;
pub use minmax::{MaxAccumulator, MinAccumulator};
pub use number::{Number, NumericSum};
pub use sum::SumAccumulator;
pub use trait_::Aggregator;
