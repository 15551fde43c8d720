use crate::error::AggregationResult;
use serde::{Deserialize, Serialize};
use slicestream_types::Value;
use std::fmt::Debug;

/// Core trait for all per-slice accumulators
///
/// Every accumulator implements the three-phase contract:
/// - `lift`: incorporate one input value
/// - `combine`: merge another partial state of the same kind into this one
/// - `lower`: produce the final value
///
/// `combine` must be associative and commutative: worker partials reach the
/// merge in any order.
pub trait Aggregator:
    Send + Sync + Debug + Clone + Default + Serialize + for<'de> Deserialize<'de>
{
    /// Incorporate one value. Nulls are skipped.
    fn lift(&mut self, value: &Value) -> AggregationResult<()>;

    /// Merge another partial state into this one
    fn combine(&mut self, other: &Self) -> AggregationResult<()>;

    /// Produce the final value. Empty accumulators lower to `Value::Null`
    /// unless the aggregate defines a neutral value.
    fn lower(&self) -> Value;

    /// Verify that the lowered value is representable
    ///
    /// Checked once before lowering, so the outcome does not depend on the
    /// order partials were combined in.
    fn check(&self) -> AggregationResult<()> {
        Ok(())
    }
    /// Reset to the initial state
    fn reset(&mut self);

    /// Number of values incorporated so far
    fn count(&self) -> u64;

    /// Check if the accumulator has incorporated any values
    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
