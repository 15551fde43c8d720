use super::trait_::Aggregator;
use crate::error::AggregationResult;
use serde::{Deserialize, Serialize};
use slicestream_types::Value;

/// Count accumulator - counts records, or non-null values of a field
///
/// # Examples
///
/// ```
/// use slicestream_processor::aggregation::{Aggregator, CountAccumulator};
/// use slicestream_types::Value;
///
/// let mut acc = CountAccumulator::default();
/// acc.lift(&Value::Int(1)).unwrap();
/// acc.lift(&Value::Null).unwrap();
/// acc.increment();
///
/// assert_eq!(acc.lower(), Value::UInt(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountAccumulator {
    count: u64,
}

impl CountAccumulator {
    /// Count one record regardless of its fields
    pub fn increment(&mut self) {
        self.count += 1;
    }
}

impl Aggregator for CountAccumulator {
    fn lift(&mut self, value: &Value) -> AggregationResult<()> {
        if !matches!(value, Value::Null) {
            self.count += 1;
        }
        Ok(())
    }

    fn combine(&mut self, other: &Self) -> AggregationResult<()> {
        self.count += other.count;
        Ok(())
    }

    fn lower(&self) -> Value {
        Value::UInt(self.count)
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn count(&self) -> u64 {
        self.count
    }
}
