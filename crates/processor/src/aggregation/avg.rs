use super::number::{Number, NumericSum};
use super::trait_::Aggregator;
use crate::error::AggregationResult;
use serde::{Deserialize, Serialize};
use slicestream_types::Value;

/// Average accumulator - computes the mean of all non-null values
///
/// Carries `(sum, count)` so partials combine exactly; the division happens
/// only in `lower`.
///
/// # Examples
///
/// ```
/// use slicestream_processor::aggregation::{Aggregator, AverageAccumulator};
/// use slicestream_types::Value;
///
/// let mut acc = AverageAccumulator::default();
/// acc.lift(&Value::Int(10)).unwrap();
/// acc.lift(&Value::Int(20)).unwrap();
/// acc.lift(&Value::Int(30)).unwrap();
///
/// assert_eq!(acc.lower(), Value::Float(20.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageAccumulator {
    sum: NumericSum,
    count: u64,
}

impl AverageAccumulator {
    /// Get the current mean value
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum.as_f64() / self.count as f64)
    }
}

impl Aggregator for AverageAccumulator {
    fn lift(&mut self, value: &Value) -> AggregationResult<()> {
        if let Some(number) = Number::from_value(value, "avg")? {
            self.sum.add(number);
            self.count += 1;
        }
        Ok(())
    }

    fn combine(&mut self, other: &Self) -> AggregationResult<()> {
        self.sum.merge(&other.sum);
        self.count += other.count;
        Ok(())
    }

    fn lower(&self) -> Value {
        self.mean().map(Value::Float).unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.sum.reset();
        self.count = 0;
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_basic() {
        let mut acc = AverageAccumulator::default();
        assert_eq!(acc.lower(), Value::Null);
        assert_eq!(acc.mean(), None);

        acc.lift(&Value::Float(10.0)).unwrap();
        acc.lift(&Value::Float(20.0)).unwrap();
        acc.lift(&Value::Float(30.0)).unwrap();

        assert_eq!(acc.count(), 3);
        assert_eq!(acc.lower(), Value::Float(20.0));
    }

    #[test]
    fn test_average_combine() {
        // Worker partials: mean(1..=3) and mean(4..=9)
        let mut acc1 = AverageAccumulator::default();
        for v in 1..=3 {
            acc1.lift(&Value::Int(v)).unwrap();
        }

        let mut acc2 = AverageAccumulator::default();
        for v in 4..=9 {
            acc2.lift(&Value::Int(v)).unwrap();
        }

        acc1.combine(&acc2).unwrap();
        assert_eq!(acc1.count(), 9);
        assert_eq!(acc1.lower(), Value::Float(5.0));
    }

    #[test]
    fn test_average_reset() {
        let mut acc = AverageAccumulator::default();
        acc.lift(&Value::Int(4)).unwrap();

        acc.reset();
        assert!(acc.is_empty());
        assert_eq!(acc.lower(), Value::Null);
    }
}
