use super::number::Number;
use super::trait_::Aggregator;
use crate::error::AggregationResult;
use serde::{Deserialize, Serialize};
use slicestream_types::Value;
use std::cmp::Ordering;

/// Keep the value further in direction `keep`; equal values prefer `Int`
fn pick(current: Option<Number>, candidate: Number, keep: Ordering) -> Number {
    let Some(current) = current else {
        return candidate;
    };
    match current.total_cmp(&candidate) {
        Ordering::Equal => match (current, candidate) {
            (Number::Float(_), Number::Int(_)) => candidate,
            _ => current,
        },
        ordering if ordering == keep => current,
        _ => candidate,
    }
}

/// Min accumulator - tracks the minimum non-null value
///
/// # Examples
///
/// ```
/// use slicestream_processor::aggregation::{Aggregator, MinAccumulator};
/// use slicestream_types::Value;
///
/// let mut acc = MinAccumulator::default();
/// acc.lift(&Value::Int(30)).unwrap();
/// acc.lift(&Value::Int(10)).unwrap();
/// acc.lift(&Value::Int(20)).unwrap();
///
/// assert_eq!(acc.lower(), Value::Int(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinAccumulator {
    min: Option<Number>,
    count: u64,
}

impl MinAccumulator {
    /// Get the current minimum value
    pub fn min(&self) -> Option<Number> {
        self.min
    }
}

impl Aggregator for MinAccumulator {
    fn lift(&mut self, value: &Value) -> AggregationResult<()> {
        if let Some(number) = Number::from_value(value, "min")? {
            self.min = Some(pick(self.min, number, Ordering::Less));
            self.count += 1;
        }
        Ok(())
    }

    fn combine(&mut self, other: &Self) -> AggregationResult<()> {
        if let Some(number) = other.min {
            self.min = Some(pick(self.min, number, Ordering::Less));
            self.count += other.count;
        }
        Ok(())
    }

    fn lower(&self) -> Value {
        self.min.map(Number::into_value).unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.min = None;
        self.count = 0;
    }

    fn count(&self) -> u64 {
        self.count
    }
}

/// Max accumulator - tracks the maximum non-null value
///
/// # Examples
///
/// ```
/// use slicestream_processor::aggregation::{Aggregator, MaxAccumulator};
/// use slicestream_types::Value;
///
/// let mut acc = MaxAccumulator::default();
/// acc.lift(&Value::Int(10)).unwrap();
/// acc.lift(&Value::Int(30)).unwrap();
/// acc.lift(&Value::Int(20)).unwrap();
///
/// assert_eq!(acc.lower(), Value::Int(30));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxAccumulator {
    max: Option<Number>,
    count: u64,
}

impl MaxAccumulator {
    /// Get the current maximum value
    pub fn max(&self) -> Option<Number> {
        self.max
    }
}

impl Aggregator for MaxAccumulator {
    fn lift(&mut self, value: &Value) -> AggregationResult<()> {
        if let Some(number) = Number::from_value(value, "max")? {
            self.max = Some(pick(self.max, number, Ordering::Greater));
            self.count += 1;
        }
        Ok(())
    }

    fn combine(&mut self, other: &Self) -> AggregationResult<()> {
        if let Some(number) = other.max {
            self.max = Some(pick(self.max, number, Ordering::Greater));
            self.count += other.count;
        }
        Ok(())
    }

    fn lower(&self) -> Value {
        self.max.map(Number::into_value).unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.max = None;
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
    fn test_min_basic() {
        let mut acc = MinAccumulator::default();
        assert_eq!(acc.min(), None);
        assert_eq!(acc.lower(), Value::Null);

        acc.lift(&Value::Float(30.0)).unwrap();
        acc.lift(&Value::Float(10.0)).unwrap();
        acc.lift(&Value::Float(20.0)).unwrap();

        assert_eq!(acc.min(), Some(Number::Float(10.0)));
        assert_eq!(acc.count(), 3);
    }

    #[test]
    fn test_min_negative_values() {
        let mut acc = MinAccumulator::default();
        acc.lift(&Value::Int(-10)).unwrap();
        acc.lift(&Value::Int(5)).unwrap();
        acc.lift(&Value::Int(-20)).unwrap();

        assert_eq!(acc.lower(), Value::Int(-20));
    }

    #[test]
    fn test_min_combine() {
        let mut acc1 = MinAccumulator::default();
        acc1.lift(&Value::Int(30)).unwrap();
        acc1.lift(&Value::Int(40)).unwrap();

        let mut acc2 = MinAccumulator::default();
        acc2.lift(&Value::Int(10)).unwrap();
        acc2.lift(&Value::Int(20)).unwrap();

        acc1.combine(&acc2).unwrap();
        assert_eq!(acc1.lower(), Value::Int(10));
        assert_eq!(acc1.count(), 4);
    }

    #[test]
    fn test_min_combine_with_empty() {
        let mut acc1 = MinAccumulator::default();
        acc1.lift(&Value::Int(30)).unwrap();

        acc1.combine(&MinAccumulator::default()).unwrap();
        assert_eq!(acc1.lower(), Value::Int(30));

        let mut empty = MinAccumulator::default();
        empty.combine(&acc1).unwrap();
        assert_eq!(empty.lower(), Value::Int(30));
    }

    #[test]
    fn test_max_basic() {
        let mut acc = MaxAccumulator::default();
        assert_eq!(acc.lower(), Value::Null);

        acc.lift(&Value::Int(10)).unwrap();
        acc.lift(&Value::Float(30.5)).unwrap();
        acc.lift(&Value::Int(20)).unwrap();

        assert_eq!(acc.max(), Some(Number::Float(30.5)));
    }

    #[test]
    fn test_max_combine() {
        let mut acc1 = MaxAccumulator::default();
        acc1.lift(&Value::Int(10)).unwrap();

        let mut acc2 = MaxAccumulator::default();
        acc2.lift(&Value::Int(50)).unwrap();
        acc2.lift(&Value::Null).unwrap();

        acc1.combine(&acc2).unwrap();
        assert_eq!(acc1.lower(), Value::Int(50));
        assert_eq!(acc1.count(), 2);
    }

    #[test]
    fn test_equal_values_prefer_int() {
        for values in [
            [Value::Int(1), Value::Float(1.0)],
            [Value::Float(1.0), Value::Int(1)],
        ] {
            let mut min = MinAccumulator::default();
            let mut max = MaxAccumulator::default();
            for value in &values {
                min.lift(value).unwrap();
                max.lift(value).unwrap();
            }
            assert_eq!(min.lower(), Value::Int(1));
            assert_eq!(max.lower(), Value::Int(1));
        }
    }

    #[test]
    fn test_minmax_reset() {
        let mut min = MinAccumulator::default();
        let mut max = MaxAccumulator::default();
        min.lift(&Value::Int(1)).unwrap();
        max.lift(&Value::Int(1)).unwrap();

        min.reset();
        max.reset();
        assert!(min.is_empty() && max.is_empty());
        assert_eq!(min.lower(), Value::Null);
        assert_eq!(max.lower(), Value::Null);
    }
}
