use super::number::{Number, NumericSum};
use super::trait_::Aggregator;
use crate::error::AggregationResult;
use serde::{Deserialize, Serialize};
use slicestream_types::Value;

/// Sum accumulator - computes the sum of all non-null values
///
/// Integer inputs are summed exactly; any float input turns the sum into a
/// float. An integer total outside `i64` fails [`Aggregator::check`]. An
/// empty sum lowers to `Value::Null`.
///
/// # Examples
///
/// ```
/// use slicestream_processor::aggregation::{Aggregator, SumAccumulator};
/// use slicestream_types::Value;
///
/// let mut acc = SumAccumulator::default();
/// acc.lift(&Value::Int(1)).unwrap();
/// acc.lift(&Value::Int(2)).unwrap();
/// acc.lift(&Value::Int(3)).unwrap();
///
/// assert_eq!(acc.lower(), Value::Int(6));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SumAccumulator {
    sum: NumericSum,
    count: u64,
}

impl SumAccumulator {
    /// Current sum, if any value was incorporated
    pub fn sum(&self) -> Option<Number> {
        if self.count == 0 {
            return None;
        }
        self.sum.total("sum").ok()
    }
}

impl Aggregator for SumAccumulator {
    fn lift(&mut self, value: &Value) -> AggregationResult<()> {
        if let Some(number) = Number::from_value(value, "sum")? {
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
        if self.count == 0 {
            return Value::Null;
        }
        match self.sum.total("sum") {
            Ok(total) => total.into_value(),
            // out of i64 range; check() reports it
            Err(_) => Value::Float(self.sum.as_f64()),
        }
    }

    fn check(&self) -> AggregationResult<()> {
        if self.count > 0 {
            self.sum.total("sum")?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.sum.reset();
        self.count = 0;
    }

    fn count(&self) -> u64 {
        self.count
    }
}
