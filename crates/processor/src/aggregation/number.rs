//! Numeric values inside accumulators
//!
//! Integers stay integers until a float is mixed in. Integer totals are
//! checked against `i64` and overflow is reported, never wrapped.

use crate::error::{AggregationError, AggregationResult};
use serde::{Deserialize, Serialize};
use slicestream_types::Value;
use std::cmp::Ordering;

/// A numeric accumulator value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Read a record value as a number
    ///
    /// Returns `Ok(None)` for nulls, which aggregates skip.
    pub fn from_value(value: &Value, operation: &str) -> AggregationResult<Option<Number>> {
        match value {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(Number::Int(*v))),
            Value::UInt(v) => i64::try_from(*v).map(|v| Some(Number::Int(v))).map_err(|_| {
                AggregationError::NumericOverflow {
                    operation: operation.to_string(),
                    details: format!("unsigned value {} does not fit into i64", v),
                }
            }),
            Value::Float(v) => Ok(Some(Number::Float(*v))),
            other => Err(AggregationError::TypeMismatch {
                expected: "numeric".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    /// Total order used by min/max
    pub fn total_cmp(&self, other: &Number) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(v) => Value::Int(v),
            Number::Float(v) => Value::Float(v),
        }
    }
}

/// Running sum whose outcome does not depend on the order of additions
///
/// Integer and float inputs are kept apart: integers accumulate exactly in an
/// `i128`, floats in an `f64`. The integer total is checked against `i64`
/// only when the sum is read, so partials may combine in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericSum {
    int: i128,
    float: f64,
    has_float: bool,
}

impl NumericSum {
    pub fn add(&mut self, number: Number) {
        match number {
            Number::Int(v) => self.int = self.int.saturating_add(i128::from(v)),
            Number::Float(v) => {
                self.float += v;
                self.has_float = true;
            }
        }
    }

    pub fn merge(&mut self, other: &NumericSum) {
        self.int = self.int.saturating_add(other.int);
        self.float += other.float;
        self.has_float |= other.has_float;
    }

    /// The total, a float once any float was added
    pub fn total(&self, operation: &str) -> AggregationResult<Number> {
        if self.has_float {
            return Ok(Number::Float(self.as_f64()));
        }
        i64::try_from(self.int)
            .map(Number::Int)
            .map_err(|_| AggregationError::NumericOverflow {
                operation: operation.to_string(),
                details: format!("sum {} does not fit into i64", self.int),
            })
    }

    pub fn as_f64(&self) -> f64 {
        self.int as f64 + self.float
    }

    pub fn reset(&mut self) {
        *self = NumericSum::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value() {
        assert_eq!(Number::from_value(&Value::Null, "sum").unwrap(), None);
        assert_eq!(
            Number::from_value(&Value::UInt(7), "sum").unwrap(),
            Some(Number::Int(7))
        );
        assert!(matches!(
            Number::from_value(&Value::UInt(u64::MAX), "sum"),
            Err(AggregationError::NumericOverflow { .. })
        ));
        assert!(matches!(
            Number::from_value(&Value::from("x"), "sum"),
            Err(AggregationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_numeric_sum() {
        let mut sum = NumericSum::default();
        sum.add(Number::Int(2));
        sum.add(Number::Int(3));
        assert_eq!(sum.total("sum").unwrap(), Number::Int(5));

        sum.add(Number::Float(0.5));
        assert_eq!(sum.total("sum").unwrap(), Number::Float(5.5));
    }

    #[test]
    fn test_numeric_sum_checks_only_the_total() {
        let mut sum = NumericSum::default();
        sum.add(Number::Int(i64::MAX));
        sum.add(Number::Int(1));
        assert!(matches!(
            sum.total("sum"),
            Err(AggregationError::NumericOverflow { .. })
        ));

        // the intermediate overflow cancels out
        sum.add(Number::Int(-1));
        assert_eq!(sum.total("sum").unwrap(), Number::Int(i64::MAX));
    }

    #[test]
    fn test_total_cmp_mixed() {
        assert_eq!(Number::Int(2).total_cmp(&Number::Float(2.5)), Ordering::Less);
        assert_eq!(Number::Int(3).total_cmp(&Number::Int(3)), Ordering::Equal);
    }
}
