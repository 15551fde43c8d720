//! Closed set of aggregation kinds and per-slice accumulator sets

use super::avg::AverageAccumulator;
use super::count::CountAccumulator;
use super::minmax::{MaxAccumulator, MinAccumulator};
use super::sum::SumAccumulator;
use super::trait_::Aggregator;
use crate::error::{AggregationError, AggregationResult};
use serde::{Deserialize, Serialize};
use slicestream_types::{Record, Value};
use std::fmt;

/// Supported aggregation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateKind::Count => "count",
            AggregateKind::Sum => "sum",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Avg => "avg",
        };
        write!(f, "{}", name)
    }
}

/// One aggregate computed per window: `kind(field) AS output`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub kind: AggregateKind,
    /// Input field; `None` is only valid for `count`, which then counts records
    #[serde(default)]
    pub field: Option<String>,
    /// Name of the result field
    pub output: String,
}

impl AggregateSpec {
    pub fn new(kind: AggregateKind, field: Option<&str>, output: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.map(str::to_string),
            output: output.into(),
        }
    }

    /// Count all records
    pub fn count(output: impl Into<String>) -> Self {
        Self::new(AggregateKind::Count, None, output)
    }

    pub fn sum(field: &str, output: impl Into<String>) -> Self {
        Self::new(AggregateKind::Sum, Some(field), output)
    }

    pub fn min(field: &str, output: impl Into<String>) -> Self {
        Self::new(AggregateKind::Min, Some(field), output)
    }

    pub fn max(field: &str, output: impl Into<String>) -> Self {
        Self::new(AggregateKind::Max, Some(field), output)
    }

    pub fn avg(field: &str, output: impl Into<String>) -> Self {
        Self::new(AggregateKind::Avg, Some(field), output)
    }
}

/// Accumulator for one aggregate, dispatched by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Accumulator {
    Count(CountAccumulator),
    Sum(SumAccumulator),
    Min(MinAccumulator),
    Max(MaxAccumulator),
    Avg(AverageAccumulator),
}

impl Accumulator {
    /// Create an empty accumulator of the given kind
    pub fn new(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Count => Accumulator::Count(CountAccumulator::default()),
            AggregateKind::Sum => Accumulator::Sum(SumAccumulator::default()),
            AggregateKind::Min => Accumulator::Min(MinAccumulator::default()),
            AggregateKind::Max => Accumulator::Max(MaxAccumulator::default()),
            AggregateKind::Avg => Accumulator::Avg(AverageAccumulator::default()),
        }
    }

    pub fn kind(&self) -> AggregateKind {
        match self {
            Accumulator::Count(_) => AggregateKind::Count,
            Accumulator::Sum(_) => AggregateKind::Sum,
            Accumulator::Min(_) => AggregateKind::Min,
            Accumulator::Max(_) => AggregateKind::Max,
            Accumulator::Avg(_) => AggregateKind::Avg,
        }
    }

    /// Incorporate one record, reading `field` from it
    pub fn lift(&mut self, record: &Record, field: Option<&str>) -> AggregationResult<()> {
        let field = match (&mut *self, field) {
            (Accumulator::Count(acc), None) => {
                acc.increment();
                return Ok(());
            }
            (_, Some(field)) => field,
            (acc, None) => {
                return Err(AggregationError::MissingField {
                    field: format!("<input of {}>", acc.kind()),
                })
            }
        };

        let value = record
            .get(field)
            .ok_or_else(|| AggregationError::MissingField {
                field: field.to_string(),
            })?;
        self.lift_value(value)
    }

    /// Incorporate one value
    pub fn lift_value(&mut self, value: &Value) -> AggregationResult<()> {
        match self {
            Accumulator::Count(acc) => acc.lift(value),
            Accumulator::Sum(acc) => acc.lift(value),
            Accumulator::Min(acc) => acc.lift(value),
            Accumulator::Max(acc) => acc.lift(value),
            Accumulator::Avg(acc) => acc.lift(value),
        }
    }

    /// Merge another accumulator of the same kind into this one
    pub fn combine(&mut self, other: &Accumulator) -> AggregationResult<()> {
        match (self, other) {
            (Accumulator::Count(a), Accumulator::Count(b)) => a.combine(b),
            (Accumulator::Sum(a), Accumulator::Sum(b)) => a.combine(b),
            (Accumulator::Min(a), Accumulator::Min(b)) => a.combine(b),
            (Accumulator::Max(a), Accumulator::Max(b)) => a.combine(b),
            (Accumulator::Avg(a), Accumulator::Avg(b)) => a.combine(b),
            (a, b) => Err(AggregationError::IncompatibleAccumulators {
                left: a.kind().to_string(),
                right: b.kind().to_string(),
            }),
        }
    }

    pub fn lower(&self) -> Value {
        match self {
            Accumulator::Count(acc) => acc.lower(),
            Accumulator::Sum(acc) => acc.lower(),
            Accumulator::Min(acc) => acc.lower(),
            Accumulator::Max(acc) => acc.lower(),
            Accumulator::Avg(acc) => acc.lower(),
        }
    }

    pub fn check(&self) -> AggregationResult<()> {
        match self {
            Accumulator::Count(acc) => acc.check(),
            Accumulator::Sum(acc) => acc.check(),
            Accumulator::Min(acc) => acc.check(),
            Accumulator::Max(acc) => acc.check(),
            Accumulator::Avg(acc) => acc.check(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Accumulator::Count(acc) => acc.reset(),
            Accumulator::Sum(acc) => acc.reset(),
            Accumulator::Min(acc) => acc.reset(),
            Accumulator::Max(acc) => acc.reset(),
            Accumulator::Avg(acc) => acc.reset(),
        }
    }
}

/// All aggregates of one query, for one slice (and one key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorSet {
    accumulators: Vec<Accumulator>,
    records: u64,
}

impl AccumulatorSet {
    pub fn new(specs: &[AggregateSpec]) -> Self {
        Self {
            accumulators: specs.iter().map(|spec| Accumulator::new(spec.kind)).collect(),
            records: 0,
        }
    }

    /// Apply `lift` for every configured aggregate
    pub fn lift(&mut self, record: &Record, specs: &[AggregateSpec]) -> AggregationResult<()> {
        for (acc, spec) in self.accumulators.iter_mut().zip(specs) {
            acc.lift(record, spec.field.as_deref())?;
        }
        self.records += 1;
        Ok(())
    }

    pub fn combine(&mut self, other: &AccumulatorSet) -> AggregationResult<()> {
        if self.accumulators.len() != other.accumulators.len() {
            return Err(AggregationError::IncompatibleAccumulators {
                left: format!("{} aggregates", self.accumulators.len()),
                right: format!("{} aggregates", other.accumulators.len()),
            });
        }
        for (acc, other) in self.accumulators.iter_mut().zip(&other.accumulators) {
            acc.combine(other)?;
        }
        self.records += other.records;
        Ok(())
    }

    /// Produce `(output name, value)` pairs in configuration order
    ///
    /// Fails if a total does not fit its output type.
    pub fn lower(&self, specs: &[AggregateSpec]) -> AggregationResult<Vec<(String, Value)>> {
        self.accumulators
            .iter()
            .zip(specs)
            .map(|(acc, spec)| {
                acc.check()?;
                Ok((spec.output.clone(), acc.lower()))
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.accumulators.iter_mut().for_each(Accumulator::reset);
        self.records = 0;
    }

    /// Number of records lifted into this set
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}
