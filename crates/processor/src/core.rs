//! Core record processing traits
//!
//! This module provides the per-record extraction seams of the engine:
//! - TimeFunction: extracts the timestamp a record is windowed by
//! - KeyExtractor: extracts the grouping key of a record

use crate::error::{AggregationError, AggregationResult};
use chrono::Utc;
use slicestream_types::{GroupKey, KeyPart, Record, Timestamp};
use std::fmt::Debug;

/// Trait for extracting the windowing timestamp of a record
///
/// Event-time functions read a record field, ingestion-time functions capture
/// the wall clock at arrival.
pub trait TimeFunction: Send + Sync + Debug {
    /// Extract the record's timestamp
    fn timestamp(&self, record: &Record) -> AggregationResult<Timestamp>;
}

/// Reads the timestamp from an unsigned integer field (milliseconds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTimeFunction {
    field: String,
}

impl EventTimeFunction {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl TimeFunction for EventTimeFunction {
    fn timestamp(&self, record: &Record) -> AggregationResult<Timestamp> {
        let value = record
            .get(&self.field)
            .ok_or_else(|| AggregationError::MissingField {
                field: self.field.clone(),
            })?;

        value
            .as_u64()
            .map(Timestamp::new)
            .ok_or_else(|| AggregationError::TypeMismatch {
                expected: "non-negative integer timestamp".to_string(),
                actual: value.type_name().to_string(),
            })
    }
}

/// Stamps records with the wall-clock time of arrival
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestionTimeFunction;

impl TimeFunction for IngestionTimeFunction {
    fn timestamp(&self, _record: &Record) -> AggregationResult<Timestamp> {
        Ok(Timestamp::new(Utc::now().timestamp_millis().max(0) as u64))
    }
}

/// Trait for extracting grouping keys from records
pub trait KeyExtractor: Send + Sync + Debug {
    /// Extract the grouping key from the record
    fn extract_key(&self, record: &Record) -> AggregationResult<GroupKey>;
}

/// Builds a composite key from a list of fields
///
/// Missing fields contribute a null component. Float fields are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKeyExtractor {
    fields: Vec<String>,
}

impl FieldKeyExtractor {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl KeyExtractor for FieldKeyExtractor {
    fn extract_key(&self, record: &Record) -> AggregationResult<GroupKey> {
        let parts = self
            .fields
            .iter()
            .map(|field| match record.get(field) {
                Some(value) => KeyPart::try_from(value),
                None => Ok(KeyPart::Null),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GroupKey(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicestream_types::Value;

    #[test]
    fn test_event_time_function() {
        let time = EventTimeFunction::new("ts");

        let record = Record::new().with("ts", 42u64);
        assert_eq!(time.timestamp(&record).unwrap(), Timestamp::new(42));

        let record = Record::new().with("ts", 7i64);
        assert_eq!(time.timestamp(&record).unwrap(), Timestamp::new(7));
    }

    #[test]
    fn test_event_time_function_errors() {
        let time = EventTimeFunction::new("ts");

        let err = time.timestamp(&Record::new()).unwrap_err();
        assert!(matches!(err, AggregationError::MissingField { .. }));

        let err = time.timestamp(&Record::new().with("ts", -1i64)).unwrap_err();
        assert!(matches!(err, AggregationError::TypeMismatch { .. }));

        let err = time.timestamp(&Record::new().with("ts", "noon")).unwrap_err();
        assert!(matches!(err, AggregationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_ingestion_time_function() {
        let before = Utc::now().timestamp_millis() as u64;
        let ts = IngestionTimeFunction.timestamp(&Record::new()).unwrap();
        let after = Utc::now().timestamp_millis() as u64;

        assert!(ts.millis() >= before && ts.millis() <= after);
    }

    #[test]
    fn test_field_key_extractor() {
        let keys = FieldKeyExtractor::new(vec!["region".to_string(), "code".to_string()]);

        let record = Record::new().with("region", "eu").with("code", 200i64);
        let key = keys.extract_key(&record).unwrap();
        assert_eq!(
            key,
            GroupKey(vec![KeyPart::Text("eu".to_string()), KeyPart::Int(200)])
        );

        let key = keys.extract_key(&Record::new().with("region", "us")).unwrap();
        assert_eq!(key.parts()[1], KeyPart::Null);
    }

    #[test]
    fn test_field_key_extractor_rejects_floats() {
        let keys = FieldKeyExtractor::new(vec!["score".to_string()]);
        let err = keys
            .extract_key(&Record::new().with("score", Value::Float(0.5)))
            .unwrap_err();
        assert!(matches!(err, AggregationError::InvalidGroupKey(_)));
    }
}
