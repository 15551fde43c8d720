//! Window result rows

use crate::time::Timestamp;
use crate::values::{GroupKey, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One finalized window result row
///
/// Non-keyed windows produce one row per window with `key == None`; keyed
/// windows produce one row per distinct key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    /// Window start (inclusive)
    pub window_start: Timestamp,
    /// Window end (exclusive)
    pub window_end: Timestamp,
    /// Grouping key, for keyed windows
    pub key: Option<GroupKey>,
    /// Aggregate results, in configured order
    pub values: Vec<(String, Value)>,
}

impl WindowResult {
    /// Look up an aggregate result by output name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

impl fmt::Display for WindowResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.window_start.millis(), self.window_end.millis())?;
        if let Some(key) = &self.key {
            write!(f, " key={}", key)?;
        }
        for (name, value) in &self.values {
            write!(f, " {}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_display() {
        let row = WindowResult {
            window_start: Timestamp::new(0),
            window_end: Timestamp::new(10),
            key: Some(GroupKey::text("A")),
            values: vec![("total".to_string(), Value::Int(5))],
        };
        assert_eq!(row.get("total"), Some(&Value::Int(5)));
        assert!(row.get("other").is_none());
        assert_eq!(row.to_string(), "[0, 10) key=A total=5");
    }
}
