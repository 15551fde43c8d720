//! Error types for the shared value types

use thiserror::Error;

/// Result type alias for value conversions
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors raised while converting values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("value of type {type_name} cannot be used as a grouping key")]
    UnhashableKey { type_name: &'static str },
}
