//! Prometheus metrics for the aggregation engine
//!
//! Every query owns its own [`MetricsRegistry`]; nothing is registered in a
//! process-wide singleton. Counters are cheap atomic handles that workers and
//! the merge thread update directly.

mod engine;
mod registry;

pub use engine::{EngineMetrics, EngineStats};
pub use registry::MetricsRegistry;

use thiserror::Error;

/// Errors that can occur in the metrics subsystem
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metric encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
