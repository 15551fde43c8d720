//! Fluent builder for windowed aggregation queries
//!
//! The builder assembles a [`ProcessorConfig`] plus optional custom time and
//! key functions, then starts the query.

use super::context::QueryContext;
use super::executor::{Engine, QueryHandle};
use super::lifecycle::{LoggingLifecycle, QueryLifecycle};
use crate::aggregation::AggregateSpec;
use crate::config::{ProcessorConfig, TimeConfig, WindowConfig};
use crate::core::{KeyExtractor, TimeFunction};
use crate::error::{ProcessorError, Result};
use crate::sink::WindowSink;
use slicestream_types::OriginId;
use std::sync::Arc;
use std::time::Duration;

/// Builder for a windowed aggregation query
///
/// # Example
///
/// ```rust,no_run
/// use slicestream_processor::aggregation::AggregateSpec;
/// use slicestream_processor::pipeline::QueryBuilder;
/// use slicestream_processor::sink::CollectingSink;
/// use std::sync::Arc;
///
/// # fn example() -> slicestream_processor::error::Result<()> {
/// let sink = CollectingSink::new();
/// let query = QueryBuilder::new()
///     .with_tumbling_window(60_000)
///     .with_allowed_lateness(5_000)
///     .with_parallelism(4)
///     .with_aggregate(AggregateSpec::count("requests"))
///     .with_aggregate(AggregateSpec::avg("latency_ms", "avg_latency_ms"))
///     .with_group_by(["model"])
///     .with_sink(Arc::new(sink.clone()))
///     .start()?;
///
/// let stats = query.stop()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct QueryBuilder {
    config: ProcessorConfig,
    aggregates: Vec<AggregateSpec>,
    time_function: Option<Arc<dyn TimeFunction>>,
    key_extractor: Option<Arc<dyn KeyExtractor>>,
    sink: Option<Arc<dyn WindowSink>>,
    lifecycle: Option<Arc<dyn QueryLifecycle>>,
}

impl QueryBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: ProcessorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Set the window configuration
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        let lateness = self.config.window.allowed_lateness_ms;
        self.config.window = window;
        if self.config.window.allowed_lateness_ms == 0 {
            self.config.window.allowed_lateness_ms = lateness;
        }
        self
    }

    pub fn with_tumbling_window(self, size_ms: u64) -> Self {
        self.with_window(WindowConfig::tumbling(size_ms))
    }

    pub fn with_sliding_window(self, size_ms: u64, slide_ms: u64) -> Self {
        self.with_window(WindowConfig::sliding(size_ms, slide_ms))
    }

    pub fn with_allowed_lateness(mut self, lateness_ms: u64) -> Self {
        self.config.window.allowed_lateness_ms = lateness_ms;
        self
    }

    /// Set the ring capacity of each worker's slice store
    pub fn with_slice_capacity(mut self, number_of_slices: usize) -> Self {
        self.config.slice_store.number_of_slices = number_of_slices;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.config.parallelism = parallelism;
        self
    }

    /// Set the origins that will feed the query
    pub fn with_origins<I>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = OriginId>,
    {
        self.config.origins = origins.into_iter().collect();
        self
    }

    pub fn with_tracking_window(mut self, tracking_window: usize) -> Self {
        self.config.watermark.tracking_window = tracking_window;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.config.watermark.stall_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_idle_tick(mut self, tick: Duration) -> Self {
        self.config.watermark.idle_tick_ms = (tick.as_millis() as u64).max(1);
        self
    }

    /// Add an aggregate; the first call replaces the default count
    pub fn with_aggregate(mut self, spec: AggregateSpec) -> Self {
        self.aggregates.push(spec);
        self
    }

    /// Group results by the given record fields
    pub fn with_group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.aggregation.group_by = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Read event time from a record field
    pub fn with_event_time(mut self, field: impl Into<String>) -> Self {
        self.config.time = TimeConfig::EventTime {
            field: field.into(),
        };
        self
    }

    /// Stamp records with the wall clock on arrival
    pub fn with_ingestion_time(mut self) -> Self {
        self.config.time = TimeConfig::IngestionTime;
        self
    }

    pub fn with_time_function(mut self, time_function: Arc<dyn TimeFunction>) -> Self {
        self.time_function = Some(time_function);
        self
    }

    pub fn with_key_extractor(mut self, key_extractor: Arc<dyn KeyExtractor>) -> Self {
        self.key_extractor = Some(key_extractor);
        self
    }

    pub fn with_buffers(mut self, region_size: usize, regions: usize) -> Self {
        self.config.buffers.region_size = region_size;
        self.config.buffers.regions = regions;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.config.metrics_enabled = enabled;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn WindowSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn QueryLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// The configuration assembled so far
    pub fn config(&self) -> ProcessorConfig {
        let mut config = self.config.clone();
        if !self.aggregates.is_empty() {
            config.aggregation.aggregates = self.aggregates.clone();
        }
        config
    }

    /// Validate the configuration and start the query
    pub fn start(self) -> Result<QueryHandle> {
        let config = self.config();
        let sink = self
            .sink
            .ok_or_else(|| ProcessorError::configuration("a sink is required"))?;
        let lifecycle = self
            .lifecycle
            .unwrap_or_else(|| Arc::new(LoggingLifecycle) as Arc<dyn QueryLifecycle>);

        let engine = Engine::new(config)?;
        let mut context = QueryContext::from_config(engine.config())?;
        if let Some(time_function) = self.time_function {
            context = context.with_time_function(time_function);
        }
        if let Some(key_extractor) = self.key_extractor {
            context = context.with_key_extractor(key_extractor);
        }
        engine.start_with_context(context, sink, lifecycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggregateKind;
    use crate::window::WindowType;
    use crate::sink::CollectingSink;

    #[test]
    fn test_builder_default() {
        let config = QueryBuilder::new().config();
        assert_eq!(config.window.window_type, WindowType::Tumbling);
        assert_eq!(config.aggregation.aggregates.len(), 1);
    }

    #[test]
    fn test_builder_window_keeps_lateness() {
        let config = QueryBuilder::new()
            .with_allowed_lateness(2_000)
            .with_sliding_window(10_000, 1_000)
            .config();

        assert_eq!(config.window.window_type, WindowType::Sliding);
        assert_eq!(config.window.slide(), 1_000);
        assert_eq!(config.window.allowed_lateness_ms, 2_000);
    }

    #[test]
    fn test_builder_aggregates_replace_default() {
        let config = QueryBuilder::new()
            .with_aggregate(AggregateSpec::sum("bytes", "total_bytes"))
            .with_aggregate(AggregateSpec::max("latency", "max_latency"))
            .config();

        let kinds: Vec<AggregateKind> = config
            .aggregation
            .aggregates
            .iter()
            .map(|spec| spec.kind)
            .collect();
        assert_eq!(kinds, vec![AggregateKind::Sum, AggregateKind::Max]);
    }

    #[test]
    fn test_builder_requires_sink() {
        let err = QueryBuilder::new().with_parallelism(1).start().unwrap_err();
        assert!(err.to_string().contains("sink is required"));
    }

    #[test]
    fn test_builder_rejects_invalid_capacity() {
        let err = QueryBuilder::new()
            .with_tumbling_window(1_000)
            .with_allowed_lateness(10_000)
            .with_slice_capacity(4)
            .with_sink(Arc::new(CollectingSink::new()))
            .start()
            .unwrap_err();
        assert!(err.to_string().contains("number_of_slices"));
    }

    #[test]
    fn test_builder_starts_query() {
        let handle = QueryBuilder::new()
            .with_tumbling_window(100)
            .with_allowed_lateness(0)
            .with_parallelism(2)
            .with_idle_tick(Duration::from_millis(5))
            .with_sink(Arc::new(CollectingSink::new()))
            .start()
            .unwrap();

        assert_eq!(handle.parallelism(), 2);
        handle.stop().unwrap();
    }
}
