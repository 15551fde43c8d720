//! Per-query execution context
//!
//! Everything a worker or the merge coordinator needs to know about a query
//! lives here and is shared through an `Arc`. Nothing is global: two queries
//! in the same process have separate contexts, watermarks and metrics.

use crate::aggregation::AggregateSpec;
use crate::config::ProcessorConfig;
use crate::core::{FieldKeyExtractor, KeyExtractor, TimeFunction};
use crate::error::Result;
use crate::metrics::EngineMetrics;
use crate::slice::SliceState;
use crate::watermark::WatermarkProcessor;
use crate::window::SliceAssigner;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier of a running query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared, immutable description of a query plus its watermark state
#[derive(Debug)]
pub struct QueryContext {
    id: QueryId,
    assigner: SliceAssigner,
    allowed_lateness: u64,
    specs: Vec<AggregateSpec>,
    key_extractor: Option<Arc<dyn KeyExtractor>>,
    time_function: Arc<dyn TimeFunction>,
    store_capacity: usize,
    watermarks: WatermarkProcessor,
    metrics: EngineMetrics,
}

impl QueryContext {
    /// Build a context from a validated configuration
    pub fn from_config(config: &ProcessorConfig) -> Result<Self> {
        config.validate()?;

        let key_extractor: Option<Arc<dyn KeyExtractor>> = if config.aggregation.is_keyed() {
            Some(Arc::new(FieldKeyExtractor::new(
                config.aggregation.group_by.clone(),
            )))
        } else {
            None
        };

        Ok(Self {
            id: QueryId::new(),
            assigner: config.window.assigner()?,
            allowed_lateness: config.window.allowed_lateness_ms,
            specs: config.aggregation.aggregates.clone(),
            key_extractor,
            time_function: config.time.time_function(),
            store_capacity: config.slice_store.number_of_slices,
            watermarks: WatermarkProcessor::new(
                &config.origins,
                config.watermark.tracking_window,
            ),
            metrics: EngineMetrics::default(),
        })
    }

    /// Replace the time function derived from the configuration
    pub fn with_time_function(mut self, time_function: Arc<dyn TimeFunction>) -> Self {
        self.time_function = time_function;
        self
    }

    /// Replace the key extractor derived from the configuration
    pub fn with_key_extractor(mut self, key_extractor: Arc<dyn KeyExtractor>) -> Self {
        self.key_extractor = Some(key_extractor);
        self
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn assigner(&self) -> &SliceAssigner {
        &self.assigner
    }

    /// Allowed lateness in milliseconds
    pub fn allowed_lateness(&self) -> u64 {
        self.allowed_lateness
    }

    pub fn specs(&self) -> &[AggregateSpec] {
        &self.specs
    }

    pub fn key_extractor(&self) -> Option<&Arc<dyn KeyExtractor>> {
        self.key_extractor.as_ref()
    }

    pub fn is_keyed(&self) -> bool {
        self.key_extractor.is_some()
    }

    pub fn time_function(&self) -> &Arc<dyn TimeFunction> {
        &self.time_function
    }

    /// Ring capacity of each worker's slice store
    pub fn store_capacity(&self) -> usize {
        self.store_capacity
    }

    pub fn watermarks(&self) -> &WatermarkProcessor {
        &self.watermarks
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Empty slice state shaped for this query
    pub fn empty_state(&self) -> SliceState {
        SliceState::new(&self.specs, self.is_keyed())
    }
}
