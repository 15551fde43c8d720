//! Configuration types for the aggregation engine
//!
//! This module provides configuration structures for windows, slice stores,
//! watermark tracking, aggregates, time functions and result buffers, plus
//! loading from YAML files layered with environment variables.

use crate::aggregation::{AggregateKind, AggregateSpec};
use crate::core::{EventTimeFunction, IngestionTimeFunction, TimeFunction};
use crate::error::{ProcessorError, Result};
use crate::window::{SliceAssigner, WindowType};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use slicestream_types::OriginId;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Prefix of environment variables overriding file configuration
pub const ENV_PREFIX: &str = "SLICESTREAM_";

/// Main processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Window configuration
    #[serde(default)]
    pub window: WindowConfig,

    /// Thread-local slice store configuration
    #[serde(default)]
    pub slice_store: SliceStoreConfig,

    /// Watermark configuration
    #[serde(default)]
    pub watermark: WatermarkConfig,

    /// Aggregation configuration
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Time function configuration
    #[serde(default)]
    pub time: TimeConfig,

    /// Result buffer configuration
    #[serde(default)]
    pub buffers: BufferConfig,

    /// Number of pre-aggregation worker threads
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Origins feeding the query
    #[serde(default = "default_origins")]
    pub origins: Vec<OriginId>,

    /// Capacity of each worker's input queue before backpressure
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Enable metrics collection
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            slice_store: SliceStoreConfig::default(),
            watermark: WatermarkConfig::default(),
            aggregation: AggregationConfig::default(),
            time: TimeConfig::default(),
            buffers: BufferConfig::default(),
            parallelism: default_parallelism(),
            origins: default_origins(),
            channel_capacity: default_channel_capacity(),
            metrics_enabled: true,
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from a YAML file and `SLICESTREAM_` environment variables
    ///
    /// Nested keys are separated by `__`, e.g. `SLICESTREAM_WINDOW__SIZE_MS`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Like [`ProcessorConfig::load`] with a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }

        // Override with environment variables
        figment = figment.merge(Env::prefixed(env_prefix).split("__"));

        let config: ProcessorConfig = figment
            .extract()
            .map_err(|e| ProcessorError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        self.watermark.validate()?;
        self.aggregation.validate()?;
        self.time.validate()?;
        self.buffers.validate()?;

        let required = self.window.min_slices();
        if (self.slice_store.number_of_slices as u64) < required {
            return Err(ProcessorError::Configuration {
                source: format!(
                    "slice_store.number_of_slices is {} but window size {}ms, slide {}ms and allowed lateness {}ms need at least {}",
                    self.slice_store.number_of_slices,
                    self.window.size_ms,
                    self.window.slide(),
                    self.window.allowed_lateness_ms,
                    required
                )
                .into(),
            });
        }

        if self.parallelism == 0 {
            return Err(ProcessorError::Configuration {
                source: "parallelism must be greater than 0".into(),
            });
        }

        if self.channel_capacity == 0 {
            return Err(ProcessorError::Configuration {
                source: "channel_capacity must be greater than 0".into(),
            });
        }

        if self.origins.is_empty() {
            return Err(ProcessorError::Configuration {
                source: "at least one origin is required".into(),
            });
        }
        let unique: HashSet<&OriginId> = self.origins.iter().collect();
        if unique.len() != self.origins.len() {
            return Err(ProcessorError::Configuration {
                source: "origins must be unique".into(),
            });
        }

        Ok(())
    }
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowConfig {
    /// Type of window
    pub window_type: WindowType,

    /// Window size in milliseconds
    pub size_ms: u64,

    /// Slide interval in milliseconds (sliding windows only)
    #[serde(default)]
    pub slide_ms: Option<u64>,

    /// How long a slice stays open after its end (milliseconds)
    #[serde(default)]
    pub allowed_lateness_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_type: WindowType::Tumbling,
            size_ms: 60_000, // 1 minute
            slide_ms: None,
            allowed_lateness_ms: default_allowed_lateness(),
        }
    }
}

impl WindowConfig {
    /// Create a tumbling window configuration
    pub fn tumbling(size_ms: u64) -> Self {
        Self {
            window_type: WindowType::Tumbling,
            size_ms,
            slide_ms: None,
            allowed_lateness_ms: 0,
        }
    }

    /// Create a sliding window configuration
    pub fn sliding(size_ms: u64, slide_ms: u64) -> Self {
        Self {
            window_type: WindowType::Sliding,
            size_ms,
            slide_ms: Some(slide_ms),
            allowed_lateness_ms: 0,
        }
    }

    /// Set the allowed lateness
    pub fn with_lateness(mut self, allowed_lateness_ms: u64) -> Self {
        self.allowed_lateness_ms = allowed_lateness_ms;
        self
    }

    /// Slice length: the slide for sliding windows, the size otherwise
    pub fn slide(&self) -> u64 {
        match self.window_type {
            WindowType::Tumbling => self.size_ms,
            WindowType::Sliding => self.slide_ms.unwrap_or(self.size_ms),
        }
    }

    /// Minimum slice store capacity for this window and lateness
    pub fn min_slices(&self) -> u64 {
        let slide = self.slide().max(1);
        (self.size_ms + self.allowed_lateness_ms).div_ceil(slide) + 1
    }

    /// Build the slice assigner for this window
    pub fn assigner(&self) -> Result<SliceAssigner> {
        let assigner = match self.window_type {
            WindowType::Tumbling => SliceAssigner::tumbling(self.size_ms)?,
            WindowType::Sliding => SliceAssigner::sliding(self.size_ms, self.slide())?,
        };
        Ok(assigner)
    }

    /// Validate window configuration
    pub fn validate(&self) -> Result<()> {
        if self.size_ms == 0 {
            return Err(ProcessorError::Configuration {
                source: format!("{} window size must be greater than 0", self.window_type).into(),
            });
        }
        if self.window_type == WindowType::Sliding {
            let slide = self.slide_ms.ok_or_else(|| ProcessorError::Configuration {
                source: "sliding window requires slide_ms".into(),
            })?;
            if slide > self.size_ms {
                return Err(ProcessorError::Configuration {
                    source: "sliding window slide must be less than or equal to size".into(),
                });
            }
        }
        self.assigner().map(|_| ())
    }
}

/// Thread-local slice store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SliceStoreConfig {
    /// Ring capacity of each worker's store
    #[serde(default = "default_number_of_slices")]
    pub number_of_slices: usize,
}

impl Default for SliceStoreConfig {
    fn default() -> Self {
        Self {
            number_of_slices: default_number_of_slices(),
        }
    }
}

/// Watermark tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatermarkConfig {
    /// Out-of-order sequence numbers each origin may have in flight
    #[serde(default = "default_tracking_window")]
    pub tracking_window: usize,

    /// An origin without progress for this long is reported as stalled
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_ms: u64,

    /// How often idle workers poll the global watermark
    #[serde(default = "default_idle_tick")]
    pub idle_tick_ms: u64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            tracking_window: default_tracking_window(),
            stall_timeout_ms: default_stall_timeout(),
            idle_tick_ms: default_idle_tick(),
        }
    }
}

impl WatermarkConfig {
    /// Get stall timeout as Duration
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Get idle tick as Duration
    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }

    /// Validate watermark configuration
    pub fn validate(&self) -> Result<()> {
        if self.tracking_window == 0 {
            return Err(ProcessorError::Configuration {
                source: "tracking_window must be greater than 0".into(),
            });
        }
        if self.idle_tick_ms == 0 {
            return Err(ProcessorError::Configuration {
                source: "idle_tick_ms must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

/// Aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregationConfig {
    /// Aggregates computed for every window
    #[serde(default = "default_aggregates")]
    pub aggregates: Vec<AggregateSpec>,

    /// Grouping fields; empty for non-keyed windows
    #[serde(default)]
    pub group_by: Vec<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            aggregates: default_aggregates(),
            group_by: Vec::new(),
        }
    }
}

impl AggregationConfig {
    /// Whether windows are keyed
    pub fn is_keyed(&self) -> bool {
        !self.group_by.is_empty()
    }

    /// Validate aggregation configuration
    pub fn validate(&self) -> Result<()> {
        if self.aggregates.is_empty() {
            return Err(ProcessorError::Configuration {
                source: "at least one aggregate is required".into(),
            });
        }

        let mut outputs = HashSet::new();
        for spec in &self.aggregates {
            if spec.kind != AggregateKind::Count && spec.field.is_none() {
                return Err(ProcessorError::Configuration {
                    source: format!("{} aggregate '{}' requires a field", spec.kind, spec.output)
                        .into(),
                });
            }
            if !outputs.insert(spec.output.as_str()) {
                return Err(ProcessorError::Configuration {
                    source: format!("duplicate aggregate output '{}'", spec.output).into(),
                });
            }
        }
        Ok(())
    }
}

/// Where record timestamps come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeConfig {
    /// Read the timestamp from a record field
    EventTime { field: String },
    /// Stamp records on arrival
    IngestionTime,
}

impl Default for TimeConfig {
    fn default() -> Self {
        TimeConfig::EventTime {
            field: "timestamp".to_string(),
        }
    }
}

impl TimeConfig {
    /// Build the configured time function
    pub fn time_function(&self) -> Arc<dyn TimeFunction> {
        match self {
            TimeConfig::EventTime { field } => Arc::new(EventTimeFunction::new(field.clone())),
            TimeConfig::IngestionTime => Arc::new(IngestionTimeFunction),
        }
    }

    /// Validate time configuration
    pub fn validate(&self) -> Result<()> {
        if let TimeConfig::EventTime { field } = self {
            if field.is_empty() {
                return Err(ProcessorError::Configuration {
                    source: "event time field must not be empty".into(),
                });
            }
        }
        Ok(())
    }
}

/// Result buffer pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufferConfig {
    /// Size of one region in bytes
    #[serde(default = "default_region_size")]
    pub region_size: usize,

    /// Number of regions in the pool
    #[serde(default = "default_regions")]
    pub regions: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            region_size: default_region_size(),
            regions: default_regions(),
        }
    }
}

impl BufferConfig {
    /// Validate buffer configuration
    pub fn validate(&self) -> Result<()> {
        if self.region_size == 0 || self.regions == 0 {
            return Err(ProcessorError::Configuration {
                source: "buffer region_size and regions must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_parallelism() -> usize {
    num_cpus::get()
}

fn default_origins() -> Vec<OriginId> {
    vec![OriginId(0)]
}

fn default_channel_capacity() -> usize {
    1_024
}

fn default_allowed_lateness() -> u64 {
    5_000 // 5 seconds
}

fn default_number_of_slices() -> usize {
    50
}

fn default_tracking_window() -> usize {
    100
}

fn default_stall_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_idle_tick() -> u64 {
    50
}

fn default_aggregates() -> Vec<AggregateSpec> {
    vec![AggregateSpec::count("count")]
}

fn default_region_size() -> usize {
    64 * 1024
}

fn default_regions() -> usize {
    64
}
