//! Per-query metrics registry
//!
//! Wraps a prometheus-client registry behind a lock so it can be shared
//! between the query handle and scrapers.

use super::engine::EngineMetrics;
use parking_lot::RwLock;
use prometheus_client::registry::Registry;
use std::borrow::Cow;
use std::sync::Arc;

/// Thread-safe registry for Prometheus metrics
pub struct MetricsRegistry {
    registry: Arc<RwLock<Registry>>,
}

impl MetricsRegistry {
    /// Create an empty registry with the `slicestream` prefix
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::with_prefix("slicestream"))),
        }
    }

    /// Create a registry exposing `metrics` labelled with the query id
    pub fn for_query(query: &str, metrics: &EngineMetrics) -> Self {
        let registry = Self::new();
        {
            let mut inner = registry.registry.write();
            let scoped = inner.sub_registry_with_label((
                Cow::Borrowed("query"),
                Cow::Owned(query.to_string()),
            ));
            metrics.register(scoped);
        }
        registry
    }

    /// Get a reference to the internal registry
    pub fn registry(&self) -> Arc<RwLock<Registry>> {
        self.registry.clone()
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, crate::metrics::MetricsError> {
        let registry = self.registry.read();
        let mut buffer = String::new();

        prometheus_client::encoding::text::encode(&mut buffer, &registry)
            .map_err(|e| crate::metrics::MetricsError::EncodingError(e.to_string()))?;

        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsRegistry {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}
