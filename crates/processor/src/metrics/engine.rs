//! Engine counters and gauges

use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};

/// Counters and gauges of one running query
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    pub records_processed: Counter,
    pub late_records_dropped: Counter,
    pub slices_created: Counter,
    pub merge_tasks_emitted: Counter,
    pub duplicate_merge_signals: Counter,
    pub slices_merged: Counter,
    pub windows_emitted: Counter,
    pub slices_discarded: Counter,
    pub global_watermark: Gauge,
    pub pending_merges: Gauge,
    pub stalled_origins: Gauge,
}

impl EngineMetrics {
    /// Register every metric in `registry`
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "records_processed",
            "Records lifted into slices",
            self.records_processed.clone(),
        );
        registry.register(
            "late_records_dropped",
            "Records dropped because their slice was already final",
            self.late_records_dropped.clone(),
        );
        registry.register(
            "slices_created",
            "Slices created or reset in thread-local stores",
            self.slices_created.clone(),
        );
        registry.register(
            "merge_tasks_emitted",
            "Slice merge tasks sent to the merge coordinator",
            self.merge_tasks_emitted.clone(),
        );
        registry.register(
            "duplicate_merge_signals",
            "Re-delivered merge tasks that were ignored",
            self.duplicate_merge_signals.clone(),
        );
        registry.register(
            "slices_merged",
            "Slices whose partial states were combined",
            self.slices_merged.clone(),
        );
        registry.register(
            "windows_emitted",
            "Window result rows emitted downstream",
            self.windows_emitted.clone(),
        );
        registry.register(
            "slices_discarded",
            "Slices dropped at shutdown before becoming final",
            self.slices_discarded.clone(),
        );
        registry.register(
            "global_watermark",
            "Minimum safe watermark across all origins",
            self.global_watermark.clone(),
        );
        registry.register(
            "pending_merges",
            "Slices waiting for all workers to report",
            self.pending_merges.clone(),
        );
        registry.register(
            "stalled_origins",
            "Origins without watermark progress",
            self.stalled_origins.clone(),
        );
    }

    /// Point-in-time copy of all values
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            records_processed: self.records_processed.get(),
            late_records_dropped: self.late_records_dropped.get(),
            slices_created: self.slices_created.get(),
            merge_tasks_emitted: self.merge_tasks_emitted.get(),
            duplicate_merge_signals: self.duplicate_merge_signals.get(),
            slices_merged: self.slices_merged.get(),
            windows_emitted: self.windows_emitted.get(),
            slices_discarded: self.slices_discarded.get(),
            global_watermark: self.global_watermark.get().max(0) as u64,
            pending_merges: self.pending_merges.get().max(0) as u64,
            stalled_origins: self.stalled_origins.get().max(0) as u64,
        }
    }
}

/// Statistics snapshot of a query
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Records lifted into slices
    pub records_processed: u64,

    /// Late records dropped
    pub late_records_dropped: u64,

    /// Slices created across all workers
    pub slices_created: u64,

    /// Merge tasks sent by workers
    pub merge_tasks_emitted: u64,

    /// Duplicate merge signals ignored
    pub duplicate_merge_signals: u64,

    /// Slices merged
    pub slices_merged: u64,

    /// Window rows emitted
    pub windows_emitted: u64,

    /// Slices discarded at shutdown
    pub slices_discarded: u64,

    /// Current global watermark
    pub global_watermark: u64,

    /// Slices waiting for merge
    pub pending_merges: u64,

    /// Origins currently considered stalled
    pub stalled_origins: u64,
}

impl EngineStats {
    /// Records per second over `elapsed_seconds`
    pub fn records_per_second(&self, elapsed_seconds: f64) -> f64 {
        if elapsed_seconds > 0.0 {
            self.records_processed as f64 / elapsed_seconds
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = EngineMetrics::default();
        metrics.records_processed.inc_by(10);
        metrics.late_records_dropped.inc();
        metrics.global_watermark.set(25);

        let stats = metrics.snapshot();
        assert_eq!(stats.records_processed, 10);
        assert_eq!(stats.late_records_dropped, 1);
        assert_eq!(stats.global_watermark, 25);
        assert_eq!(stats.windows_emitted, 0);
    }

    #[test]
    fn test_clones_share_values() {
        let metrics = EngineMetrics::default();
        let worker_handle = metrics.clone();
        worker_handle.slices_created.inc();

        assert_eq!(metrics.snapshot().slices_created, 1);
    }

    #[test]
    fn test_records_per_second() {
        let stats = EngineStats {
            records_processed: 500,
            ..Default::default()
        };
        assert_eq!(stats.records_per_second(2.0), 250.0);
        assert_eq!(stats.records_per_second(0.0), 0.0);
    }

    #[test]
    fn test_stats_serialization() {
        let stats = EngineStats {
            windows_emitted: 4,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        let back: EngineStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
