//! Watermark processor over a fixed set of origins

use super::tracker::SequenceTracker;
use crate::error::{WatermarkError, WatermarkResult};
use slicestream_types::{OriginId, SequenceData, Timestamp};
use std::collections::HashMap;
use std::time::Duration;

/// Combines the safe watermarks of all origins of a query
///
/// The global watermark is the minimum over all origins, so it cannot pass an
/// origin that is still behind. The origin set is fixed at construction.
#[derive(Debug)]
pub struct WatermarkProcessor {
    trackers: HashMap<OriginId, SequenceTracker>,
}

impl WatermarkProcessor {
    /// Create a processor tracking `origins`
    pub fn new(origins: &[OriginId], tracking_window: usize) -> Self {
        let trackers = origins
            .iter()
            .map(|origin| (*origin, SequenceTracker::new(*origin, tracking_window)))
            .collect();
        Self { trackers }
    }

    /// Record a processed batch and return the new global watermark
    pub fn update_watermark(
        &self,
        origin: OriginId,
        sequence: SequenceData,
        watermark: Timestamp,
    ) -> WatermarkResult<Timestamp> {
        self.tracker(origin)?.update(sequence, watermark)?;
        Ok(self.current_watermark())
    }

    /// Minimum safe watermark across all origins
    pub fn current_watermark(&self) -> Timestamp {
        self.trackers
            .values()
            .map(SequenceTracker::current_watermark)
            .min()
            .unwrap_or(Timestamp::MIN)
    }

    /// Safe watermark of a single origin
    pub fn origin_watermark(&self, origin: OriginId) -> WatermarkResult<Timestamp> {
        Ok(self.tracker(origin)?.current_watermark())
    }

    pub fn tracker(&self, origin: OriginId) -> WatermarkResult<&SequenceTracker> {
        self.trackers
            .get(&origin)
            .ok_or(WatermarkError::UnknownOrigin { origin })
    }

    /// Known origins, sorted
    pub fn origins(&self) -> Vec<OriginId> {
        let mut origins: Vec<OriginId> = self.trackers.keys().copied().collect();
        origins.sort();
        origins
    }

    /// Origins without watermark progress for longer than `timeout`
    pub fn stalled_origins(&self, timeout: Duration) -> Vec<OriginId> {
        let mut stalled: Vec<OriginId> = self
            .trackers
            .values()
            .filter(|tracker| tracker.is_stalled(timeout))
            .map(SequenceTracker::origin)
            .collect();
        stalled.sort();
        stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(millis: u64) -> Timestamp {
        Timestamp::new(millis)
    }

    #[test]
    fn test_single_origin() {
        let processor = WatermarkProcessor::new(&[OriginId(0)], 10);

        for seq in 1..=5 {
            let wm = processor
                .update_watermark(OriginId(0), SequenceData::new(seq), ts(seq * 10))
                .unwrap();
            assert_eq!(wm, ts(seq * 10));
        }
    }

    #[test]
    fn test_minimum_across_origins() {
        let processor = WatermarkProcessor::new(&[OriginId(0), OriginId(1)], 10);

        let wm = processor
            .update_watermark(OriginId(0), SequenceData::new(1), ts(100))
            .unwrap();
        assert_eq!(wm, ts(0));

        let wm = processor
            .update_watermark(OriginId(1), SequenceData::new(1), ts(40))
            .unwrap();
        assert_eq!(wm, ts(40));
        assert_eq!(processor.origin_watermark(OriginId(0)).unwrap(), ts(100));

        let wm = processor
            .update_watermark(OriginId(1), SequenceData::new(2), ts(200))
            .unwrap();
        assert_eq!(wm, ts(100));
    }

    #[test]
    fn test_interleaved_out_of_order_origins() {
        let processor = WatermarkProcessor::new(&[OriginId(1), OriginId(2)], 10);

        processor
            .update_watermark(OriginId(1), SequenceData::new(2), ts(20))
            .unwrap();
        processor
            .update_watermark(OriginId(2), SequenceData::new(1), ts(10))
            .unwrap();
        assert_eq!(processor.current_watermark(), ts(0));

        let wm = processor
            .update_watermark(OriginId(1), SequenceData::new(1), ts(10))
            .unwrap();
        assert_eq!(wm, ts(10));
    }

    #[test]
    fn test_unknown_origin() {
        let processor = WatermarkProcessor::new(&[OriginId(0)], 10);
        let err = processor
            .update_watermark(OriginId(9), SequenceData::new(1), ts(1))
            .unwrap_err();
        assert_eq!(err, WatermarkError::UnknownOrigin { origin: OriginId(9) });
    }

    #[test]
    fn test_stalled_origins() {
        let processor = WatermarkProcessor::new(&[OriginId(0), OriginId(1)], 10);
        std::thread::sleep(Duration::from_millis(100));

        processor
            .update_watermark(OriginId(1), SequenceData::new(1), ts(1))
            .unwrap();
        assert_eq!(
            processor.stalled_origins(Duration::from_millis(50)),
            vec![OriginId(0)]
        );
        assert_eq!(processor.origins(), vec![OriginId(0), OriginId(1)]);
    }
}
