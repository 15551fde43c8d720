//! Lock-free sequence tracker for one origin
//!
//! Batches of an origin carry strictly increasing sequence numbers but may be
//! closed out of order by different workers. The tracker records arrivals in a
//! bounded log and advances the highest contiguous sequence number; the
//! watermark attached to that prefix is the origin's safe watermark.
//!
//! ```text
//! arrivals:   1   2   4   3
//! contiguous: 1   2   2   4
//! ```

use crate::error::{WatermarkError, WatermarkResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use slicestream_types::{ChunkNumber, OriginId, SequenceData, SequenceNumber, Timestamp};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// One log entry: the sequence number it holds and that sequence's watermark
#[derive(Debug, Default)]
struct LogSlot {
    sequence: AtomicU64,
    watermark: AtomicU64,
}

/// Chunks seen so far for a fragmented sequence number
#[derive(Debug, Default)]
struct ChunkProgress {
    seen: HashSet<ChunkNumber>,
    last_chunk: Option<ChunkNumber>,
    watermark: u64,
}

impl ChunkProgress {
    fn is_complete(&self) -> bool {
        matches!(self.last_chunk, Some(last) if self.seen.len() as u64 == last)
    }
}

/// Tracks the safe watermark of one origin
#[derive(Debug)]
pub struct SequenceTracker {
    origin: OriginId,
    log: Box<[LogSlot]>,
    /// Highest sequence number such that it and all lower ones were observed
    current_sequence: AtomicU64,
    /// Watermark of the contiguous prefix; never decreases
    watermark: AtomicU64,
    chunks: DashMap<SequenceNumber, ChunkProgress>,
    /// Sequences and chunks handed to a worker but not yet applied
    claims: DashMap<SequenceNumber, HashSet<ChunkNumber>>,
    /// Wall-clock millis of the last advance
    last_progress: AtomicI64,
}

impl SequenceTracker {
    /// Create a tracker whose log holds `tracking_window` out-of-order arrivals
    pub fn new(origin: OriginId, tracking_window: usize) -> Self {
        let window = tracking_window.max(1);
        let log = (0..window).map(|_| LogSlot::default()).collect();
        Self {
            origin,
            log,
            current_sequence: AtomicU64::new(0),
            watermark: AtomicU64::new(Timestamp::MIN.millis()),
            chunks: DashMap::new(),
            claims: DashMap::new(),
            last_progress: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn origin(&self) -> OriginId {
        self.origin
    }

    /// Size of the out-of-order log
    pub fn tracking_window(&self) -> usize {
        self.log.len()
    }

    /// Highest contiguous sequence number observed
    pub fn current_sequence(&self) -> SequenceNumber {
        self.current_sequence.load(Ordering::Acquire)
    }

    /// Current safe watermark
    pub fn current_watermark(&self) -> Timestamp {
        Timestamp::new(self.watermark.load(Ordering::Acquire))
    }

    /// Reserve `sequence` for processing before any of its records are lifted
    ///
    /// Each sequence (or chunk of one) can be claimed once; a repeated claim
    /// fails as stale even after the sequence was logged. Claims are released
    /// as the contiguous prefix moves past them.
    pub fn claim(&self, sequence: SequenceData) -> WatermarkResult<()> {
        let seq = sequence.sequence_number;
        let stale = |current| WatermarkError::StaleSequence {
            origin: self.origin,
            sequence: seq,
            current,
        };

        let current = self.current_sequence();
        if seq <= current || self.is_logged(seq) {
            return Err(stale(current));
        }
        if !self.claims.entry(seq).or_default().insert(sequence.chunk_number) {
            return Err(stale(current));
        }

        // The prefix may have moved past `seq` and released its claims
        // between the check and the insert.
        let current = self.current_sequence();
        if seq <= current {
            self.claims.remove(&seq);
            return Err(stale(current));
        }
        Ok(())
    }

    /// Record that `sequence` was fully processed with watermark `watermark`
    ///
    /// Returns the safe watermark after the update. Sequence numbers start at
    /// 1. A sequence more than `tracking_window` ahead of the contiguous
    /// prefix is rejected as backpressure; a sequence at or below the prefix,
    /// or one already logged above a gap, is rejected as stale.
    pub fn update(
        &self,
        sequence: SequenceData,
        watermark: Timestamp,
    ) -> WatermarkResult<Timestamp> {
        let seq = sequence.sequence_number;
        let current = self.current_sequence();

        if seq <= current || self.is_logged(seq) {
            return Err(WatermarkError::StaleSequence {
                origin: self.origin,
                sequence: seq,
                current,
            });
        }
        if seq - current > self.log.len() as u64 {
            return Err(WatermarkError::TrackingWindowExceeded {
                origin: self.origin,
                sequence: seq,
                current,
                window: self.log.len(),
            });
        }

        let watermark = if sequence.is_whole() {
            watermark.millis()
        } else {
            match self.record_chunk(sequence, watermark)? {
                Some(watermark) => watermark,
                None => return Ok(self.current_watermark()),
            }
        };

        let slot = &self.log[self.slot_of(seq)];
        slot.watermark.store(watermark, Ordering::Relaxed);
        slot.sequence.store(seq, Ordering::Release);

        self.advance();
        Ok(self.current_watermark())
    }

    /// Whether the origin made no progress for longer than `timeout`
    pub fn is_stalled(&self, timeout: Duration) -> bool {
        let timeout = ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::MAX);
        Utc::now().signed_duration_since(self.last_progress()) > timeout
    }

    /// Wall-clock instant of the last watermark advance (or creation)
    pub fn last_progress(&self) -> DateTime<Utc> {
        let millis = self.last_progress.load(Ordering::Relaxed);
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    /// Returns the sequence's watermark once its last outstanding chunk arrives
    fn record_chunk(
        &self,
        sequence: SequenceData,
        watermark: Timestamp,
    ) -> WatermarkResult<Option<u64>> {
        let invalid = |reason: &str| WatermarkError::InvalidChunk {
            origin: self.origin,
            sequence: sequence.sequence_number,
            chunk: sequence.chunk_number,
            reason: reason.to_string(),
        };

        if sequence.chunk_number == 0 {
            return Err(invalid("chunk numbers start at 1"));
        }

        let mut progress = self.chunks.entry(sequence.sequence_number).or_default();
        if let Some(last) = progress.last_chunk {
            if sequence.chunk_number > last {
                return Err(invalid("chunk is beyond the last chunk"));
            }
            if sequence.last_chunk {
                return Err(invalid("last chunk reported twice"));
            }
        }
        if !progress.seen.insert(sequence.chunk_number) {
            return Err(WatermarkError::StaleSequence {
                origin: self.origin,
                sequence: sequence.sequence_number,
                current: self.current_sequence(),
            });
        }
        if sequence.last_chunk {
            if progress.seen.iter().any(|chunk| *chunk > sequence.chunk_number) {
                return Err(invalid("earlier chunk is beyond the last chunk"));
            }
            progress.last_chunk = Some(sequence.chunk_number);
        }
        progress.watermark = progress.watermark.max(watermark.millis());

        if !progress.is_complete() {
            return Ok(None);
        }
        let watermark = progress.watermark;
        drop(progress);
        self.chunks.remove(&sequence.sequence_number);
        Ok(Some(watermark))
    }

    /// Move the contiguous prefix forward over every logged successor
    fn advance(&self) {
        loop {
            let current = self.current_sequence.load(Ordering::Acquire);
            let next = current + 1;
            let slot = &self.log[self.slot_of(next)];
            if slot.sequence.load(Ordering::Acquire) != next {
                break;
            }
            let watermark = slot.watermark.load(Ordering::Relaxed);

            if self
                .current_sequence
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let previous = self.watermark.fetch_max(watermark, Ordering::AcqRel);
                self.claims.remove(&next);
                self.last_progress
                    .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                trace!(
                    origin = %self.origin,
                    sequence = next,
                    watermark = previous.max(watermark),
                    "sequence applied"
                );
            }
        }
    }

    /// Whether `sequence` completed and waits in the log behind a gap
    fn is_logged(&self, sequence: SequenceNumber) -> bool {
        self.log[self.slot_of(sequence)]
            .sequence
            .load(Ordering::Acquire)
            == sequence
    }

    fn slot_of(&self, sequence: SequenceNumber) -> usize {
        (sequence % self.log.len() as u64) as usize
    }
}
