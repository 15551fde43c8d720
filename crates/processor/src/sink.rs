//! Downstream sinks for window results

use crate::buffer::ResultBuffer;
use crate::error::{ProcessorError, Result};
use parking_lot::Mutex;
use slicestream_types::WindowResult;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives finalized window results
///
/// Called from the merge thread. Implementations must not block for long;
/// buffering is the sink's responsibility.
pub trait WindowSink: Send + Sync + Debug {
    /// Accept one buffer of encoded result rows
    fn emit(&self, buffer: ResultBuffer) -> Result<()>;
}

/// Sink that decodes and keeps every row in memory
///
/// Buffers are released as soon as they are decoded.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    results: Arc<Mutex<Vec<WindowResult>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows received so far
    pub fn results(&self) -> Vec<WindowResult> {
        self.results.lock().clone()
    }

    /// Take all rows received so far
    pub fn drain(&self) -> Vec<WindowResult> {
        std::mem::take(&mut *self.results.lock())
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WindowSink for CollectingSink {
    fn emit(&self, buffer: ResultBuffer) -> Result<()> {
        let rows = buffer.decode()?;
        self.results.lock().extend(rows);
        Ok(())
    }
}

/// Sink that forwards buffers to an async consumer
///
/// The consumer holds each region until it drops the buffer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ResultBuffer>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResultBuffer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl WindowSink for ChannelSink {
    fn emit(&self, buffer: ResultBuffer) -> Result<()> {
        self.tx
            .send(buffer)
            .map_err(|_| ProcessorError::execution("window result receiver was dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{encode_results, BufferPool};
    use slicestream_types::{Timestamp, Value};

    fn rows() -> Vec<WindowResult> {
        vec![WindowResult {
            window_start: Timestamp::new(0),
            window_end: Timestamp::new(10),
            key: None,
            values: vec![("count".to_string(), Value::UInt(8))],
        }]
    }

    #[test]
    fn test_collecting_sink_releases_regions() {
        let pool = BufferPool::new(1024, 1);
        let sink = CollectingSink::new();

        for buffer in encode_results(&pool, &rows()).unwrap() {
            sink.emit(buffer).unwrap();
        }

        assert_eq!(sink.results(), rows());
        assert_eq!(pool.available(), 1);
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_buffers() {
        let pool = BufferPool::new(1024, 2);
        let (sink, mut rx) = ChannelSink::new();

        for buffer in encode_results(&pool, &rows()).unwrap() {
            sink.emit(buffer).unwrap();
        }
        // The region stays in use until the consumer drops it
        assert_eq!(pool.available(), 1);

        let buffer = rx.recv().await.unwrap();
        assert_eq!(buffer.decode().unwrap(), rows());
        drop(buffer);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_channel_sink_closed_receiver() {
        let pool = BufferPool::new(1024, 1);
        let (sink, rx) = ChannelSink::new();
        drop(rx);

        let buffer = encode_results(&pool, &rows()).unwrap().remove(0);
        assert!(sink.emit(buffer).is_err());
        assert_eq!(pool.available(), 1);
    }
}
