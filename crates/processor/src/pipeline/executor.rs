//! Query runtime
//!
//! [`Engine::start`] spawns one thread per worker, each owning a
//! [`PreAggregationOperator`], plus a single merge thread driving the
//! [`MergeCoordinator`]. Batches reach workers over bounded channels, so a
//! slow query pushes back on its producer. Workers talk to the merge thread
//! over one FIFO channel: merge tasks always precede the progress report
//! that covers them.
//!
//! Idle workers wake up every `idle_tick` to pick up global watermark
//! progress made by other workers, so a worker without input never holds
//! the merge back.

use super::context::{QueryContext, QueryId};
use super::lifecycle::QueryLifecycle;
use super::merge::MergeCoordinator;
use super::operator::PreAggregationOperator;
use super::task::MergeMessage;
use crate::buffer::{encode_results, BufferPool};
use crate::config::ProcessorConfig;
use crate::error::{BufferError, ProcessorError, Result, WatermarkError};
use crate::metrics::{EngineStats, MetricsRegistry};
use crate::sink::WindowSink;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use slicestream_types::{OriginId, RecordBatch, SequenceData, Timestamp, WindowResult, WorkerId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Run state of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Running,
    Stopping,
    Failed,
    Stopped,
}

impl QueryStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => QueryStatus::Running,
            1 => QueryStatus::Stopping,
            2 => QueryStatus::Failed,
            _ => QueryStatus::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            QueryStatus::Running => 0,
            QueryStatus::Stopping => 1,
            QueryStatus::Failed => 2,
            QueryStatus::Stopped => 3,
        }
    }
}

/// State shared by the handle and every query thread
#[derive(Debug)]
struct SharedState {
    status: AtomicU8,
    failure: Mutex<Option<String>>,
    workers: usize,
    /// Shutdown rendezvous arrivals, summed over all phases
    arrivals: AtomicUsize,
}

impl SharedState {
    fn new(workers: usize) -> Self {
        Self {
            status: AtomicU8::new(QueryStatus::Running.as_u8()),
            failure: Mutex::new(None),
            workers,
            arrivals: AtomicUsize::new(0),
        }
    }

    /// Wait until every worker reached shutdown phase `phase` (1-based)
    ///
    /// Returns false if the query failed while waiting.
    fn rendezvous(&self, phase: usize, tick: Duration) -> bool {
        self.arrivals.fetch_add(1, Ordering::AcqRel);
        while self.arrivals.load(Ordering::Acquire) < phase * self.workers {
            if self.is_failed() {
                return false;
            }
            thread::sleep(tick);
        }
        !self.is_failed()
    }

    fn status(&self) -> QueryStatus {
        QueryStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: QueryStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    fn is_failed(&self) -> bool {
        self.status() == QueryStatus::Failed
    }

    /// Record the first fatal error; later ones are only logged
    fn fail(&self, reason: String) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(reason);
        }
        self.set_status(QueryStatus::Failed);
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

/// Starts queries from a validated configuration
#[derive(Debug, Clone)]
pub struct Engine {
    config: ProcessorConfig,
}

impl Engine {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Start a query delivering results to `sink`
    pub fn start(
        &self,
        sink: Arc<dyn WindowSink>,
        lifecycle: Arc<dyn QueryLifecycle>,
    ) -> Result<QueryHandle> {
        let context = QueryContext::from_config(&self.config)?;
        self.start_with_context(context, sink, lifecycle)
    }

    /// Start a query with a prepared context
    pub fn start_with_context(
        &self,
        context: QueryContext,
        sink: Arc<dyn WindowSink>,
        lifecycle: Arc<dyn QueryLifecycle>,
    ) -> Result<QueryHandle> {
        let context = Arc::new(context);
        let query = context.id();
        lifecycle.on_setup(query)?;

        let registry = if self.config.metrics_enabled {
            MetricsRegistry::for_query(&query.to_string(), context.metrics())
        } else {
            MetricsRegistry::new()
        };

        let parallelism = self.config.parallelism;
        let shared = Arc::new(SharedState::new(parallelism));
        let idle_tick = self.config.watermark.idle_tick();
        let stall_timeout = self.config.watermark.stall_timeout();

        let (merge_tx, merge_rx) = unbounded();
        let merge = MergeLoop {
            coordinator: MergeCoordinator::new(context.clone(), parallelism),
            context: context.clone(),
            input: merge_rx,
            sink,
            lifecycle: lifecycle.clone(),
            pool: BufferPool::new(self.config.buffers.region_size, self.config.buffers.regions),
            shared: shared.clone(),
            idle_tick,
            stall_timeout,
        };
        let merger = thread::Builder::new()
            .name(format!("slicestream-merge-{}", query))
            .spawn(move || merge.run())
            .map_err(|e| ProcessorError::Execution { source: Box::new(e) })?;

        let mut inputs = Vec::with_capacity(parallelism);
        let mut workers = Vec::with_capacity(parallelism);
        for index in 0..parallelism {
            let (tx, rx) = bounded(self.config.channel_capacity);
            let worker = WorkerLoop {
                operator: PreAggregationOperator::new(WorkerId(index), context.clone()),
                context: context.clone(),
                input: rx,
                merge: merge_tx.clone(),
                shared: shared.clone(),
                idle_tick,
                deferred: VecDeque::new(),
                reported: Timestamp::MIN,
            };
            let spawned = thread::Builder::new()
                .name(format!("slicestream-worker-{}", index))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => {
                    inputs.push(tx);
                    workers.push(handle);
                }
                Err(e) => {
                    shared.fail(format!("failed to spawn worker {}: {}", index, e));
                    drop(inputs);
                    drop(merge_tx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    let _ = merger.join();
                    return Err(ProcessorError::Execution { source: Box::new(e) });
                }
            }
        }
        drop(merge_tx);

        info!(
            query = %query,
            parallelism,
            window_type = %context.assigner().window_type(),
            window_size_ms = context.assigner().window_size(),
            slide_ms = context.assigner().slide(),
            allowed_lateness_ms = context.allowed_lateness(),
            "query started"
        );

        Ok(QueryHandle {
            context,
            inputs,
            next_worker: AtomicUsize::new(0),
            workers,
            merger: Some(merger),
            shared,
            lifecycle,
            registry,
            stall_timeout,
            started: Instant::now(),
            closed: false,
        })
    }
}

/// Handle to a running query
///
/// Dropping the handle stops the query the same way [`QueryHandle::stop`]
/// does, discarding the outcome.
pub struct QueryHandle {
    context: Arc<QueryContext>,
    inputs: Vec<Sender<RecordBatch>>,
    next_worker: AtomicUsize,
    workers: Vec<JoinHandle<()>>,
    merger: Option<JoinHandle<()>>,
    shared: Arc<SharedState>,
    lifecycle: Arc<dyn QueryLifecycle>,
    registry: MetricsRegistry,
    stall_timeout: Duration,
    started: Instant,
    closed: bool,
}

impl QueryHandle {
    pub fn id(&self) -> QueryId {
        self.context.id()
    }

    pub fn status(&self) -> QueryStatus {
        self.shared.status()
    }

    pub fn parallelism(&self) -> usize {
        self.inputs.len()
    }

    /// Hand a batch to the next worker, round robin
    ///
    /// Blocks while that worker's channel is full.
    pub fn submit(&self, batch: RecordBatch) -> Result<()> {
        let workers = self.inputs.len().max(1);
        let worker = self.next_worker.fetch_add(1, Ordering::Relaxed) % workers;
        self.submit_to(WorkerId(worker), batch)
    }

    /// Hand a batch to a specific worker
    pub fn submit_to(&self, worker: WorkerId, batch: RecordBatch) -> Result<()> {
        if let Some(reason) = self.shared.failure() {
            return Err(ProcessorError::execution(format!("query failed: {}", reason)));
        }
        if self.status() != QueryStatus::Running {
            return Err(ProcessorError::execution("query is not running"));
        }
        self.context.watermarks().tracker(batch.origin)?;

        let input = self.inputs.get(worker.0).ok_or_else(|| {
            ProcessorError::execution(format!("no such worker: {}", worker))
        })?;
        input
            .send(batch)
            .map_err(|_| ProcessorError::execution(format!("{} has exited", worker)))
    }

    /// Current global watermark
    pub fn global_watermark(&self) -> Timestamp {
        self.context.watermarks().current_watermark()
    }

    /// Origins without watermark progress for longer than the stall timeout
    pub fn stalled_origins(&self) -> Vec<OriginId> {
        self.context.watermarks().stalled_origins(self.stall_timeout)
    }

    pub fn stats(&self) -> EngineStats {
        self.context.metrics().snapshot()
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop feeding workers, flush what was submitted and wait for every thread
    ///
    /// Slices that never became final are discarded. Returns the final
    /// statistics, or the error that terminated the query.
    pub fn stop(mut self) -> Result<EngineStats> {
        self.shutdown();
        match self.shared.failure() {
            Some(reason) => Err(ProcessorError::execution(format!("query failed: {}", reason))),
            None => Ok(self.stats()),
        }
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.shared.is_failed() {
            self.shared.set_status(QueryStatus::Stopping);
        }
        self.inputs.clear();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                self.shared.fail("worker thread panicked".to_string());
            }
        }
        if let Some(handle) = self.merger.take() {
            if handle.join().is_err() {
                self.shared.fail("merge thread panicked".to_string());
            }
        }

        if !self.shared.is_failed() {
            self.shared.set_status(QueryStatus::Stopped);
        }
        let stats = self.stats();
        info!(
            query = %self.id(),
            records = stats.records_processed,
            late = stats.late_records_dropped,
            windows = stats.windows_emitted,
            discarded = stats.slices_discarded,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "query stopped"
        );
        self.lifecycle.on_close(self.id());
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", &self.id())
            .field("status", &self.status())
            .field("parallelism", &self.inputs.len())
            .finish()
    }
}

/// A batch whose watermark report hit tracker backpressure
#[derive(Debug, Clone, Copy)]
struct DeferredClose {
    origin: OriginId,
    sequence: SequenceData,
    watermark: Timestamp,
}

struct WorkerLoop {
    operator: PreAggregationOperator,
    context: Arc<QueryContext>,
    input: Receiver<RecordBatch>,
    merge: Sender<MergeMessage>,
    shared: Arc<SharedState>,
    idle_tick: Duration,
    deferred: VecDeque<DeferredClose>,
    reported: Timestamp,
}

impl WorkerLoop {
    fn run(mut self) {
        let worker = self.operator.worker();
        debug!(worker = %worker, "worker started");

        loop {
            if self.shared.is_failed() {
                debug!(worker = %worker, "worker exiting after query failure");
                return;
            }

            let step = match self.input.recv_timeout(self.idle_tick) {
                Ok(batch) => self.on_batch(batch),
                Err(RecvTimeoutError::Timeout) => self.on_tick(),
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if let Err((origin, err)) = step {
                self.fail(origin, err);
                return;
            }
        }

        if let Err((origin, err)) = self.drain() {
            self.fail(origin, err);
            return;
        }
        self.operator.discard();
        let _ = self.merge.send(MergeMessage::Finished { worker });
        debug!(worker = %worker, "worker finished");
    }

    fn on_batch(
        &mut self,
        batch: RecordBatch,
    ) -> std::result::Result<(), (Option<OriginId>, ProcessorError)> {
        match self.operator.process_batch(&batch) {
            Ok(tasks) => self
                .publish(tasks)
                .map_err(|err| (Some(batch.origin), err))?,
            Err(ProcessorError::Watermark(err @ WatermarkError::TrackingWindowExceeded { .. })) => {
                debug!(worker = %self.operator.worker(), error = %err, "deferring batch close");
                self.deferred.push_back(DeferredClose {
                    origin: batch.origin,
                    sequence: batch.sequence,
                    watermark: batch.watermark,
                });
            }
            Err(ProcessorError::Watermark(err @ WatermarkError::StaleSequence { .. })) => {
                warn!(worker = %self.operator.worker(), error = %err, "skipped re-delivered batch");
            }
            Err(err) => return Err((Some(batch.origin), err)),
        }
        self.retry_deferred().map_err(|err| (Some(batch.origin), err))?;
        self.report()
    }

    /// Final flush once the input is closed
    ///
    /// Workers meet three times: after every batch is lifted, and twice
    /// around retrying deferred closes, so the watermark read for the last
    /// finalization no longer moves.
    fn drain(&mut self) -> std::result::Result<(), (Option<OriginId>, ProcessorError)> {
        let tick = self.idle_tick;
        if !self.shared.rendezvous(1, tick) {
            return Ok(());
        }
        self.retry_deferred().map_err(|err| (None, err))?;
        if !self.shared.rendezvous(2, tick) {
            return Ok(());
        }
        self.retry_deferred().map_err(|err| (None, err))?;
        if !self.shared.rendezvous(3, tick) {
            return Ok(());
        }
        if !self.deferred.is_empty() {
            warn!(
                worker = %self.operator.worker(),
                batches = self.deferred.len(),
                "batches never reached the watermark"
            );
        }
        self.on_tick()
    }

    /// Pick up watermark progress made by other workers
    fn on_tick(&mut self) -> std::result::Result<(), (Option<OriginId>, ProcessorError)> {
        self.retry_deferred().map_err(|err| (None, err))?;
        let watermark = self.context.watermarks().current_watermark();
        let tasks = self.operator.finalize_through(watermark, 0);
        self.publish(tasks).map_err(|err| (None, err))?;
        self.report()
    }

    fn retry_deferred(&mut self) -> Result<()> {
        loop {
            let mut progressed = false;
            for _ in 0..self.deferred.len() {
                let Some(close) = self.deferred.pop_front() else {
                    break;
                };
                match self
                    .operator
                    .close(close.watermark, close.origin, close.sequence)
                {
                    Ok(tasks) => {
                        progressed = true;
                        self.publish(tasks)?;
                    }
                    Err(ProcessorError::Watermark(err)) if err.is_backpressure() => {
                        self.deferred.push_back(close);
                    }
                    Err(err) => return Err(err),
                }
            }
            if !progressed || self.deferred.is_empty() {
                return Ok(());
            }
        }
    }

    fn publish(&mut self, tasks: Vec<super::task::SliceMergeTask>) -> Result<()> {
        for task in tasks {
            self.merge
                .send(MergeMessage::Partial(task))
                .map_err(|_| ProcessorError::execution("merge thread has exited"))?;
        }
        Ok(())
    }

    fn report(&mut self) -> std::result::Result<(), (Option<OriginId>, ProcessorError)> {
        let frontier = self.operator.frontier();
        if frontier > self.reported {
            self.reported = frontier;
            self.context
                .metrics()
                .global_watermark
                .set(frontier.millis().min(i64::MAX as u64) as i64);
            self.merge
                .send(MergeMessage::Progress {
                    worker: self.operator.worker(),
                    frontier,
                })
                .map_err(|_| (None, ProcessorError::execution("merge thread has exited")))?;
        }
        Ok(())
    }

    fn fail(&self, origin: Option<OriginId>, err: ProcessorError) {
        let worker = self.operator.worker();
        let reason = err.to_string();
        error!(worker = %worker, origin = ?origin, error = %reason, "worker failed");
        self.shared.fail(reason.clone());
        let _ = self.merge.send(MergeMessage::Failed {
            worker,
            origin,
            reason,
        });
    }
}

struct MergeLoop {
    coordinator: MergeCoordinator,
    context: Arc<QueryContext>,
    input: Receiver<MergeMessage>,
    sink: Arc<dyn WindowSink>,
    lifecycle: Arc<dyn QueryLifecycle>,
    pool: BufferPool,
    shared: Arc<SharedState>,
    idle_tick: Duration,
    stall_timeout: Duration,
}

impl MergeLoop {
    fn run(self) {
        let query = self.context.id();
        let mut stalled: Vec<OriginId> = Vec::new();

        loop {
            let step = match self.input.recv_timeout(self.idle_tick) {
                Ok(MergeMessage::Partial(task)) => self.coordinator.on_partial(task).map(|_| ()),
                Ok(MergeMessage::Progress { worker, frontier }) => self
                    .coordinator
                    .on_progress(worker, frontier)
                    .and_then(|results| self.emit(results)),
                Ok(MergeMessage::Finished { worker }) => {
                    if self.coordinator.on_finished(worker) {
                        self.coordinator.discard_incomplete();
                        break;
                    }
                    Ok(())
                }
                Ok(MergeMessage::Failed {
                    worker,
                    origin,
                    reason,
                }) => {
                    debug!(query = %query, worker = %worker, "merge stopped after worker failure");
                    self.lifecycle.on_failure(query, origin, &reason);
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.check_stalls(&mut stalled);
                    Ok(())
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            if let Err(err) = step {
                let reason = err.to_string();
                error!(query = %query, error = %reason, "merge failed");
                self.shared.fail(reason.clone());
                self.lifecycle.on_failure(query, None, &reason);
                return;
            }
        }
        debug!(query = %query, "merge finished");
    }

    /// Encode and hand results to the sink, waiting out pool exhaustion
    fn emit(&self, results: Vec<WindowResult>) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }

        let deadline = Instant::now() + self.stall_timeout;
        let buffers = loop {
            match encode_results(&self.pool, &results) {
                Ok(buffers) => break buffers,
                Err(ProcessorError::Buffer(BufferError::PoolExhausted { regions }))
                    if Instant::now() < deadline =>
                {
                    debug!(regions, "result buffer pool exhausted, waiting");
                    thread::sleep(self.idle_tick);
                }
                Err(err) => return Err(err),
            }
        };

        for buffer in buffers {
            self.sink.emit(buffer)?;
        }
        Ok(())
    }

    fn check_stalls(&self, reported: &mut Vec<OriginId>) {
        let stalled = self.context.watermarks().stalled_origins(self.stall_timeout);
        self.context
            .metrics()
            .stalled_origins
            .set(stalled.len() as i64);

        if stalled != *reported {
            if !stalled.is_empty() {
                warn!(
                    query = %self.context.id(),
                    origins = ?stalled,
                    watermark = %self.context.watermarks().current_watermark(),
                    "origins made no watermark progress"
                );
            }
            *reported = stalled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggregateSpec;
    use crate::config::{SliceStoreConfig, WatermarkConfig, WindowConfig};
    use crate::pipeline::lifecycle::LoggingLifecycle;
    use crate::sink::CollectingSink;
    use slicestream_types::{Record, Value};

    fn config(parallelism: usize) -> ProcessorConfig {
        let mut config = ProcessorConfig {
            window: WindowConfig::tumbling(10),
            slice_store: SliceStoreConfig {
                number_of_slices: 8,
            },
            watermark: WatermarkConfig {
                idle_tick_ms: 5,
                ..WatermarkConfig::default()
            },
            parallelism,
            ..ProcessorConfig::default()
        };
        config.aggregation.aggregates = vec![AggregateSpec::count("count")];
        config
    }

    fn batch(seq: u64, wm: u64, timestamps: &[u64]) -> RecordBatch {
        RecordBatch::new(
            OriginId(0),
            seq,
            Timestamp::new(wm),
            timestamps
                .iter()
                .map(|ts| Record::new().with("timestamp", *ts))
                .collect(),
        )
    }

    #[test]
    fn test_query_emits_and_stops() {
        let sink = CollectingSink::new();
        let engine = Engine::new(config(2)).unwrap();
        let handle = engine
            .start(Arc::new(sink.clone()), Arc::new(LoggingLifecycle))
            .unwrap();

        handle.submit(batch(1, 0, &[1, 2, 3])).unwrap();
        handle.submit(batch(2, 10, &[4, 5])).unwrap();
        let stats = handle.stop().unwrap();

        let results = sink.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("count"), Some(&Value::UInt(5)));
        assert_eq!(stats.records_processed, 5);
        assert_eq!(stats.windows_emitted, 1);
    }

    #[test]
    fn test_unknown_origin_is_rejected_on_submit() {
        let engine = Engine::new(config(1)).unwrap();
        let handle = engine
            .start(Arc::new(CollectingSink::new()), Arc::new(LoggingLifecycle))
            .unwrap();

        let batch = RecordBatch::new(OriginId(9), 1, Timestamp::new(0), vec![]);
        let err = handle.submit(batch).unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::Watermark(WatermarkError::UnknownOrigin { .. })
        ));
        handle.stop().unwrap();
    }

    #[test]
    fn test_submit_to_unknown_worker() {
        let engine = Engine::new(config(1)).unwrap();
        let handle = engine
            .start(Arc::new(CollectingSink::new()), Arc::new(LoggingLifecycle))
            .unwrap();

        assert!(handle.submit_to(WorkerId(3), batch(1, 0, &[1])).is_err());
        handle.stop().unwrap();
    }

    #[test]
    fn test_fatal_error_fails_the_query() {
        let sink = CollectingSink::new();
        let engine = Engine::new(config(1)).unwrap();
        let handle = engine
            .start(Arc::new(sink.clone()), Arc::new(LoggingLifecycle))
            .unwrap();

        // 0 and 500 cannot both be live in an 8-slice ring
        handle.submit(batch(1, 0, &[0, 500])).unwrap();
        let err = handle.stop().unwrap_err();

        assert!(err.to_string().contains("capacity exceeded"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_worker_fails_when_merge_thread_is_gone() {
        let context = Arc::new(QueryContext::from_config(&config(1)).unwrap());
        let (_input_tx, input) = bounded(1);
        let (merge, merge_rx) = unbounded();
        drop(merge_rx);

        let mut worker = WorkerLoop {
            operator: PreAggregationOperator::new(WorkerId(0), context.clone()),
            context,
            input,
            merge,
            shared: Arc::new(SharedState::new(1)),
            idle_tick: Duration::from_millis(5),
            deferred: VecDeque::new(),
            reported: Timestamp::MIN,
        };

        // The batch finalizes slice [0, 10), which has nowhere to go
        let (origin, err) = worker.on_batch(batch(1, 10, &[1, 2])).unwrap_err();
        assert_eq!(origin, Some(OriginId(0)));
        assert!(matches!(err, ProcessorError::Execution { .. }));
        assert!(err.to_string().contains("merge thread has exited"));
    }
}
