//! Background worker thread.
//!
//! The worker owns the synchronizer, the filter chain and the point-cloud
//! mapper. It is the only code that ever touches them while running, so no
//! block is mutated mid-apply. Callers talk to it through [`WorkerShared`]:
//!
//! - parameter changes land in [`FilterSettings`] and are copied into the
//!   chain when its generation moves,
//! - stream activation lands in the [`FrameQueueRegistry`] and becomes the
//!   synchronizer's expected set when the registry generation moves,
//! - `reset()` bumps an epoch; the worker clears its state when it sees a
//!   new epoch and drops any cycle that straddled one.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start()--> Running --stop()--> Stopping --join--> Stopped
//! ```
//!
//! The loop state is handed back on join, so a restarted worker keeps its
//! filter parameters. Nothing else survives a stop: the pending set, filter
//! history, last texture and unread intake frames are dropped.

use super::{PipelineEvent, PipelineStats, ProcessedSample};
use crate::config::WorkerConfig;
use crate::error::{DepthVisError, Result};
use crate::frame::{Frame, FrameSet, StreamId};
use crate::pointcloud::PointCloudMapper;
use crate::processing::{FilterChain, FilterSettings};
use crate::queue::{BoundedQueue, FrameQueueRegistry};
use crate::sync::{SyncConfig, Synchronizer};
use crossbeam_channel::Sender;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

/// Name of the spawned worker thread.
pub const WORKER_THREAD_NAME: &str = "depthvis-pipeline";

/// Lifecycle state of a [`PipelineWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Running,
    /// Cancellation requested, waiting for the thread to exit.
    Stopping,
}

/// Result of [`PipelineWorker::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The worker was already running; nothing changed.
    AlreadyRunning,
}

/// Queues, settings and counters shared between callers and the worker.
pub struct WorkerShared {
    pub(crate) intake: Arc<BoundedQueue<Frame>>,
    pub(crate) output: BoundedQueue<ProcessedSample>,
    pub(crate) registry: Arc<FrameQueueRegistry>,
    pub(crate) settings: Arc<FilterSettings>,
    pub(crate) sync_enabled: AtomicBool,
    pub(crate) reset_epoch: AtomicU64,
    /// Serializes publishing against `request_reset`.
    publish: Mutex<()>,
    stats: Mutex<PipelineStats>,
    events: Sender<PipelineEvent>,
}

impl WorkerShared {
    pub(crate) fn new(
        intake: Arc<BoundedQueue<Frame>>,
        output: BoundedQueue<ProcessedSample>,
        registry: Arc<FrameQueueRegistry>,
        settings: Arc<FilterSettings>,
        sync_enabled: bool,
        events: Sender<PipelineEvent>,
    ) -> Self {
        Self {
            intake,
            output,
            registry,
            settings,
            sync_enabled: AtomicBool::new(sync_enabled),
            reset_epoch: AtomicU64::new(0),
            publish: Mutex::new(()),
            stats: Mutex::new(PipelineStats::default()),
            events,
        }
    }

    fn lock_stats(&self) -> MutexGuard<'_, PipelineStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Counter snapshot including queue-side drop counts.
    pub fn stats(&self) -> PipelineStats {
        let mut stats = self.lock_stats().clone();
        stats.intake_dropped = self.intake.dropped();
        stats.results_dropped = self.output.dropped();
        stats
    }

    /// Send a diagnostic event without blocking. Counts it if the channel
    /// is full or nobody is listening.
    pub(crate) fn emit(&self, event: PipelineEvent) {
        if self.events.try_send(event).is_err() {
            self.lock_stats().events_dropped += 1;
        }
    }

    /// Discard published results and make the worker drop its state.
    pub(crate) fn request_reset(&self) {
        let (released, epoch) = {
            let _publish = self.publish.lock().unwrap_or_else(|e| e.into_inner());
            let released = self.output.clear() + self.registry.clear_all();
            (released, self.reset_epoch.fetch_add(1, Ordering::AcqRel) + 1)
        };
        tracing::debug!("Pipeline reset (epoch {}, {} items released)", epoch, released);
        self.emit(PipelineEvent::Reset);
    }
}

/// Everything the worker thread owns while it runs.
struct WorkerLoop {
    shared: Arc<WorkerShared>,
    running: Arc<AtomicBool>,
    config: WorkerConfig,
    synchronizer: Synchronizer,
    chain: FilterChain,
    mapper: PointCloudMapper,
    settings_generation: Option<u64>,
    registry_generation: Option<u64>,
    epoch: u64,
    last_frame: Option<(StreamId, u64)>,
    /// Nominal frame interval of every stream seen, in milliseconds.
    intervals: HashMap<StreamId, f64>,
    cycle: u64,
    last_stats: Instant,
}

impl WorkerLoop {
    fn new(
        shared: Arc<WorkerShared>,
        running: Arc<AtomicBool>,
        config: WorkerConfig,
        sync_config: SyncConfig,
    ) -> Self {
        let (generation, settings) = shared.settings.snapshot();
        let epoch = shared.reset_epoch.load(Ordering::Acquire);
        Self {
            shared,
            running,
            config,
            synchronizer: Synchronizer::new(sync_config),
            chain: FilterChain::from_settings(&settings),
            mapper: PointCloudMapper::new(),
            settings_generation: Some(generation),
            registry_generation: None,
            epoch,
            last_frame: None,
            intervals: HashMap::new(),
            cycle: 0,
            last_stats: Instant::now(),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until cancelled, then hand the state back.
    fn run(mut self) -> Self {
        tracing::info!("Pipeline worker started");
        self.shared.emit(PipelineEvent::Started);
        let poll_timeout = self.config.poll_timeout();

        while self.is_running() {
            let next = self.shared.intake.pop_blocking(poll_timeout);
            if !self.is_running() {
                break;
            }

            // Changes made before a frame was enqueued apply to that frame.
            self.refresh_settings();
            self.refresh_streams();
            self.observe_reset();

            match next {
                Some(frame) => self.handle_frame(frame),
                None => {
                    if let Some(set) = self.synchronizer.poll_ready(Instant::now()) {
                        self.process_set(set);
                    }
                }
            }

            if self.last_stats.elapsed() >= self.config.stats_interval() {
                self.shared.emit(PipelineEvent::Stats(self.shared.stats()));
                self.last_stats = Instant::now();
            }
        }

        if self.synchronizer.pending_len() > 0 {
            tracing::debug!(
                "Worker exiting with {} pending frames unemitted",
                self.synchronizer.pending_len()
            );
        }
        self.clear_run_state();
        self.shared.emit(PipelineEvent::Stopped);
        tracing::info!("Pipeline worker stopped");
        self
    }

    /// Pick up filter parameters and the synchronization toggle.
    fn refresh_settings(&mut self) {
        let generation = self.shared.settings.generation();
        if self.settings_generation != Some(generation) {
            let (generation, settings) = self.shared.settings.snapshot();
            self.chain.apply_settings(&settings);
            self.settings_generation = Some(generation);
            tracing::debug!("Filter settings applied (generation {})", generation);
        }

        let sync_enabled = self.shared.sync_enabled.load(Ordering::Acquire);
        if sync_enabled != self.synchronizer.is_enabled() {
            if !sync_enabled {
                if let Some(set) = self.synchronizer.flush() {
                    self.process_set(set);
                }
            }
            self.synchronizer.set_enabled(sync_enabled);
            if sync_enabled {
                self.check_sync_timing();
            }
        }
    }

    fn refresh_streams(&mut self) {
        let generation = self.shared.registry.generation();
        if self.registry_generation != Some(generation) {
            let active = self.shared.registry.active_streams();
            tracing::debug!("Expected streams: {:?}", active);
            self.synchronizer.set_expected_streams(active);
            self.registry_generation = Some(generation);
            self.check_sync_timing();
        }
    }

    /// Warn when the staleness timeout cannot cover the expected streams'
    /// frame intervals.
    fn check_sync_timing(&self) {
        if !self.synchronizer.is_enabled() {
            return;
        }
        let expected = self.synchronizer.expected_streams();
        let intervals: Vec<f64> = self
            .intervals
            .iter()
            .filter(|(stream, _)| expected.contains(stream))
            .map(|(_, &interval)| interval)
            .collect();
        if let Err(e) = self.synchronizer.config().validate_against_intervals(&intervals) {
            tracing::warn!("Synchronizer timing: {}", e);
            self.shared.emit(PipelineEvent::SyncTimingInvalid {
                message: e.to_string(),
            });
        }
    }

    fn observe_reset(&mut self) {
        let epoch = self.shared.reset_epoch.load(Ordering::Acquire);
        if epoch != self.epoch {
            self.clear_run_state();
            self.epoch = epoch;
            tracing::debug!("Worker state cleared for epoch {}", epoch);
        }
    }

    /// Drop everything derived from frames already seen. Filter parameters
    /// and the expected stream set are kept.
    fn clear_run_state(&mut self) {
        self.synchronizer.reset();
        self.chain.reset();
        self.mapper.reset();
        self.last_frame = None;
    }

    fn handle_frame(&mut self, frame: Frame) {
        let key = (frame.stream(), frame.number());
        let duplicate = self.last_frame == Some(key);
        {
            let mut stats = self.shared.lock_stats();
            stats.frames_received += 1;
            if duplicate {
                stats.frames_duplicate += 1;
            }
        }
        if duplicate {
            tracing::trace!("Skipping duplicate frame {} of {}", key.1, key.0);
            return;
        }
        self.last_frame = Some(key);

        let interval = frame.nominal_interval_ms();
        for set in self.synchronizer.push(frame, Instant::now()) {
            self.process_set(set);
        }

        if let Some(interval) = interval {
            if self.intervals.insert(key.0, interval) != Some(interval) {
                self.check_sync_timing();
            }
        }
    }

    /// Filter, map and publish one frame set.
    fn process_set(&mut self, set: FrameSet) {
        let started = Instant::now();
        self.cycle += 1;
        let cycle = self.cycle;

        let (frames, failures) = self.chain.process(set);
        for failure in &failures {
            self.shared.emit(PipelineEvent::FilterStageFailed {
                block: failure.block.name(),
                message: failure.error.to_string(),
            });
        }

        let active = self.shared.registry.active_streams();
        let points = match self.mapper.map_frameset(&frames, &active) {
            Ok(points) => Some(points),
            Err(e) => {
                tracing::debug!("Cycle {}: {}", cycle, e);
                self.shared.emit(PipelineEvent::MappingUnavailable { cycle });
                None
            }
        };

        let mapped = points.is_some();
        {
            let _publish = self.shared.publish.lock().unwrap_or_else(|e| e.into_inner());
            if self.shared.reset_epoch.load(Ordering::Acquire) != self.epoch {
                tracing::debug!("Cycle {} discarded by reset", cycle);
                return;
            }

            for frame in frames.iter() {
                let stream = frame.stream();
                if active.is_empty() || active.contains(&stream) {
                    self.shared.registry.at(stream.uid()).push(frame.clone());
                }
            }

            if self.shared.output.push(ProcessedSample { frames, points, cycle }).is_evicted() {
                tracing::trace!("Unread result evicted by cycle {}", cycle);
            }
        }

        let partial = self.synchronizer.counters().partial;
        let mut stats = self.shared.lock_stats();
        stats.framesets_emitted += 1;
        stats.partial_framesets = partial;
        stats.filter_failures += failures.len() as u64;
        if !mapped {
            stats.mapping_unavailable += 1;
        }
        stats.results_published += 1;
        stats.record_cycle(started.elapsed());
    }
}

/// Owner of the worker thread.
pub struct PipelineWorker {
    shared: Arc<WorkerShared>,
    running: Arc<AtomicBool>,
    config: WorkerConfig,
    sync_config: SyncConfig,
    state: WorkerState,
    handle: Option<JoinHandle<WorkerLoop>>,
    /// Loop state parked between runs.
    idle: Option<WorkerLoop>,
}

impl PipelineWorker {
    pub(crate) fn new(shared: Arc<WorkerShared>, config: WorkerConfig, sync_config: SyncConfig) -> Self {
        Self {
            shared,
            running: Arc::new(AtomicBool::new(false)),
            config,
            sync_config,
            state: WorkerState::Stopped,
            handle: None,
            idle: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Spawn the worker thread. Results left over from a previous run are
    /// discarded first.
    pub fn start(&mut self) -> Result<StartOutcome> {
        if self.state == WorkerState::Running {
            tracing::warn!("{}", DepthVisError::WorkerAlreadyRunning);
            return Ok(StartOutcome::AlreadyRunning);
        }

        let released = self.shared.output.clear() + self.shared.registry.clear_all();
        if released > 0 {
            tracing::debug!("Released {} stale results before start", released);
        }

        let worker_loop = match self.idle.take() {
            Some(worker_loop) => worker_loop,
            None => WorkerLoop::new(
                self.shared.clone(),
                self.running.clone(),
                self.config.clone(),
                self.sync_config.clone(),
            ),
        };

        self.running.store(true, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop.run());

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = WorkerState::Running;
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                tracing::error!("Failed to spawn pipeline worker: {}", e);
                Err(DepthVisError::WorkerStartFailed(e.to_string()))
            }
        }
    }

    /// Cancel and join the worker thread. Stopping a stopped worker is a
    /// no-op.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            self.state = WorkerState::Stopped;
            return Ok(());
        };
        if handle.thread().id() == std::thread::current().id() {
            self.handle = Some(handle);
            return Err(DepthVisError::WorkerReentrantStop);
        }

        self.state = WorkerState::Stopping;
        self.running.store(false, Ordering::SeqCst);
        let joined = handle.join();
        self.state = WorkerState::Stopped;

        // Frames enqueued before the stop belong to the finished run.
        let discarded = self.shared.intake.clear();
        if discarded > 0 {
            tracing::debug!("Discarded {} unread frames on stop", discarded);
        }

        match joined {
            Ok(worker_loop) => {
                self.idle = Some(worker_loop);
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("Pipeline worker panicked: {}", message);
                Err(DepthVisError::WorkerPanicked(message))
            }
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Pipeline worker did not stop cleanly: {}", e);
        }
    }
}

impl std::fmt::Debug for PipelineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineWorker")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
