//! Frame pipeline
//!
//! [`Pipeline`] is the configuration boundary between capture, the
//! background worker and the consumer:
//!
//! ```text
//! capture ──enqueue()──► intake queue ──► Synchronizer ──► FilterChain
//!                                                              │
//!   consumer ◄──poll()── output queue ◄── PointCloudMapper ◄───┘
//!            ◄──poll_stream()── per-stream registry queues
//! ```
//!
//! Both queues evict their oldest entry when full, so neither the producer
//! nor the consumer ever waits on the worker. All parameter and toggle
//! setters are safe to call from any thread while the worker runs.
//!
//! # Example
//!
//! ```ignore
//! use depthvis_rs::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! pipeline.start()?;
//! pipeline.enqueue(frame);
//! if let Some(sample) = pipeline.poll() {
//!     println!("{} points", sample.points.map_or(0, |p| p.len()));
//! }
//! pipeline.stop()?;
//! ```

pub mod stats;
pub mod worker;

pub use stats::PipelineStats;
pub use worker::{PipelineWorker, StartOutcome, WorkerShared, WorkerState, WORKER_THREAD_NAME};

use crate::config::PipelineConfig;
use crate::error::{Result, ResultExt};
use crate::frame::{Frame, FrameSet, StreamId};
use crate::pointcloud::PointCloud;
use crate::processing::{BlockKind, BlockOption, FilterConfig, FilterSettings};
use crate::queue::{BoundedQueue, FrameQueueRegistry, OverflowPolicy, PushOutcome};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

/// One finished pipeline cycle.
#[derive(Debug, Clone)]
pub struct ProcessedSample {
    /// The synchronized set with its depth member post-processed.
    pub frames: FrameSet,
    /// `None` when the set had no usable depth frame.
    pub points: Option<PointCloud>,
    /// Worker cycle number, increasing across the worker's lifetime.
    pub cycle: u64,
}

/// Diagnostics reported by the worker.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Worker thread entered its loop
    Started,
    /// Worker thread left its loop
    Stopped,
    /// Pipeline state was reset
    Reset,
    /// A filter stage was skipped for one cycle
    FilterStageFailed { block: &'static str, message: String },
    /// A cycle produced no point cloud
    MappingUnavailable { cycle: u64 },
    /// The staleness timeout is shorter than an expected stream's frame interval
    SyncTimingInvalid { message: String },
    /// Periodic counter snapshot
    Stats(PipelineStats),
}

/// Owns the queues, the shared settings and the worker thread.
pub struct Pipeline {
    config: PipelineConfig,
    shared: Arc<WorkerShared>,
    worker: Mutex<PipelineWorker>,
    events: Receiver<PipelineEvent>,
}

impl Pipeline {
    /// Build every queue up front. Allocation or validation failures
    /// surface here, never from a running worker.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let intake = BoundedQueue::new(config.queues.intake_capacity, OverflowPolicy::DropOldest)
            .context("intake queue")?;
        let output = BoundedQueue::new(config.queues.output_capacity, OverflowPolicy::DropOldest)
            .context("output queue")?;
        let registry = FrameQueueRegistry::new(config.queues.per_stream_capacity);
        let settings = FilterSettings::from_config(&config.filters)?;
        let (event_tx, event_rx) = bounded(config.queues.event_capacity);

        let shared = Arc::new(WorkerShared::new(
            Arc::new(intake),
            output,
            Arc::new(registry),
            Arc::new(settings),
            config.sync.enabled,
            event_tx,
        ));
        let worker = PipelineWorker::new(shared.clone(), config.worker.clone(), config.sync.clone());

        tracing::info!(
            "Pipeline created (intake {}, output {}, per-stream {})",
            config.queues.intake_capacity,
            config.queues.output_capacity,
            config.queues.per_stream_capacity
        );

        Ok(Self {
            config,
            shared,
            worker: Mutex::new(worker),
            events: event_rx,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn lock_worker(&self) -> MutexGuard<'_, PipelineWorker> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Capture side ──

    /// Hand a captured frame to the pipeline. Never blocks; a full intake
    /// queue evicts its oldest frame.
    pub fn enqueue(&self, frame: Frame) -> PushOutcome<Frame> {
        let outcome = self.shared.intake.push(frame);
        if let PushOutcome::Evicted(old) = &outcome {
            tracing::trace!("Intake full, dropped frame {} of {}", old.number(), old.stream());
        }
        outcome
    }

    // ── Consumer side ──

    /// Most recent finished result, discarding anything older.
    pub fn poll(&self) -> Option<ProcessedSample> {
        self.shared.output.poll_latest()
    }

    /// Most recent processed frame of one stream.
    pub fn poll_stream(&self, uid: u64) -> Option<Frame> {
        self.shared.registry.get(uid)?.poll_latest()
    }

    pub fn registry(&self) -> &Arc<FrameQueueRegistry> {
        &self.shared.registry
    }

    /// Diagnostic event receiver. Clones share the same channel.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }

    // ── Synchronization ──

    pub fn set_synchronization(&self, enabled: bool) {
        self.shared.sync_enabled.store(enabled, Ordering::Release);
        tracing::info!("Synchronization {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn synchronization_enabled(&self) -> bool {
        self.shared.sync_enabled.load(Ordering::Acquire)
    }

    // ── Post-processing ──

    pub fn set_post_processing(&self, enabled: bool) {
        self.shared.settings.set_post_processing(enabled);
    }

    pub fn post_processing_enabled(&self) -> bool {
        self.shared.settings.post_processing_enabled()
    }

    pub fn set_block_enabled(&self, kind: BlockKind, enabled: bool) {
        self.shared.settings.set_block_enabled(kind, enabled);
    }

    pub fn block_enabled(&self, kind: BlockKind) -> bool {
        self.shared.settings.block_enabled(kind)
    }

    /// Validated parameter update, applied by the worker before its next
    /// cycle. The previous value survives a rejected write.
    pub fn set_parameter(&self, kind: BlockKind, name: &str, value: f32) -> Result<()> {
        self.shared.settings.set_parameter(kind, name, value)
    }

    pub fn get_parameter(&self, kind: BlockKind, name: &str) -> Result<f32> {
        self.shared.settings.get_parameter(kind, name)
    }

    pub fn options(&self, kind: BlockKind) -> Vec<BlockOption> {
        self.shared.settings.options(kind)
    }

    /// Current filter settings in their serialized form.
    pub fn filter_config(&self) -> FilterConfig {
        self.shared.settings.to_config()
    }

    // ── Streams ──

    /// Add a stream to the set a frame set must cover to be complete.
    pub fn activate_stream(&self, stream: StreamId) -> bool {
        self.shared.registry.activate(stream)
    }

    pub fn deactivate_stream(&self, stream: StreamId) -> bool {
        self.shared.registry.deactivate(stream)
    }

    // ── Lifecycle ──

    /// Drop every published result and pending partial set, and clear
    /// temporal filter history.
    pub fn reset(&self) {
        self.shared.request_reset();
    }

    pub fn start(&self) -> Result<StartOutcome> {
        self.lock_worker().start()
    }

    pub fn stop(&self) -> Result<()> {
        self.lock_worker().stop()
    }

    pub fn state(&self) -> WorkerState {
        self.lock_worker().state()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
