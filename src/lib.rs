//! # DepthVis-RS: Depth Camera Frame Pipeline
//!
//! Takes frames from several independently clocked camera streams (depth,
//! color, infrared, motion), groups them into time-correlated frame sets,
//! runs the depth member through a chain of post-processing filters and
//! turns the result into a textured point cloud.
//!
//! ## Architecture
//!
//! - **Capture side**: pushes frames into a bounded intake queue and never waits
//! - **Worker**: a background thread that synchronizes, filters and maps each set
//! - **Consumer side**: polls the newest result or the newest frame of one stream
//! - **Communication**: bounded queues that evict their oldest entry, plus a
//!   crossbeam channel for diagnostic events
//!
//! ## Configuration
//!
//! Pipeline settings (queue sizes, synchronizer tuning, filter parameters)
//! are stored under the platform config directory in `depthvis-rs/`:
//!
//! - **Linux**: `~/.config/depthvis-rs/`
//! - **macOS**: `~/Library/Application Support/depthvis-rs/`
//! - **Windows**: `%APPDATA%\depthvis-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use depthvis_rs::{capture::SyntheticSource, Pipeline, PipelineConfig};
//!
//! fn main() -> depthvis_rs::Result<()> {
//!     let pipeline = Pipeline::new(PipelineConfig::load_or_default())?;
//!     let mut source = SyntheticSource::default();
//!     for stream in source.streams() {
//!         pipeline.activate_stream(stream);
//!     }
//!     pipeline.start()?;
//!
//!     for _ in 0..30 {
//!         pipeline.enqueue(source.next_frame());
//!     }
//!     if let Some(sample) = pipeline.poll() {
//!         println!("{} points", sample.points.map_or(0, |p| p.len()));
//!     }
//!     pipeline.stop()
//! }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod pointcloud;
pub mod processing;
pub mod queue;
pub mod sync;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{DepthVisError, Result, ResultExt};
pub use frame::{Frame, FrameSet, StreamId, StreamKind, StreamProfile, Timestamp};
pub use pipeline::{Pipeline, PipelineEvent, PipelineStats, ProcessedSample, WorkerState};
pub use pointcloud::{PointCloud, PointCloudMapper};
pub use processing::{BlockKind, FilterChain, ProcessingBlock};
pub use queue::{BoundedQueue, FrameQueueRegistry, OverflowPolicy, PushOutcome};
pub use sync::{SyncConfig, Synchronizer};
