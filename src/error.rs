//! Error handling for the depth pipeline
//!
//! This module defines the crate-wide error type and a Result alias.
//! Queue overflow under the evict-oldest policy is not an error; it is
//! reported through [`crate::queue::PushOutcome::Evicted`] instead.

use thiserror::Error;

/// Main error type for depthvis-rs operations
#[derive(Error, Debug)]
pub enum DepthVisError {
    /// A bounded queue could not be constructed
    #[error("Queue allocation failed: {0}")]
    QueueAllocation(String),

    /// A processing block parameter was set outside its declared range
    #[error("Parameter '{name}' of {block} out of range: {value} not in [{min}, {max}]")]
    ParameterOutOfRange {
        block: &'static str,
        name: String,
        value: f32,
        min: f32,
        max: f32,
    },

    /// A processing block has no parameter with this name
    #[error("{block} has no parameter named '{name}'")]
    UnknownParameter { block: &'static str, name: String },

    /// A filter stage rejected its input
    #[error("Filter stage {block} failed: {message}")]
    FilterStageFailed { block: &'static str, message: String },

    /// No usable depth frame for point cloud generation
    #[error("Point cloud mapping unavailable: {0}")]
    MappingUnavailable(String),

    /// The background worker thread could not be spawned
    #[error("Failed to start pipeline worker: {0}")]
    WorkerStartFailed(String),

    /// `start()` was called while the worker was already running
    #[error("Pipeline worker is already running")]
    WorkerAlreadyRunning,

    /// The worker thread panicked and was joined
    #[error("Pipeline worker panicked: {0}")]
    WorkerPanicked(String),

    /// `stop()` was called from inside the worker thread
    #[error("stop() cannot be called from the pipeline worker thread")]
    WorkerReentrantStop,

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DepthVisError>,
    },
}

impl DepthVisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DepthVisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &DepthVisError {
        match self {
            DepthVisError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for depthvis-rs operations
pub type Result<T> = std::result::Result<T, DepthVisError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
