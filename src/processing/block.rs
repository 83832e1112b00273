//! The closed set of post-processing blocks.

use crate::error::Result;
use crate::frame::Frame;
use crate::processing::decimation::{self, DecimationFilter};
use crate::processing::options::{BlockOption, OptionSet};
use crate::processing::spatial::{self, SpatialFilter};
use crate::processing::temporal::{self, TemporalFilter};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a block type. Declaration order is chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Decimation,
    Spatial,
    Temporal,
}

impl BlockKind {
    /// Fixed application order of the chain.
    pub const ORDER: [BlockKind; 3] = [BlockKind::Decimation, BlockKind::Spatial, BlockKind::Temporal];

    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Decimation => decimation::NAME,
            BlockKind::Spatial => spatial::NAME,
            BlockKind::Temporal => temporal::NAME,
        }
    }

    /// Position in [`BlockKind::ORDER`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn default_options(self) -> OptionSet {
        match self {
            BlockKind::Decimation => decimation::default_options(),
            BlockKind::Spatial => spatial::default_options(),
            BlockKind::Temporal => temporal::default_options(),
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One post-processing stage with its enable flag and options.
#[derive(Debug, Clone)]
pub enum ProcessingBlock {
    Decimation(DecimationFilter),
    Spatial(SpatialFilter),
    Temporal(TemporalFilter),
}

impl ProcessingBlock {
    pub fn new(kind: BlockKind) -> Self {
        match kind {
            BlockKind::Decimation => ProcessingBlock::Decimation(DecimationFilter::new()),
            BlockKind::Spatial => ProcessingBlock::Spatial(SpatialFilter::new()),
            BlockKind::Temporal => ProcessingBlock::Temporal(TemporalFilter::new()),
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            ProcessingBlock::Decimation(_) => BlockKind::Decimation,
            ProcessingBlock::Spatial(_) => BlockKind::Spatial,
            ProcessingBlock::Temporal(_) => BlockKind::Temporal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProcessingBlock::Decimation(b) => b.name(),
            ProcessingBlock::Spatial(b) => b.name(),
            ProcessingBlock::Temporal(b) => b.name(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            ProcessingBlock::Decimation(b) => b.is_enabled(),
            ProcessingBlock::Spatial(b) => b.is_enabled(),
            ProcessingBlock::Temporal(b) => b.is_enabled(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        match self {
            ProcessingBlock::Decimation(b) => b.set_enabled(enabled),
            ProcessingBlock::Spatial(b) => b.set_enabled(enabled),
            ProcessingBlock::Temporal(b) => b.set_enabled(enabled),
        }
    }

    pub fn option_set(&self) -> &OptionSet {
        match self {
            ProcessingBlock::Decimation(b) => b.options(),
            ProcessingBlock::Spatial(b) => b.options(),
            ProcessingBlock::Temporal(b) => b.options(),
        }
    }

    fn option_set_mut(&mut self) -> &mut OptionSet {
        match self {
            ProcessingBlock::Decimation(b) => b.options_mut(),
            ProcessingBlock::Spatial(b) => b.options_mut(),
            ProcessingBlock::Temporal(b) => b.options_mut(),
        }
    }

    /// Snapshot of every option with range and current value.
    pub fn options(&self) -> Vec<BlockOption> {
        self.option_set().to_vec()
    }

    pub fn get_parameter(&self, name: &str) -> Result<f32> {
        self.option_set().get(name)
    }

    /// Validated update. The previous value survives a rejected write.
    pub fn set_parameter(&mut self, name: &str, value: f32) -> Result<()> {
        self.option_set_mut().set(name, value)?;
        tracing::debug!("{} option {} = {}", self.name(), name, value);
        Ok(())
    }

    /// Copy enable state and option values from `settings`.
    pub(crate) fn load_settings(&mut self, enabled: bool, options: &OptionSet) {
        self.set_enabled(enabled);
        *self.option_set_mut() = options.clone();
    }

    /// Run the block. A disabled block returns the input handle unchanged.
    pub fn apply(&mut self, frame: &Frame) -> Result<Frame> {
        if !self.is_enabled() {
            return Ok(frame.clone());
        }
        match self {
            ProcessingBlock::Decimation(b) => b.process(frame),
            ProcessingBlock::Spatial(b) => b.process(frame),
            ProcessingBlock::Temporal(b) => b.process(frame),
        }
    }

    /// Drop any state carried between frames.
    pub fn reset(&mut self) {
        if let ProcessingBlock::Temporal(b) = self {
            b.reset();
        }
    }
}
