//! Depth post-processing.
//!
//! Three blocks run in a fixed order over the depth member of each
//! [`FrameSet`](crate::frame::FrameSet):
//!
//! 1. **Decimation** reduces resolution (median of valid samples).
//! 2. **Spatial** smooths within a frame while keeping edges.
//! 3. **Temporal** smooths across frames and fills short-lived holes.
//!
//! Each block can be toggled on its own and the whole chain has a master
//! switch. Parameters are validated against per-option ranges; see
//! [`OptionSet`].

pub mod block;
pub mod chain;
pub mod decimation;
pub mod options;
pub mod settings;
pub mod spatial;
pub mod temporal;

pub use block::{BlockKind, ProcessingBlock};
pub use chain::{FilterChain, FilterFailure};
pub use decimation::DecimationFilter;
pub use options::{BlockOption, OptionRange, OptionSet};
pub use settings::{BlockConfig, BlockSettings, ChainSettings, FilterConfig, FilterSettings};
pub use spatial::SpatialFilter;
pub use temporal::TemporalFilter;

use crate::error::{DepthVisError, Result};
use crate::frame::Frame;

/// Borrow the depth samples of `frame` as `(data, width, height)`, checking
/// that the payload covers the declared resolution.
pub(crate) fn depth_input<'a>(block: &'static str, frame: &'a Frame) -> Result<(&'a [u16], usize, usize)> {
    let data = frame.depth_data().ok_or_else(|| DepthVisError::FilterStageFailed {
        block,
        message: format!("{} frame has no depth payload", frame.stream()),
    })?;
    let profile = frame.profile();
    let (width, height) = (profile.width as usize, profile.height as usize);
    if width == 0 || height == 0 || data.len() != width * height {
        return Err(DepthVisError::FilterStageFailed {
            block,
            message: format!(
                "payload has {} samples, profile declares {}x{}",
                data.len(),
                width,
                height
            ),
        });
    }
    Ok((data, width, height))
}
