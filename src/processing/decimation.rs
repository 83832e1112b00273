//! Decimation: reduces resolution by an integer factor.
//!
//! Each `magnitude x magnitude` block of the input collapses to the median
//! of its non-zero samples (zero when the whole block is invalid).
//! Intrinsics are scaled to the new resolution.

use crate::error::{DepthVisError, Result};
use crate::frame::Frame;
use crate::processing::depth_input;
use crate::processing::options::{BlockOption, OptionRange, OptionSet};

pub const MAGNITUDE: &str = "magnitude";

pub const NAME: &str = "Decimation";

pub fn default_options() -> OptionSet {
    OptionSet::new(
        NAME,
        vec![BlockOption::new(
            MAGNITUDE,
            "Block size of the downsampling kernel",
            OptionRange::new(1.0, 8.0, 1.0, 2.0),
        )],
    )
}

/// Decimation block.
#[derive(Debug, Clone)]
pub struct DecimationFilter {
    enabled: bool,
    options: OptionSet,
    scratch: Vec<u16>,
}

impl DecimationFilter {
    pub fn new() -> Self {
        Self {
            enabled: true,
            options: default_options(),
            scratch: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        NAME
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut OptionSet {
        &mut self.options
    }

    pub fn process(&mut self, frame: &Frame) -> Result<Frame> {
        let factor = self.options.value(MAGNITUDE).round().max(1.0) as usize;
        let (data, width, height) = depth_input(NAME, frame)?;
        if factor == 1 {
            return Ok(frame.clone());
        }

        let out_w = width / factor;
        let out_h = height / factor;
        if out_w == 0 || out_h == 0 {
            return Err(DepthVisError::FilterStageFailed {
                block: NAME,
                message: format!(
                    "{}x{} frame is smaller than decimation block {}",
                    width, height, factor
                ),
            });
        }

        let mut out = Vec::with_capacity(out_w * out_h);
        for by in 0..out_h {
            for bx in 0..out_w {
                self.scratch.clear();
                for y in by * factor..(by + 1) * factor {
                    let row = &data[y * width..(y + 1) * width];
                    self.scratch
                        .extend(row[bx * factor..(bx + 1) * factor].iter().filter(|&&d| d != 0));
                }
                out.push(median(&mut self.scratch));
            }
        }

        let mut profile = frame.profile().clone();
        profile.width = out_w as u32;
        profile.height = out_h as u32;
        profile.intrinsics = profile.intrinsics.map(|i| i.scaled_down(factor as u32));
        Ok(frame.derive_depth(profile, out))
    }
}

impl Default for DecimationFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn median(values: &mut [u16]) -> u16 {
    if values.is_empty() {
        return 0;
    }
    let mid = values.len() / 2;
    *values.select_nth_unstable(mid).1
}
