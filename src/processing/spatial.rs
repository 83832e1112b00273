//! Spatial: edge-preserving smoothing.
//!
//! A recursive exponential filter runs along every row in both directions,
//! then along every column in both directions. The recursion is broken
//! where either neighbour is invalid (zero) or where neighbours differ by
//! `smooth_delta` or more, so depth edges survive.

use crate::error::Result;
use crate::frame::Frame;
use crate::processing::depth_input;
use crate::processing::options::{BlockOption, OptionRange, OptionSet};

pub const SMOOTH_ALPHA: &str = "smooth_alpha";
pub const SMOOTH_DELTA: &str = "smooth_delta";
pub const ITERATIONS: &str = "iterations";

pub const NAME: &str = "Spatial";

pub fn default_options() -> OptionSet {
    OptionSet::new(
        NAME,
        vec![
            BlockOption::new(
                SMOOTH_ALPHA,
                "Weight of the current sample (1 = no smoothing)",
                OptionRange::new(0.25, 1.0, 0.0, 0.5),
            ),
            BlockOption::new(
                SMOOTH_DELTA,
                "Depth step, in device units, treated as an edge",
                OptionRange::new(1.0, 50.0, 1.0, 20.0),
            ),
            BlockOption::new(
                ITERATIONS,
                "Number of filter passes",
                OptionRange::new(1.0, 5.0, 1.0, 2.0),
            ),
        ],
    )
}

/// Spatial smoothing block. Keeps a float scratch buffer between frames.
#[derive(Debug, Clone)]
pub struct SpatialFilter {
    enabled: bool,
    options: OptionSet,
    buffer: Vec<f32>,
}

impl SpatialFilter {
    pub fn new() -> Self {
        Self {
            enabled: true,
            options: default_options(),
            buffer: Vec::new(),
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
        let alpha = self.options.value(SMOOTH_ALPHA);
        let delta = self.options.value(SMOOTH_DELTA);
        let iterations = self.options.value(ITERATIONS).round().max(1.0) as usize;
        let (data, width, height) = depth_input(NAME, frame)?;

        self.buffer.clear();
        self.buffer.extend(data.iter().map(|&d| d as f32));

        for _ in 0..iterations {
            for y in 0..height {
                let row = &mut self.buffer[y * width..(y + 1) * width];
                smooth_line(row.iter_mut(), alpha, delta);
                smooth_line(row.iter_mut().rev(), alpha, delta);
            }
            for x in 0..width {
                smooth_line(self.buffer.iter_mut().skip(x).step_by(width), alpha, delta);
                smooth_line(
                    self.buffer.iter_mut().skip(x).step_by(width).rev(),
                    alpha,
                    delta,
                );
            }
        }

        let out = self
            .buffer
            .iter()
            .zip(data)
            // Invalid input pixels stay invalid.
            .map(|(&v, &orig)| if orig == 0 { 0 } else { v.round() as u16 })
            .collect();
        Ok(frame.derive_depth(frame.profile().clone(), out))
    }
}

impl Default for SpatialFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn smooth_line<'a>(line: impl Iterator<Item = &'a mut f32>, alpha: f32, delta: f32) {
    let mut prev: Option<f32> = None;
    for value in line {
        let cur = *value;
        if let Some(p) = prev {
            if cur > 0.0 && p > 0.0 && (cur - p).abs() < delta {
                *value = alpha * cur + (1.0 - alpha) * p;
            }
        }
        prev = Some(*value);
    }
}
