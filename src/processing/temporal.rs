//! Temporal: per-pixel smoothing across consecutive frames.
//!
//! Valid pixels are blended with the previous filtered value when the two
//! are within `smooth_delta`. Invalid (zero) pixels are filled from the
//! last filtered value if the pixel was valid in at least one of the last
//! `persistence` frames. History is kept per stream and is discarded when
//! that stream's resolution changes.

use crate::error::Result;
use crate::frame::{Frame, StreamId};
use crate::processing::depth_input;
use crate::processing::options::{BlockOption, OptionRange, OptionSet};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

pub const SMOOTH_ALPHA: &str = "smooth_alpha";
pub const SMOOTH_DELTA: &str = "smooth_delta";
pub const PERSISTENCE: &str = "persistence";

pub const NAME: &str = "Temporal";

pub fn default_options() -> OptionSet {
    OptionSet::new(
        NAME,
        vec![
            BlockOption::new(
                SMOOTH_ALPHA,
                "Weight of the current frame (1 = no smoothing)",
                OptionRange::new(0.0, 1.0, 0.0, 0.4),
            ),
            BlockOption::new(
                SMOOTH_DELTA,
                "Depth step, in device units, that resets the average",
                OptionRange::new(1.0, 100.0, 1.0, 20.0),
            ),
            BlockOption::new(
                PERSISTENCE,
                "Frames a pixel may stay invalid before it is no longer filled (0 = off)",
                OptionRange::new(0.0, 8.0, 1.0, 3.0),
            ),
        ],
    )
}

#[derive(Debug, Clone)]
struct History {
    width: usize,
    height: usize,
    /// Last filtered value per pixel; 0 = never valid.
    last: Vec<f32>,
    /// Validity of the pixel in recent frames, newest in bit 0.
    valid_bits: Vec<u8>,
}

impl History {
    fn seed(data: &[u16], width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            last: data.iter().map(|&d| d as f32).collect(),
            valid_bits: data.iter().map(|&d| u8::from(d != 0)).collect(),
        }
    }
}

/// Temporal smoothing block. Stateful across frames.
#[derive(Debug, Clone)]
pub struct TemporalFilter {
    enabled: bool,
    options: OptionSet,
    history: HashMap<StreamId, History>,
}

impl TemporalFilter {
    pub fn new() -> Self {
        Self {
            enabled: true,
            options: default_options(),
            history: HashMap::new(),
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

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    /// Forget all accumulated history, for every stream.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn process(&mut self, frame: &Frame) -> Result<Frame> {
        let alpha = self.options.value(SMOOTH_ALPHA);
        let delta = self.options.value(SMOOTH_DELTA);
        let persistence = self.options.value(PERSISTENCE).round().clamp(0.0, 8.0) as u32;
        let (data, width, height) = depth_input(NAME, frame)?;
        let stream = frame.stream();

        let history = match self.history.entry(stream) {
            Entry::Occupied(entry) if entry.get().width == width && entry.get().height == height => {
                entry.into_mut()
            }
            Entry::Occupied(mut entry) => {
                tracing::debug!("Temporal history reset for {} at {}x{}", stream, width, height);
                entry.insert(History::seed(data, width, height));
                return Ok(frame.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(History::seed(data, width, height));
                return Ok(frame.clone());
            }
        };

        let fill_mask = ((1u16 << persistence) - 1) as u8;
        let mut out = Vec::with_capacity(data.len());
        for (i, &d) in data.iter().enumerate() {
            let prev = history.last[i];
            let bits = history.valid_bits[i];
            if d != 0 {
                let cur = d as f32;
                let value = if prev > 0.0 && (cur - prev).abs() < delta {
                    alpha * cur + (1.0 - alpha) * prev
                } else {
                    cur
                };
                history.last[i] = value;
                history.valid_bits[i] = (bits << 1) | 1;
                out.push(value.round() as u16);
            } else {
                history.valid_bits[i] = bits << 1;
                let fill = prev > 0.0 && bits & fill_mask != 0;
                out.push(if fill { prev.round() as u16 } else { 0 });
            }
        }

        Ok(frame.derive_depth(frame.profile().clone(), out))
    }
}

impl Default for TemporalFilter {
    fn default() -> Self {
        Self::new()
    }
}
