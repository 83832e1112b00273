//! Synthetic frame source.
//!
//! Produces an interleaved depth + color stream with calibrated profiles,
//! so the pipeline can be driven without hardware. The depth scene is a
//! tilted plane with a moving hemispherical bump and a band of dropped
//! samples; the color stream runs on its own clock with a fixed offset.

use crate::frame::{
    Extrinsics, Frame, FramePayload, Intrinsics, MetadataAttribute, MetadataTable, StreamId,
    StreamKind, StreamProfile, Timestamp,
};

/// Shape of the generated streams.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub depth_fps: u32,
    pub color_fps: u32,
    /// Color clock offset relative to depth, in milliseconds.
    pub color_offset_ms: f64,
    /// Baseline between the depth and color sensors, in metres.
    pub baseline_m: f32,
    /// Generate a color stream at all.
    pub color: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            depth_fps: 30,
            color_fps: 30,
            color_offset_ms: 4.0,
            baseline_m: 0.015,
            color: true,
        }
    }
}

/// Deterministic generator of depth and color frames.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    config: SyntheticConfig,
    depth_stream: StreamId,
    color_stream: StreamId,
    depth_profile: StreamProfile,
    color_profile: StreamProfile,
    depth_number: u64,
    color_number: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let intrinsics = Intrinsics {
            width: config.width,
            height: config.height,
            ppx: config.width as f32 / 2.0,
            ppy: config.height as f32 / 2.0,
            fx: config.width as f32,
            fy: config.width as f32,
        };
        let depth_profile =
            StreamProfile::new(config.width, config.height, config.depth_fps).with_intrinsics(intrinsics);
        let color_profile = StreamProfile::new(config.width, config.height, config.color_fps)
            .with_intrinsics(intrinsics)
            .with_extrinsics(Extrinsics::from_translation([-config.baseline_m, 0.0, 0.0]));

        Self {
            config,
            depth_stream: StreamId::new(0, StreamKind::Depth),
            color_stream: StreamId::new(1, StreamKind::Color),
            depth_profile,
            color_profile,
            depth_number: 0,
            color_number: 0,
        }
    }

    pub fn depth_stream(&self) -> StreamId {
        self.depth_stream
    }

    pub fn color_stream(&self) -> StreamId {
        self.color_stream
    }

    /// Every stream this source generates.
    pub fn streams(&self) -> Vec<StreamId> {
        let mut streams = vec![self.depth_stream];
        if self.config.color {
            streams.push(self.color_stream);
        }
        streams
    }

    fn depth_time_ms(&self, number: u64) -> f64 {
        number as f64 * 1000.0 / self.config.depth_fps.max(1) as f64
    }

    fn color_time_ms(&self, number: u64) -> f64 {
        number as f64 * 1000.0 / self.config.color_fps.max(1) as f64 + self.config.color_offset_ms
    }

    /// Next frame in timestamp order across both streams.
    pub fn next_frame(&mut self) -> Frame {
        let color_due = self.config.color
            && self.color_time_ms(self.color_number + 1) < self.depth_time_ms(self.depth_number + 1);
        if color_due {
            self.next_color()
        } else {
            self.next_depth()
        }
    }

    pub fn next_depth(&mut self) -> Frame {
        self.depth_number += 1;
        let number = self.depth_number;
        let t = self.depth_time_ms(number);
        let (w, h) = (self.config.width as usize, self.config.height as usize);

        // Bump centre sweeps left to right once per 90 frames.
        let phase = (number % 90) as f32 / 90.0;
        let (cx, cy) = (phase * w as f32, h as f32 / 2.0);
        let radius = h as f32 / 3.0;
        let hole_row = (number as usize * 3) % h.max(1);

        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                if y == hole_row && x % 2 == 0 {
                    data.push(0);
                    continue;
                }
                let plane = 1500.0 + 4.0 * y as f32;
                let (dx, dy) = (x as f32 - cx, y as f32 - cy);
                let r2 = radius * radius - dx * dx - dy * dy;
                let bump = if r2 > 0.0 { 8.0 * r2.sqrt() } else { 0.0 };
                // Small deterministic ripple stands in for sensor noise.
                let ripple = ((x * 7 + y * 13 + number as usize) % 5) as f32;
                data.push((plane - bump + ripple) as u16);
            }
        }

        Frame::builder(self.depth_stream, number)
            .timestamp(Timestamp::hardware(t))
            .metadata(self.metadata(number, t, self.config.depth_fps))
            .profile(self.depth_profile.clone())
            .payload(FramePayload::Depth16(data))
            .build()
    }

    pub fn next_color(&mut self) -> Frame {
        self.color_number += 1;
        let number = self.color_number;
        let t = self.color_time_ms(number);
        let (w, h) = (self.config.width as usize, self.config.height as usize);

        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                data.push((x * 255 / w.max(1)) as u8);
                data.push((y * 255 / h.max(1)) as u8);
                data.push((number % 256) as u8);
            }
        }

        Frame::builder(self.color_stream, number)
            .timestamp(Timestamp::hardware(t))
            .metadata(self.metadata(number, t, self.config.color_fps))
            .profile(self.color_profile.clone())
            .payload(FramePayload::Rgb8(data))
            .build()
    }

    fn metadata(&self, number: u64, t: f64, fps: u32) -> MetadataTable {
        MetadataTable::new()
            .with(MetadataAttribute::FrameCounter, number as i64)
            .with(MetadataAttribute::FrameTimestamp, (t * 1000.0) as i64)
            .with(MetadataAttribute::ActualFps, fps as i64)
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaves_in_timestamp_order() {
        let mut source = SyntheticSource::default();
        let frames: Vec<_> = (0..10).map(|_| source.next_frame()).collect();
        for pair in frames.windows(2) {
            assert!(pair[0].timestamp().millis <= pair[1].timestamp().millis);
        }
        assert!(frames.iter().any(|f| f.kind() == StreamKind::Depth));
        assert!(frames.iter().any(|f| f.kind() == StreamKind::Color));
    }

    #[test]
    fn test_depth_frame_shape() {
        let mut source = SyntheticSource::default();
        let frame = source.next_depth();
        let data = frame.depth_data().unwrap();
        assert_eq!(data.len(), 64 * 48);
        assert!(data.iter().any(|&d| d == 0));
        assert!(data.iter().filter(|&&d| d != 0).all(|&d| d > 1000));
        assert!(frame.profile().intrinsics.is_some());
        assert_eq!(frame.metadata().get(MetadataAttribute::FrameCounter), Some(1));
    }

    #[test]
    fn test_depth_only() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            color: false,
            ..SyntheticConfig::default()
        });
        assert_eq!(source.streams().len(), 1);
        assert!((0..5).all(|_| source.next_frame().kind() == StreamKind::Depth));
    }

    #[test]
    fn test_color_is_calibrated() {
        let mut source = SyntheticSource::default();
        let color = source.next_color();
        assert!(color.profile().extrinsics_from_depth.is_some());
        assert_eq!(color.rgb_data().unwrap().len(), 64 * 48 * 3);
    }
}
