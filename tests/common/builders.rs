//! Test data builders for creating frames

use depthvis_rs::frame::{
    Extrinsics, Frame, FramePayload, Intrinsics, StreamId, StreamKind, StreamProfile, Timestamp,
};

pub const DEPTH: StreamId = StreamId::new(0, StreamKind::Depth);
pub const COLOR: StreamId = StreamId::new(1, StreamKind::Color);
pub const INFRARED: StreamId = StreamId::new(0, StreamKind::Infrared);

/// Builder for creating test frames
pub struct FrameBuilder {
    stream: StreamId,
    number: u64,
    millis: Option<f64>,
    width: u32,
    height: u32,
    fps: u32,
    calibrated: bool,
    depth: Option<Vec<u16>>,
}

impl FrameBuilder {
    pub fn new(stream: StreamId, number: u64) -> Self {
        Self {
            stream,
            number,
            millis: None,
            width: 4,
            height: 4,
            fps: 30,
            calibrated: true,
            depth: None,
        }
    }

    /// Hardware timestamp at `millis`
    pub fn at(mut self, millis: f64) -> Self {
        self.millis = Some(millis);
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Drop intrinsics and extrinsics from the profile
    pub fn uncalibrated(mut self) -> Self {
        self.calibrated = false;
        self
    }

    /// Explicit depth samples (row-major)
    pub fn depth(mut self, data: Vec<u16>) -> Self {
        self.depth = Some(data);
        self
    }

    pub fn build(self) -> Frame {
        let pixels = (self.width * self.height) as usize;
        let mut profile = StreamProfile::new(self.width, self.height, self.fps);
        if self.calibrated {
            profile = profile.with_intrinsics(Intrinsics {
                width: self.width,
                height: self.height,
                ppx: self.width as f32 / 2.0,
                ppy: self.height as f32 / 2.0,
                fx: self.width as f32,
                fy: self.width as f32,
            });
            if self.stream.kind != StreamKind::Depth {
                profile = profile.with_extrinsics(Extrinsics::from_translation([0.0; 3]));
            }
        }

        let payload = match self.stream.kind {
            StreamKind::Depth => FramePayload::Depth16(self.depth.unwrap_or_else(|| vec![1000; pixels])),
            StreamKind::Color => FramePayload::Rgb8(vec![128; pixels * 3]),
            _ => FramePayload::Raw(vec![0; pixels]),
        };

        let mut builder = Frame::builder(self.stream, self.number)
            .profile(profile)
            .payload(payload);
        if let Some(millis) = self.millis {
            builder = builder.timestamp(Timestamp::hardware(millis));
        }
        builder.build()
    }
}

/// Depth frame `number` at the nominal 30 fps timestamp
pub fn depth_frame(number: u64) -> Frame {
    FrameBuilder::new(DEPTH, number)
        .at(number as f64 * 1000.0 / 30.0)
        .build()
}

/// Color frame `number`, `offset_ms` after the matching depth frame
pub fn color_frame(number: u64, offset_ms: f64) -> Frame {
    FrameBuilder::new(COLOR, number)
        .at(number as f64 * 1000.0 / 30.0 + offset_ms)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::new(DEPTH, 3).size(2, 3).at(10.0).build();
        assert_eq!(frame.number(), 3);
        assert_eq!(frame.depth_data().unwrap().len(), 6);
        assert_eq!(frame.timestamp().millis, 10.0);
    }
}
