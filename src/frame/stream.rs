//! Stream identity and calibration types.
//!
//! A stream is identified by the sensor that produced it, the kind of data
//! it carries and an index (for sensors exposing two streams of one kind,
//! such as left/right infrared).

use glam::{Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of data carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamKind {
    Depth,
    Color,
    Infrared,
    Gyro,
    Accel,
    Pose,
}

impl StreamKind {
    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Depth => "Depth",
            StreamKind::Color => "Color",
            StreamKind::Infrared => "Infrared",
            StreamKind::Gyro => "Gyro",
            StreamKind::Accel => "Accel",
            StreamKind::Pose => "Pose",
        }
    }

    /// Whether frames of this kind can texture a point cloud.
    pub fn is_texture_source(self) -> bool {
        matches!(self, StreamKind::Color | StreamKind::Infrared)
    }

    fn code(self) -> u64 {
        match self {
            StreamKind::Depth => 1,
            StreamKind::Color => 2,
            StreamKind::Infrared => 3,
            StreamKind::Gyro => 4,
            StreamKind::Accel => 5,
            StreamKind::Pose => 6,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of an independent data source: (sensor, stream kind, index).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId {
    pub sensor: u32,
    pub kind: StreamKind,
    pub index: u16,
}

impl StreamId {
    pub const fn new(sensor: u32, kind: StreamKind) -> Self {
        Self {
            sensor,
            kind,
            index: 0,
        }
    }

    pub const fn with_index(sensor: u32, kind: StreamKind, index: u16) -> Self {
        Self {
            sensor,
            kind,
            index,
        }
    }

    /// Stable integer key for this stream. Sensor in the high 32 bits,
    /// kind code in bits 16..32, index in the low 16 bits.
    #[inline]
    pub fn uid(self) -> u64 {
        ((self.sensor as u64) << 32) | (self.kind.code() << 16) | self.index as u64
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamId(sensor={}, {}#{})",
            self.sensor, self.kind, self.index
        )
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Pinhole camera intrinsics in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    /// Principal point, x.
    pub ppx: f32,
    /// Principal point, y.
    pub ppy: f32,
    /// Focal length in pixels, x.
    pub fx: f32,
    /// Focal length in pixels, y.
    pub fy: f32,
}

impl Intrinsics {
    /// Intrinsics for an image reduced by an integer factor in both axes.
    pub fn scaled_down(&self, factor: u32) -> Self {
        let f = factor.max(1) as f32;
        Self {
            width: self.width / factor.max(1),
            height: self.height / factor.max(1),
            ppx: self.ppx / f,
            ppy: self.ppy / f,
            fx: self.fx / f,
            fy: self.fy / f,
        }
    }

    /// Back-project pixel `(u, v)` at depth `z` (metres) into camera space.
    #[inline]
    pub fn deproject(&self, u: f32, v: f32, z: f32) -> Vec3 {
        Vec3::new((u - self.ppx) / self.fx * z, (v - self.ppy) / self.fy * z, z)
    }

    /// Project a camera-space point onto the image plane. Returns `None`
    /// for points at or behind the camera.
    #[inline]
    pub fn project(&self, point: Vec3) -> Option<Vec2> {
        if point.z <= f32::EPSILON {
            return None;
        }
        Some(Vec2::new(
            point.x / point.z * self.fx + self.ppx,
            point.y / point.z * self.fy + self.ppy,
        ))
    }
}

/// Rigid transform between two stream coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    /// Column-major 3x3 rotation.
    pub rotation: [f32; 9],
    /// Translation in metres.
    pub translation: [f32; 3],
}

impl Extrinsics {
    pub const IDENTITY: Extrinsics = Extrinsics {
        rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        translation: [0.0, 0.0, 0.0],
    };

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    #[inline]
    pub fn transform(&self, point: Vec3) -> Vec3 {
        Mat3::from_cols_array(&self.rotation) * point + Vec3::from_array(self.translation)
    }
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Format and calibration of the stream a frame belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate. Zero when unknown.
    pub fps: u32,
    pub intrinsics: Option<Intrinsics>,
    /// Transform from the depth stream's coordinates into this stream's.
    pub extrinsics_from_depth: Option<Extrinsics>,
    /// Metres per depth unit (depth streams only).
    pub depth_units: f32,
}

impl StreamProfile {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            intrinsics: None,
            extrinsics_from_depth: None,
            depth_units: 0.001,
        }
    }

    pub fn with_intrinsics(mut self, intrinsics: Intrinsics) -> Self {
        self.intrinsics = Some(intrinsics);
        self
    }

    pub fn with_extrinsics(mut self, extrinsics: Extrinsics) -> Self {
        self.extrinsics_from_depth = Some(extrinsics);
        self
    }

    pub fn with_depth_units(mut self, depth_units: f32) -> Self {
        self.depth_units = depth_units;
        self
    }

    /// Nominal time between frames in milliseconds.
    pub fn nominal_interval_ms(&self) -> Option<f64> {
        (self.fps > 0).then(|| 1000.0 / self.fps as f64)
    }

    /// Number of pixels described by `width * height`.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_distinguishes_streams() {
        let depth = StreamId::new(0, StreamKind::Depth);
        let color = StreamId::new(0, StreamKind::Color);
        let ir_left = StreamId::with_index(0, StreamKind::Infrared, 1);
        let ir_right = StreamId::with_index(0, StreamKind::Infrared, 2);
        let other_sensor = StreamId::new(1, StreamKind::Depth);

        let uids = [
            depth.uid(),
            color.uid(),
            ir_left.uid(),
            ir_right.uid(),
            other_sensor.uid(),
        ];
        for (i, a) in uids.iter().enumerate() {
            for b in &uids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_deproject_project_principal_point() {
        let intr = Intrinsics {
            width: 640,
            height: 480,
            ppx: 320.0,
            ppy: 240.0,
            fx: 600.0,
            fy: 600.0,
        };
        let p = intr.deproject(320.0, 240.0, 2.0);
        assert_eq!(p, Vec3::new(0.0, 0.0, 2.0));

        let uv = intr.project(Vec3::new(0.5, 0.0, 1.0)).unwrap();
        assert!((uv.x - 620.0).abs() < 1e-4);
        assert!(intr.project(Vec3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_scaled_down_intrinsics() {
        let intr = Intrinsics {
            width: 640,
            height: 480,
            ppx: 320.0,
            ppy: 240.0,
            fx: 600.0,
            fy: 600.0,
        };
        let half = intr.scaled_down(2);
        assert_eq!(half.width, 320);
        assert_eq!(half.height, 240);
        assert_eq!(half.fx, 300.0);
    }

    #[test]
    fn test_extrinsics_translation() {
        let ext = Extrinsics::from_translation([0.05, 0.0, 0.0]);
        assert_eq!(ext.transform(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.05, 2.0, 3.0));
    }

    #[test]
    fn test_nominal_interval() {
        assert!((StreamProfile::new(1, 1, 30).nominal_interval_ms().unwrap() - 33.333).abs() < 0.01);
        assert!(StreamProfile::new(1, 1, 0).nominal_interval_ms().is_none());
    }
}
