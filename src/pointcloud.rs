//! Depth-to-3D mapping.
//!
//! [`PointCloudMapper`] deprojects every valid depth sample through the
//! pinhole model of its stream and, when a calibrated texture frame is
//! available, attaches normalised texture coordinates to each vertex.

use crate::error::{DepthVisError, Result};
use crate::frame::{Frame, FrameSet, StreamId, Timestamp};
use glam::{Vec2, Vec3};
use std::collections::BTreeSet;

/// 3-D points derived from one depth frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    /// Camera-space positions in metres.
    pub vertices: Vec<Vec3>,
    /// Per-vertex texture coordinates in [0, 1], when a texture was mapped.
    /// Points that project outside the texture lie outside that range.
    pub tex_coords: Option<Vec<Vec2>>,
    pub source_frame: u64,
    pub source_stream: StreamId,
    pub timestamp: Timestamp,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn has_texture(&self) -> bool {
        self.tex_coords.is_some()
    }

    /// Axis-aligned bounding box as `(min, max)`.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v))),
        )
    }
}

/// Converts depth frames into point clouds. Keeps scratch buffers and the
/// last texture frame between calls.
#[derive(Debug, Default)]
pub struct PointCloudMapper {
    vertices: Vec<Vec3>,
    tex_coords: Vec<Vec2>,
    last_texture: Option<Frame>,
}

impl PointCloudMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `frame` as the texture for sets that carry none.
    pub fn update_texture(&mut self, frame: &Frame) {
        self.last_texture = Some(frame.clone());
    }

    pub fn last_texture(&self) -> Option<&Frame> {
        self.last_texture.as_ref()
    }

    pub fn reset(&mut self) {
        self.last_texture = None;
    }

    /// Map the depth member of `frames`. The set's own texture member is
    /// preferred; otherwise the last texture is reused. Either way the
    /// texture stream must be in `active` (an empty `active` set means
    /// unrestricted).
    pub fn map_frameset(&mut self, frames: &FrameSet, active: &BTreeSet<StreamId>) -> Result<PointCloud> {
        let depth = frames.depth().ok_or_else(|| {
            DepthVisError::MappingUnavailable("frame set has no depth member".to_string())
        })?;
        let is_active = |stream: StreamId| active.is_empty() || active.contains(&stream);

        if let Some(texture) = frames.texture().filter(|t| is_active(t.stream())) {
            self.update_texture(texture);
        } else if let Some(last) = &self.last_texture {
            if !is_active(last.stream()) {
                tracing::debug!("Dropping texture of inactive stream {}", last.stream());
                self.last_texture = None;
            }
        }

        let texture = self.last_texture.clone();
        self.map(depth, texture.as_ref())
    }

    /// Deproject `depth` and, if `texture` is calibrated against it,
    /// compute per-vertex texture coordinates.
    pub fn map(&mut self, depth: &Frame, texture: Option<&Frame>) -> Result<PointCloud> {
        let data = depth.depth_data().ok_or_else(|| {
            DepthVisError::MappingUnavailable(format!("{} carries no depth payload", depth.stream()))
        })?;
        let profile = depth.profile();
        let intrinsics = profile.intrinsics.ok_or_else(|| {
            DepthVisError::MappingUnavailable(format!("{} has no intrinsics", depth.stream()))
        })?;
        let width = profile.width as usize;
        if width == 0 || data.len() != width * profile.height as usize {
            return Err(DepthVisError::MappingUnavailable(format!(
                "payload has {} samples, profile declares {}x{}",
                data.len(),
                profile.width,
                profile.height
            )));
        }

        self.vertices.clear();
        for (i, &d) in data.iter().enumerate() {
            if d == 0 {
                continue;
            }
            let z = d as f32 * profile.depth_units;
            let (u, v) = ((i % width) as f32, (i / width) as f32);
            self.vertices.push(intrinsics.deproject(u, v, z));
        }

        let tex_coords = texture.and_then(|t| self.texture_coordinates(t));

        Ok(PointCloud {
            vertices: self.vertices.clone(),
            tex_coords,
            source_frame: depth.number(),
            source_stream: depth.stream(),
            timestamp: depth.timestamp(),
        })
    }

    fn texture_coordinates(&mut self, texture: &Frame) -> Option<Vec<Vec2>> {
        let profile = texture.profile();
        let (Some(intrinsics), Some(extrinsics)) = (profile.intrinsics, profile.extrinsics_from_depth) else {
            tracing::trace!("Texture {} is not calibrated against depth", texture.stream());
            return None;
        };
        if intrinsics.width == 0 || intrinsics.height == 0 {
            return None;
        }
        let size = Vec2::new(intrinsics.width as f32, intrinsics.height as f32);

        self.tex_coords.clear();
        self.tex_coords.extend(self.vertices.iter().map(|&p| {
            intrinsics
                .project(extrinsics.transform(p))
                .map_or(Vec2::NEG_ONE, |pixel| pixel / size)
        }));
        Some(self.tex_coords.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Extrinsics, FramePayload, Intrinsics, StreamKind, StreamProfile};

    fn intrinsics(width: u32, height: u32) -> Intrinsics {
        Intrinsics {
            width,
            height,
            ppx: 1.0,
            ppy: 1.0,
            fx: 2.0,
            fy: 2.0,
        }
    }

    fn depth(data: Vec<u16>) -> Frame {
        Frame::builder(StreamId::new(0, StreamKind::Depth), 9)
            .profile(StreamProfile::new(2, 2, 30).with_intrinsics(intrinsics(2, 2)))
            .payload(FramePayload::Depth16(data))
            .build()
    }

    fn color(calibrated: bool) -> Frame {
        let mut profile = StreamProfile::new(4, 4, 30);
        if calibrated {
            profile = profile
                .with_intrinsics(Intrinsics {
                    width: 4,
                    height: 4,
                    ppx: 2.0,
                    ppy: 2.0,
                    fx: 4.0,
                    fy: 4.0,
                })
                .with_extrinsics(Extrinsics::IDENTITY);
        }
        Frame::builder(StreamId::new(0, StreamKind::Color), 3)
            .profile(profile)
            .payload(FramePayload::Rgb8(vec![0; 48]))
            .build()
    }

    #[test]
    fn test_deprojection() {
        let mut mapper = PointCloudMapper::new();
        let cloud = mapper.map(&depth(vec![1000, 0, 0, 2000]), None).unwrap();
        assert_eq!(cloud.len(), 2);
        // (0,0) at 1 m: x = (0 - 1) / 2 * 1
        assert_eq!(cloud.vertices[0], Vec3::new(-0.5, -0.5, 1.0));
        // (1,1) at 2 m sits on the principal point.
        assert_eq!(cloud.vertices[1], Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(cloud.source_frame, 9);
        assert!(!cloud.has_texture());
    }

    #[test]
    fn test_zero_depth_produces_no_vertices() {
        let mut mapper = PointCloudMapper::new();
        let cloud = mapper.map(&depth(vec![0; 4]), None).unwrap();
        assert!(cloud.is_empty());
        assert!(cloud.bounds().is_none());
    }

    #[test]
    fn test_bounds() {
        let mut mapper = PointCloudMapper::new();
        let cloud = mapper.map(&depth(vec![1000, 0, 0, 2000]), None).unwrap();
        let (lo, hi) = cloud.bounds().unwrap();
        assert_eq!(lo, Vec3::new(-0.5, -0.5, 1.0));
        assert_eq!(hi, Vec3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn test_texture_coordinates() {
        let mut mapper = PointCloudMapper::new();
        let cloud = mapper.map(&depth(vec![0, 0, 0, 1000]), Some(&color(true))).unwrap();
        let uv = cloud.tex_coords.unwrap();
        // On-axis point lands on the texture's principal point.
        assert_eq!(uv, vec![Vec2::new(0.5, 0.5)]);
    }

    #[test]
    fn test_uncalibrated_texture_skipped() {
        let mut mapper = PointCloudMapper::new();
        let cloud = mapper.map(&depth(vec![1000; 4]), Some(&color(false))).unwrap();
        assert!(!cloud.has_texture());
    }

    #[test]
    fn test_missing_intrinsics_unavailable() {
        let mut mapper = PointCloudMapper::new();
        let frame = Frame::builder(StreamId::new(0, StreamKind::Depth), 1)
            .profile(StreamProfile::new(2, 2, 30))
            .payload(FramePayload::Depth16(vec![1; 4]))
            .build();
        assert!(matches!(
            mapper.map(&frame, None),
            Err(DepthVisError::MappingUnavailable(_))
        ));
    }

    #[test]
    fn test_frameset_without_depth() {
        let mut mapper = PointCloudMapper::new();
        let set = FrameSet::single(color(true));
        assert!(mapper.map_frameset(&set, &BTreeSet::new()).is_err());
        // Nothing is remembered from a set that could not be mapped.
        assert!(mapper.last_texture().is_none());
    }

    #[test]
    fn test_last_texture_reused_while_active() {
        let mut mapper = PointCloudMapper::new();
        let mut set = FrameSet::single(depth(vec![1000; 4]));
        set.replace(color(true));
        mapper.map_frameset(&set, &BTreeSet::new()).unwrap();

        let bare = FrameSet::single(depth(vec![1000; 4]));
        let active: BTreeSet<_> = [StreamId::new(0, StreamKind::Depth), StreamId::new(0, StreamKind::Color)]
            .into_iter()
            .collect();
        assert!(mapper.map_frameset(&bare, &active).unwrap().has_texture());

        let depth_only: BTreeSet<_> = [StreamId::new(0, StreamKind::Depth)].into_iter().collect();
        assert!(!mapper.map_frameset(&bare, &depth_only).unwrap().has_texture());
        assert!(mapper.last_texture().is_none());

        mapper.update_texture(&color(true));
        mapper.reset();
        assert!(mapper.last_texture().is_none());
    }
}
