//! Captured frame value types.
//!
//! A [`Frame`] is an immutable, reference-counted handle: cloning it shares
//! the same payload, and the payload is freed when the last handle is
//! dropped. Nothing in the pipeline ever mutates a frame in place; filters
//! produce new frames through [`Frame::derive_depth`].
//!
//! A [`FrameSet`] groups at most one frame per [`StreamId`] and is moved
//! (not shared) between pipeline stages.

pub mod metadata;
pub mod stream;

pub use metadata::{MetadataAttribute, MetadataTable, METADATA_ATTRIBUTE_COUNT};
pub use stream::{Extrinsics, Intrinsics, StreamId, StreamKind, StreamProfile};

use std::fmt;
use std::sync::Arc;

/// Clock a timestamp was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampDomain {
    /// Device hardware clock.
    HardwareClock,
    /// Host system time at arrival.
    SystemTime,
    /// Hardware clock mapped onto host time.
    GlobalTime,
}

/// Capture timestamp in milliseconds, tagged with its clock domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp {
    pub millis: f64,
    pub domain: TimestampDomain,
}

impl Timestamp {
    pub fn hardware(millis: f64) -> Self {
        Self {
            millis,
            domain: TimestampDomain::HardwareClock,
        }
    }

    pub fn system(millis: f64) -> Self {
        Self {
            millis,
            domain: TimestampDomain::SystemTime,
        }
    }

    /// Absolute difference in milliseconds, or `None` across clock domains.
    pub fn distance(&self, other: &Timestamp) -> Option<f64> {
        (self.domain == other.domain).then(|| (self.millis - other.millis).abs())
    }
}

/// Opaque frame payload.
#[derive(Clone, PartialEq)]
pub enum FramePayload {
    /// 16-bit depth samples in device units, row-major.
    Depth16(Vec<u16>),
    /// Packed 8-bit RGB, row-major.
    Rgb8(Vec<u8>),
    /// Motion sample (gyro/accel).
    Motion([f32; 3]),
    /// Anything the pipeline does not interpret.
    Raw(Vec<u8>),
}

impl fmt::Debug for FramePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramePayload::Depth16(d) => write!(f, "Depth16({} samples)", d.len()),
            FramePayload::Rgb8(d) => write!(f, "Rgb8({} bytes)", d.len()),
            FramePayload::Motion(m) => write!(f, "Motion({:?})", m),
            FramePayload::Raw(d) => write!(f, "Raw({} bytes)", d.len()),
        }
    }
}

struct FrameInner {
    stream: StreamId,
    number: u64,
    timestamp: Timestamp,
    metadata: MetadataTable,
    profile: StreamProfile,
    payload: FramePayload,
}

/// Shared handle to one immutable captured sample.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

impl Frame {
    /// Start building a frame for `stream`.
    pub fn builder(stream: StreamId, number: u64) -> FrameBuilder {
        FrameBuilder::new(stream, number)
    }

    #[inline]
    pub fn stream(&self) -> StreamId {
        self.inner.stream
    }

    #[inline]
    pub fn kind(&self) -> StreamKind {
        self.inner.stream.kind
    }

    #[inline]
    pub fn number(&self) -> u64 {
        self.inner.number
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.inner.timestamp
    }

    pub fn metadata(&self) -> &MetadataTable {
        &self.inner.metadata
    }

    pub fn profile(&self) -> &StreamProfile {
        &self.inner.profile
    }

    pub fn payload(&self) -> &FramePayload {
        &self.inner.payload
    }

    pub fn depth_data(&self) -> Option<&[u16]> {
        match &self.inner.payload {
            FramePayload::Depth16(d) => Some(d),
            _ => None,
        }
    }

    pub fn rgb_data(&self) -> Option<&[u8]> {
        match &self.inner.payload {
            FramePayload::Rgb8(d) => Some(d),
            _ => None,
        }
    }

    pub fn nominal_interval_ms(&self) -> Option<f64> {
        self.inner.profile.nominal_interval_ms()
    }

    /// Whether both handles refer to the same underlying frame.
    pub fn ptr_eq(a: &Frame, b: &Frame) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Number of live handles to this frame.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// New frame with the same identity, number, timestamp and metadata but
    /// a replacement depth payload and profile.
    pub fn derive_depth(&self, profile: StreamProfile, data: Vec<u16>) -> Frame {
        Frame {
            inner: Arc::new(FrameInner {
                stream: self.inner.stream,
                number: self.inner.number,
                timestamp: self.inner.timestamp,
                metadata: self.inner.metadata,
                profile,
                payload: FramePayload::Depth16(data),
            }),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("stream", &self.inner.stream)
            .field("number", &self.inner.number)
            .field("timestamp", &self.inner.timestamp)
            .field("payload", &self.inner.payload)
            .finish()
    }
}

/// Builder for [`Frame`].
pub struct FrameBuilder {
    stream: StreamId,
    number: u64,
    timestamp: Timestamp,
    metadata: MetadataTable,
    profile: StreamProfile,
    payload: FramePayload,
}

impl FrameBuilder {
    pub fn new(stream: StreamId, number: u64) -> Self {
        Self {
            stream,
            number,
            timestamp: Timestamp::hardware(0.0),
            metadata: MetadataTable::new(),
            profile: StreamProfile::new(0, 0, 0),
            payload: FramePayload::Raw(Vec::new()),
        }
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn metadata(mut self, metadata: MetadataTable) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn profile(mut self, profile: StreamProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn payload(mut self, payload: FramePayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Frame {
        Frame {
            inner: Arc::new(FrameInner {
                stream: self.stream,
                number: self.number,
                timestamp: self.timestamp,
                metadata: self.metadata,
                profile: self.profile,
                payload: self.payload,
            }),
        }
    }
}

/// Time-correlated group of frames, at most one per stream.
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    frames: Vec<Frame>,
}

impl FrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Singleton set (pass-through synchronization).
    pub fn single(frame: Frame) -> Self {
        Self {
            frames: vec![frame],
        }
    }

    /// Insert a frame, replacing any member of the same stream. Returns the
    /// replaced frame.
    pub fn replace(&mut self, frame: Frame) -> Option<Frame> {
        let stream = frame.stream();
        match self.frames.iter_mut().find(|f| f.stream() == stream) {
            Some(slot) => Some(std::mem::replace(slot, frame)),
            None => {
                self.frames.push(frame);
                None
            }
        }
    }

    pub fn get(&self, stream: StreamId) -> Option<&Frame> {
        self.frames.iter().find(|f| f.stream() == stream)
    }

    pub fn contains(&self, stream: StreamId) -> bool {
        self.get(stream).is_some()
    }

    /// First member of the given kind.
    pub fn first_of(&self, kind: StreamKind) -> Option<&Frame> {
        self.frames.iter().find(|f| f.kind() == kind)
    }

    pub fn depth(&self) -> Option<&Frame> {
        self.first_of(StreamKind::Depth)
    }

    pub fn color(&self) -> Option<&Frame> {
        self.first_of(StreamKind::Color)
    }

    /// First member usable as point cloud texture (color preferred).
    pub fn texture(&self) -> Option<&Frame> {
        self.color()
            .or_else(|| self.frames.iter().find(|f| f.kind().is_texture_source()))
    }

    /// Earliest member timestamp, compared within each member's own value.
    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        self.frames
            .iter()
            .map(|f| f.timestamp())
            .min_by(|a, b| a.millis.total_cmp(&b.millis))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.frames.iter().map(|f| f.stream())
    }
}

impl IntoIterator for FrameSet {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}
