//! Multi-stream frame synchronizer.
//!
//! Frames from independently clocked streams arrive interleaved. The
//! synchronizer keeps one pending set with at most one frame per stream and
//! emits it as a [`FrameSet`] when:
//!
//! - it holds a frame for every expected stream (complete), or
//! - a frame arrives that does not correlate with the pending members, or
//! - the staleness timeout has elapsed since its oldest member arrived.
//!
//! The last two cases emit a partial set rather than waiting on a lagging
//! stream. With synchronization disabled every frame passes straight
//! through as a singleton set.
//!
//! Two frames correlate when their timestamps (same clock domain) differ by
//! less than `tolerance_fraction` of the shorter nominal frame interval. If
//! timestamps are not comparable, frame numbers are compared after removing
//! each stream's starting offset.

use crate::error::{DepthVisError, Result};
use crate::frame::{Frame, FrameSet, StreamId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Default staleness timeout for a pending set, in milliseconds.
pub const DEFAULT_STALENESS_TIMEOUT_MS: f64 = 100.0;

/// Default fraction of the shorter nominal interval used as match tolerance.
pub const DEFAULT_TOLERANCE_FRACTION: f64 = 0.5;

/// Default frame-number distance accepted by the fallback predicate.
pub const DEFAULT_FRAME_NUMBER_TOLERANCE: u64 = 2;

/// Synchronizer tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// When false, every frame is emitted immediately as a singleton set.
    pub enabled: bool,
    /// Maximum age of a pending set before it is emitted partially.
    pub staleness_timeout_ms: f64,
    /// Timestamp tolerance as a fraction of the shorter nominal interval.
    pub tolerance_fraction: f64,
    /// Frame-number tolerance used when timestamps are not comparable.
    pub frame_number_tolerance: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            staleness_timeout_ms: DEFAULT_STALENESS_TIMEOUT_MS,
            tolerance_fraction: DEFAULT_TOLERANCE_FRACTION,
            frame_number_tolerance: DEFAULT_FRAME_NUMBER_TOLERANCE,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.staleness_timeout_ms.is_finite() && self.staleness_timeout_ms > 0.0) {
            return Err(DepthVisError::InvalidConfig(format!(
                "staleness_timeout_ms must be positive, got {}",
                self.staleness_timeout_ms
            )));
        }
        if !(self.tolerance_fraction > 0.0 && self.tolerance_fraction <= 1.0) {
            return Err(DepthVisError::InvalidConfig(format!(
                "tolerance_fraction must be in (0, 1], got {}",
                self.tolerance_fraction
            )));
        }
        Ok(())
    }

    /// Check the staleness timeout against the nominal intervals of the
    /// active streams. A timeout shorter than one frame interval would emit
    /// every set partially.
    pub fn validate_against_intervals(&self, intervals_ms: &[f64]) -> Result<()> {
        self.validate()?;
        if let Some(longest) = intervals_ms.iter().copied().reduce(f64::max) {
            if self.staleness_timeout_ms < longest {
                return Err(DepthVisError::InvalidConfig(format!(
                    "staleness_timeout_ms {} is shorter than the longest frame interval {:.1}",
                    self.staleness_timeout_ms, longest
                )));
            }
        }
        Ok(())
    }

    fn staleness_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.staleness_timeout_ms / 1000.0)
    }
}

/// Counters describing what the synchronizer has done since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounters {
    /// Sets emitted with every expected stream present. Neither this nor
    /// `partial` moves while synchronization is disabled.
    pub complete: u64,
    /// Sets emitted with some expected stream missing.
    pub partial: u64,
    /// Frames displaced by a newer frame of the same stream.
    pub replaced: u64,
    /// Frames discarded because they were older than what was already seen.
    pub stale_dropped: u64,
}

struct Pending {
    frames: FrameSet,
    /// Arrival time of each member.
    arrived: HashMap<StreamId, Instant>,
}

impl Pending {
    fn open(frame: Frame, now: Instant) -> Self {
        let arrived = HashMap::from([(frame.stream(), now)]);
        Self {
            frames: FrameSet::single(frame),
            arrived,
        }
    }

    /// Add or replace the member of `frame`'s stream.
    fn insert(&mut self, frame: Frame, now: Instant) -> Option<Frame> {
        self.arrived.insert(frame.stream(), now);
        self.frames.replace(frame)
    }

    fn retain(&mut self, streams: &BTreeSet<StreamId>) {
        self.arrived.retain(|s, _| streams.contains(s));
        self.frames = std::mem::replace(&mut self.frames, FrameSet::new())
            .into_iter()
            .filter(|f| streams.contains(&f.stream()))
            .fold(FrameSet::new(), |mut set, f| {
                set.replace(f);
                set
            });
    }

    /// Time since the oldest member arrived.
    fn age(&self, now: Instant) -> Duration {
        self.arrived
            .values()
            .map(|&at| now.saturating_duration_since(at))
            .max()
            .unwrap_or_default()
    }
}

/// Where an incoming frame goes relative to the pending set.
enum Placement {
    /// No pending set: the frame opens one.
    Open,
    /// Correlates with every other member: join (replacing its own stream).
    Join,
    /// Does not correlate: close the pending set and open a new one.
    Split,
    /// Older than the pending frame of its own stream.
    Discard,
}

/// Groups a flat stream of frames into time-correlated frame sets.
pub struct Synchronizer {
    config: SyncConfig,
    /// Streams a set must contain to be complete. Empty means "every
    /// stream seen since the last reset".
    expected: BTreeSet<StreamId>,
    seen: BTreeSet<StreamId>,
    pending: Option<Pending>,
    start_offsets: HashMap<StreamId, u64>,
    last_emitted: HashMap<StreamId, u64>,
    counters: SyncCounters,
}

impl Synchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            expected: BTreeSet::new(),
            seen: BTreeSet::new(),
            pending: None,
            start_offsets: HashMap::new(),
            last_emitted: HashMap::new(),
            counters: SyncCounters::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Toggle synchronization. Disabling flushes nothing: the caller should
    /// `flush()` first if a pending set must not be lost.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.config.enabled != enabled {
            tracing::debug!("Synchronization {}", if enabled { "enabled" } else { "disabled" });
        }
        self.config.enabled = enabled;
    }

    /// Replace the expected stream set. Pending members of streams that are
    /// no longer expected are released.
    pub fn set_expected_streams(&mut self, streams: BTreeSet<StreamId>) {
        if !streams.is_empty() {
            if let Some(mut pending) = self.pending.take() {
                pending.retain(&streams);
                if !pending.frames.is_empty() {
                    self.pending = Some(pending);
                }
            }
            self.seen.retain(|s| streams.contains(s));
        }
        self.expected = streams;
    }

    pub fn expected_streams(&self) -> &BTreeSet<StreamId> {
        if self.expected.is_empty() {
            &self.seen
        } else {
            &self.expected
        }
    }

    pub fn counters(&self) -> SyncCounters {
        self.counters
    }

    /// Number of frames in the pending set.
    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, |p| p.frames.len())
    }

    /// Feed one frame that arrived at `now`. Returns every set that became
    /// ready, oldest first.
    pub fn push(&mut self, frame: Frame, now: Instant) -> Vec<FrameSet> {
        let stream = frame.stream();
        let mut ready = Vec::new();

        // Expire first so the ordering check sees what that emission recorded.
        if self.config.enabled {
            if let Some(set) = self.take_if_stale(now) {
                self.emit_into(set, &mut ready);
            }
        }

        if let Some(&last) = self.last_emitted.get(&stream) {
            if frame.number() < last {
                tracing::trace!(
                    "Dropping out-of-order frame {} of {} (last emitted {})",
                    frame.number(),
                    stream,
                    last
                );
                self.counters.stale_dropped += 1;
                return ready;
            }
        }
        self.start_offsets.entry(stream).or_insert(frame.number());
        self.seen.insert(stream);

        if !self.config.enabled {
            self.emit_into(FrameSet::single(frame), &mut ready);
            return ready;
        }

        let placement = match self.pending.as_ref() {
            None => Placement::Open,
            Some(pending) => {
                let older = pending
                    .frames
                    .get(stream)
                    .is_some_and(|existing| frame.number() < existing.number());
                if older {
                    Placement::Discard
                } else if pending
                    .frames
                    .iter()
                    .filter(|member| member.stream() != stream)
                    .all(|member| self.correlates(member, &frame))
                {
                    Placement::Join
                } else {
                    Placement::Split
                }
            }
        };

        match placement {
            Placement::Discard => {
                self.counters.stale_dropped += 1;
                return ready;
            }
            Placement::Open => {
                self.pending = Some(Pending::open(frame, now));
            }
            Placement::Join => {
                if let Some(pending) = self.pending.as_mut() {
                    if pending.insert(frame, now).is_some() {
                        self.counters.replaced += 1;
                    }
                }
            }
            Placement::Split => {
                let closed = self.pending.replace(Pending::open(frame, now));
                if let Some(closed) = closed {
                    self.emit_into(closed.frames, &mut ready);
                }
            }
        }

        if self.pending_is_complete() {
            if let Some(pending) = self.pending.take() {
                self.emit_into(pending.frames, &mut ready);
            }
        }
        ready
    }

    /// Emit the pending set if it is complete or has gone stale at `now`.
    pub fn poll_ready(&mut self, now: Instant) -> Option<FrameSet> {
        let set = if self.pending_is_complete() {
            self.pending.take().map(|p| p.frames)
        } else {
            self.take_if_stale(now)
        };
        let set = set?;
        let mut ready = Vec::with_capacity(1);
        self.emit_into(set, &mut ready);
        ready.pop()
    }

    /// Emit whatever is pending, complete or not.
    pub fn flush(&mut self) -> Option<FrameSet> {
        let set = self.pending.take()?.frames;
        let mut ready = Vec::with_capacity(1);
        self.emit_into(set, &mut ready);
        ready.pop()
    }

    /// Forget all in-progress state: pending set, seen streams, offsets and
    /// per-stream ordering history. Counters and configuration are kept.
    pub fn reset(&mut self) {
        self.pending = None;
        self.seen.clear();
        self.start_offsets.clear();
        self.last_emitted.clear();
    }

    /// Matching predicate between two frames of different streams.
    pub fn correlates(&self, a: &Frame, b: &Frame) -> bool {
        let intervals = a.nominal_interval_ms().zip(b.nominal_interval_ms());
        match (a.timestamp().distance(&b.timestamp()), intervals) {
            (Some(distance), Some((ia, ib))) => {
                distance < self.config.tolerance_fraction * ia.min(ib)
            }
            _ => {
                let rel = |f: &Frame| {
                    let offset = self.start_offsets.get(&f.stream()).copied().unwrap_or(0);
                    f.number().saturating_sub(offset)
                };
                rel(a).abs_diff(rel(b)) <= self.config.frame_number_tolerance
            }
        }
    }

    fn pending_is_complete(&self) -> bool {
        let Some(pending) = self.pending.as_ref() else {
            return false;
        };
        let expected = self.expected_streams();
        !expected.is_empty() && expected.iter().all(|s| pending.frames.contains(*s))
    }

    fn take_if_stale(&mut self, now: Instant) -> Option<FrameSet> {
        let timeout = self.config.staleness_timeout();
        let stale = self
            .pending
            .as_ref()
            .is_some_and(|p| p.age(now) >= timeout);
        if stale {
            self.pending.take().map(|p| p.frames)
        } else {
            None
        }
    }

    fn emit_into(&mut self, set: FrameSet, ready: &mut Vec<FrameSet>) {
        // Pass-through singletons are neither complete nor partial.
        if self.config.enabled {
            let (complete, expected_len) = {
                let expected = self.expected_streams();
                (expected.iter().all(|s| set.contains(*s)), expected.len())
            };
            if complete {
                self.counters.complete += 1;
            } else {
                self.counters.partial += 1;
                tracing::trace!("Emitting partial frame set ({} of {})", set.len(), expected_len);
            }
        }
        for frame in set.iter() {
            self.last_emitted.insert(frame.stream(), frame.number());
        }
        ready.push(set);
    }
}
