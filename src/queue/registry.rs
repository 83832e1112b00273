//! Per-stream frame queues keyed by stream uid.
//!
//! The registry is owned by a pipeline instance and shared with `Arc`; it
//! is never process-global, so independent pipelines (and tests) cannot
//! see each other's queues. Lookup and registration go through one coarse
//! lock, while each queue keeps its own lock for push/poll.
//!
//! The registry also tracks which streams are currently active. The
//! synchronizer uses that set to decide when a frame set is complete.

use crate::frame::{Frame, StreamId};
use crate::queue::{BoundedQueue, OverflowPolicy};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct RegistryInner {
    queues: HashMap<u64, Arc<BoundedQueue<Frame>>>,
    active: BTreeSet<StreamId>,
}

/// Lazily-populated map from stream uid to its frame queue.
pub struct FrameQueueRegistry {
    inner: Mutex<RegistryInner>,
    queue_capacity: usize,
    generation: AtomicU64,
}

impl FrameQueueRegistry {
    /// `queue_capacity` is the slot count of every queue this registry
    /// creates. A zero capacity is raised to one.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            queue_capacity: queue_capacity.max(1),
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn new_queue(&self) -> Arc<BoundedQueue<Frame>> {
        Arc::new(BoundedQueue::with_min_capacity(
            self.queue_capacity,
            OverflowPolicy::DropOldest,
        ))
    }

    /// Queue for `uid`, created on first reference.
    pub fn at(&self, uid: u64) -> Arc<BoundedQueue<Frame>> {
        let mut inner = self.lock();
        inner
            .queues
            .entry(uid)
            .or_insert_with(|| self.new_queue())
            .clone()
    }

    /// Queue for `uid` only if it already exists.
    pub fn get(&self, uid: u64) -> Option<Arc<BoundedQueue<Frame>>> {
        self.lock().queues.get(&uid).cloned()
    }

    /// Visit every registered queue under a single lock scope.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(u64, &BoundedQueue<Frame>),
    {
        let inner = self.lock();
        for (uid, queue) in &inner.queues {
            visitor(*uid, queue);
        }
    }

    /// Drop the queue for `uid` entirely.
    pub fn remove(&self, uid: u64) -> bool {
        self.lock().queues.remove(&uid).is_some()
    }

    /// Clear every queue. Returns the number of frames released.
    pub fn clear_all(&self) -> usize {
        let mut released = 0;
        self.for_each(|_, queue| released += queue.clear());
        released
    }

    pub fn len(&self) -> usize {
        self.lock().queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queues.is_empty()
    }

    // ── Stream-set notification ──

    /// Mark a stream active. Returns `false` if it already was.
    pub fn activate(&self, stream: StreamId) -> bool {
        let inserted = {
            let mut inner = self.lock();
            let inserted = inner.active.insert(stream);
            if inserted {
                inner.queues.entry(stream.uid()).or_insert_with(|| self.new_queue());
            }
            inserted
        };
        if inserted {
            self.generation.fetch_add(1, Ordering::AcqRel);
            tracing::debug!("Stream {} activated", stream);
        }
        inserted
    }

    /// Mark a stream inactive and release its queued frames.
    pub fn deactivate(&self, stream: StreamId) -> bool {
        let removed = {
            let mut inner = self.lock();
            let removed = inner.active.remove(&stream);
            if let Some(queue) = inner.queues.get(&stream.uid()) {
                queue.clear();
            }
            removed
        };
        if removed {
            self.generation.fetch_add(1, Ordering::AcqRel);
            tracing::debug!("Stream {} deactivated", stream);
        }
        removed
    }

    pub fn is_active(&self, stream: StreamId) -> bool {
        self.lock().active.contains(&stream)
    }

    /// Snapshot of the active stream set.
    pub fn active_streams(&self) -> BTreeSet<StreamId> {
        self.lock().active.clone()
    }

    /// Incremented on every change to the active set.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FrameQueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("FrameQueueRegistry")
            .field("queues", &inner.queues.len())
            .field("active", &inner.active)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FramePayload, StreamKind};

    fn frame(stream: StreamId, number: u64) -> Frame {
        Frame::builder(stream, number)
            .payload(FramePayload::Raw(vec![0; 4]))
            .build()
    }

    #[test]
    fn test_at_is_lazy_and_stable() {
        let registry = FrameQueueRegistry::new(2);
        assert!(registry.is_empty());
        let a = registry.at(7);
        let b = registry.at(7);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.capacity(), 2);
        assert_eq!(a.policy(), OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_for_each_visits_all() {
        let registry = FrameQueueRegistry::new(4);
        let depth = StreamId::new(0, StreamKind::Depth);
        let color = StreamId::new(0, StreamKind::Color);
        registry.at(depth.uid()).push(frame(depth, 1));
        registry.at(color.uid()).push(frame(color, 1));
        registry.at(color.uid()).push(frame(color, 2));

        let mut total = 0;
        registry.for_each(|_, q| total += q.len());
        assert_eq!(total, 3);

        assert_eq!(registry.clear_all(), 3);
        let mut after = 0;
        registry.for_each(|_, q| after += q.len());
        assert_eq!(after, 0);
    }

    #[test]
    fn test_activation_tracks_generation() {
        let registry = FrameQueueRegistry::new(4);
        let depth = StreamId::new(0, StreamKind::Depth);
        let g0 = registry.generation();

        assert!(registry.activate(depth));
        assert!(!registry.activate(depth));
        assert_eq!(registry.generation(), g0 + 1);
        assert!(registry.is_active(depth));

        registry.at(depth.uid()).push(frame(depth, 1));
        assert!(registry.deactivate(depth));
        assert!(!registry.is_active(depth));
        assert!(registry.at(depth.uid()).is_empty());
        assert_eq!(registry.generation(), g0 + 2);
    }

    #[test]
    fn test_independent_registries() {
        let a = FrameQueueRegistry::new(1);
        let b = FrameQueueRegistry::new(1);
        a.activate(StreamId::new(0, StreamKind::Depth));
        assert!(b.active_streams().is_empty());
        assert!(b.get(StreamId::new(0, StreamKind::Depth).uid()).is_none());
    }
}
