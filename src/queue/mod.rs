//! Bounded, thread-safe queues.
//!
//! [`BoundedQueue`] is the only structure shared between the capture
//! producer, the pipeline worker and the display consumer. It is a
//! `Mutex<VecDeque<T>>` with two condition variables, and it never grows
//! past its capacity: on overflow it either evicts the oldest item
//! ([`OverflowPolicy::DropOldest`]) or blocks the producer
//! ([`OverflowPolicy::Block`]).

pub mod registry;

pub use registry::FrameQueueRegistry;

use crate::error::{DepthVisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// What `push` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Evict the oldest queued item to admit the new one.
    DropOldest,
    /// Block the producer until a consumer frees a slot.
    Block,
}

/// Result of a push.
#[derive(Debug)]
pub enum PushOutcome<T> {
    /// The item was stored without displacing anything.
    Stored,
    /// The item was stored and the returned oldest item was evicted.
    Evicted(T),
}

impl<T> PushOutcome<T> {
    pub fn is_evicted(&self) -> bool {
        matches!(self, PushOutcome::Evicted(_))
    }
}

/// Fixed-capacity queue safe for any number of producers and consumers.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue. Fails if `capacity` is zero.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self> {
        if capacity == 0 {
            return Err(DepthVisError::QueueAllocation(
                "capacity must be at least 1".to_string(),
            ));
        }
        let mut items = VecDeque::new();
        items.try_reserve_exact(capacity).map_err(|e| {
            DepthVisError::QueueAllocation(format!("cannot reserve {} slots: {}", capacity, e))
        })?;
        Ok(Self::from_parts(items, capacity, policy))
    }

    /// Queue for internal use where the capacity is already known to be
    /// small. A zero capacity is raised to one.
    pub(crate) fn with_min_capacity(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self::from_parts(VecDeque::with_capacity(capacity), capacity, policy)
    }

    fn from_parts(items: VecDeque<T>, capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: Mutex::new(items),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    /// Lock the queue, recovering from poisoning: a panicking holder cannot
    /// leave the deque itself in an invalid state.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert one item. Under `DropOldest` a full queue evicts and returns
    /// its oldest item; under `Block` this waits until space frees.
    pub fn push(&self, item: T) -> PushOutcome<T> {
        let mut items = self.lock();
        let outcome = match self.policy {
            OverflowPolicy::DropOldest => {
                if items.len() >= self.capacity {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    items.pop_front().map_or(PushOutcome::Stored, PushOutcome::Evicted)
                } else {
                    PushOutcome::Stored
                }
            }
            OverflowPolicy::Block => {
                while items.len() >= self.capacity {
                    items = self.not_full.wait(items).unwrap_or_else(|e| e.into_inner());
                }
                PushOutcome::Stored
            }
        };
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
        outcome
    }

    /// Like `push`, but a `Block` queue gives up after `timeout` and hands
    /// the item back. `DropOldest` queues never wait.
    pub fn push_timeout(&self, item: T, timeout: Duration) -> std::result::Result<PushOutcome<T>, T> {
        if self.policy == OverflowPolicy::DropOldest {
            return Ok(self.push(item));
        }
        let deadline = Instant::now() + timeout;
        let mut items = self.lock();
        while items.len() >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return Err(item);
            }
            let (guard, _) = self
                .not_full
                .wait_timeout(items, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            items = guard;
        }
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(PushOutcome::Stored)
    }

    /// Non-blocking: oldest item, or `None` if empty.
    pub fn poll(&self) -> Option<T> {
        let item = self.lock().pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Non-blocking: drain everything and return only the newest item.
    pub fn poll_latest(&self) -> Option<T> {
        let mut items = self.lock();
        let latest = items.pop_back();
        items.clear();
        drop(items);
        if latest.is_some() {
            self.not_full.notify_all();
        }
        latest
    }

    /// Wait up to `timeout` for an item.
    pub fn pop_blocking(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.not_full.notify_one();
                return Some(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(items, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            items = guard;
        }
    }

    /// Remove all items, releasing them. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let drained: Vec<T> = self.lock().drain(..).collect();
        self.not_full.notify_all();
        // Items are released here, outside the lock.
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Total items evicted by `DropOldest` overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("dropped", &self.dropped())
            .finish()
    }
}
