use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use std_semaphore::{Semaphore, SemaphoreGuard};
use tracing::{info, warn};

use crate::error::{Result, RunError};
use crate::item::QueueItem;
use crate::semaphore::MAX_PERMITS;
use crate::shared_queue::SharedQueue;

/// Memory shared by both actors: the queue plus the binary semaphore that
/// guards it.
pub struct Segment {
    lock: Semaphore,
    destroyed: AtomicBool,
    queue: UnsafeCell<SharedQueue>,
}

// The queue is only reachable through a `SegmentGuard`, which holds the
// single mutual exclusion permit.
unsafe impl Sync for Segment {}

impl Segment {
    pub fn create(capacity: usize) -> Result<SegmentOwner> {
        if capacity == 0 {
            return Err(RunError::SegmentCreationFailed {
                reason: "capacity must be at least 1".to_string(),
            });
        }
        if capacity > MAX_PERMITS {
            return Err(RunError::SegmentCreationFailed {
                reason: format!("capacity {capacity} exceeds the limit of {MAX_PERMITS} slots"),
            });
        }
        let segment = Arc::new(Segment {
            lock: Semaphore::new(1),
            destroyed: AtomicBool::new(false),
            queue: UnsafeCell::new(SharedQueue::new(capacity)),
        });
        info!(capacity, "segment created");
        Ok(SegmentOwner {
            segment,
            released: false,
        })
    }

    /// Attaches another handle to a live segment.
    pub fn map(self: &Arc<Self>) -> Result<Arc<Self>> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(RunError::SegmentMapFailed {
                reason: "segment has been destroyed",
            });
        }
        Ok(Arc::clone(self))
    }

    /// Blocks until the mutual exclusion permit is free.
    pub fn lock(&self) -> SegmentGuard<'_> {
        let permit = self.lock.access();
        SegmentGuard {
            segment: self,
            _permit: permit,
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

/// Exclusive access to the queue. Dropping it releases the permit.
pub struct SegmentGuard<'a> {
    segment: &'a Segment,
    _permit: SemaphoreGuard<'a>,
}

impl Deref for SegmentGuard<'_> {
    type Target = SharedQueue;
    fn deref(&self) -> &Self::Target {
        unsafe { &*self.segment.queue.get() }
    }
}

impl DerefMut for SegmentGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.segment.queue.get() }
    }
}

/// Creator side of a segment. Destroys it exactly once, either explicitly
/// or on drop, so an early return or a panic still releases it.
pub struct SegmentOwner {
    segment: Arc<Segment>,
    released: bool,
}

impl SegmentOwner {
    pub fn map(&self) -> Result<Arc<Segment>> {
        self.segment.map()
    }

    /// Destroys the segment and returns any items still queued.
    pub fn destroy(mut self) -> Vec<QueueItem> {
        self.release()
    }

    fn release(&mut self) -> Vec<QueueItem> {
        if self.released {
            return Vec::new();
        }
        self.released = true;
        self.segment.destroyed.store(true, Ordering::Release);
        let leftover = self.segment.lock().drain();
        if !leftover.is_empty() {
            warn!(count = leftover.len(), "segment destroyed with items queued");
        }
        info!("segment destroyed");
        leftover
    }
}

impl Drop for SegmentOwner {
    fn drop(&mut self) {
        self.release();
    }
}
