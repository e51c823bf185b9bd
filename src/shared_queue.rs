use crate::error::{QueueEmpty, QueueFull};
use crate::item::QueueItem;

/// Fixed capacity FIFO. Not synchronized: callers hold the segment lock.
///
/// Removal shifts the remaining items toward the front, so both ends cost
/// O(occupancy). At the capacities used here that is cheaper to reason
/// about than a ring.
#[derive(Debug)]
pub struct SharedQueue {
    slots: Vec<QueueItem>,
    capacity: usize,
}

impl SharedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn enqueue(&mut self, item: QueueItem) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull(item));
        }
        self.slots.push(item);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Result<QueueItem, QueueEmpty> {
        if self.is_empty() {
            return Err(QueueEmpty);
        }
        Ok(self.slots.remove(0))
    }

    pub fn peek_front(&self) -> Option<QueueItem> {
        self.slots.first().cloned()
    }

    /// Empties the queue, returning what was left in FIFO order.
    pub fn drain(&mut self) -> Vec<QueueItem> {
        std::mem::take(&mut self.slots)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn occupancy(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }
}
