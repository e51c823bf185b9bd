use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, RunError};
use crate::shutdown::Shutdown;

/// Largest value a permit counter may start at. Same ceiling as a System V
/// semaphore (`SEMVMX`).
pub const MAX_PERMITS: usize = 32767;

/// How often a blocked acquire re-checks the shutdown signal.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Counting semaphore whose blocking acquire can be cancelled.
#[derive(Debug)]
pub struct CountingPermit {
    name: &'static str,
    value: Mutex<usize>,
    cond_var: Condvar,
}

impl CountingPermit {
    pub fn new(name: &'static str, value: usize) -> Self {
        Self {
            name,
            value: Mutex::new(value),
            cond_var: Condvar::new(),
        }
    }

    // The count is valid even if a holder panicked.
    fn count(&self) -> MutexGuard<'_, usize> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a permit is available and takes it. Returns `false`
    /// without taking one if `shutdown` fires first.
    pub fn acquire(&self, shutdown: &Shutdown) -> bool {
        let mut guard = self.count();
        while *guard == 0 {
            if shutdown.is_triggered() {
                debug!(permit = self.name, "acquire abandoned on shutdown");
                return false;
            }
            guard = self
                .cond_var
                .wait_timeout(guard, SHUTDOWN_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *guard -= 1;
        debug!(permit = self.name, remaining = *guard, "acquired");
        true
    }

    pub fn release(&self) {
        let mut guard = self.count();
        *guard += 1;
        debug!(permit = self.name, available = *guard, "released");
        drop(guard);
        self.cond_var.notify_one();
    }

    pub fn available(&self) -> usize {
        *self.count()
    }
}

/// The two counting permits of the bounded buffer. `empty_slots` starts at
/// the capacity and gates the producer. `filled_slots` starts at zero and
/// gates the consumer.
#[derive(Debug)]
pub struct SlotPermits {
    pub empty_slots: CountingPermit,
    pub filled_slots: CountingPermit,
}

impl SlotPermits {
    pub fn create(capacity: usize) -> Result<Self> {
        if capacity > MAX_PERMITS {
            return Err(RunError::CounterCreationFailed { capacity });
        }
        Ok(Self {
            empty_slots: CountingPermit::new("empty_slots", capacity),
            filled_slots: CountingPermit::new("filled_slots", 0),
        })
    }
}
