use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cloneable stop signal shared by both actors.
///
/// Actors check it at the top of every iteration. Timed sleeps taken
/// through [`Shutdown::sleep`] wake as soon as it is triggered.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: Mutex<bool>,
    cond_var: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        *self
            .inner
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        self.inner.cond_var.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self
            .inner
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `duration` unless triggered first. Returns `false` if the
    /// sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut triggered = self
            .inner
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            triggered = self
                .inner
                .cond_var
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_sleep_runs_to_completion() {
        let shutdown = Shutdown::new();
        let start = Instant::now();
        assert!(shutdown.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_trigger_wakes_sleeper() {
        let shutdown = Shutdown::new();
        let start = Instant::now();
        thread::scope(|s| {
            let sleeper = s.spawn(|| shutdown.sleep(Duration::from_secs(30)));
            thread::sleep(Duration::from_millis(20));
            shutdown.trigger();
            assert!(!sleeper.join().unwrap());
        });
        assert!(start.elapsed() < Duration::from_secs(30));
        assert!(shutdown.clone().is_triggered());
    }
}
