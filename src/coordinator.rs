//! The two actors of the bounded buffer and the run that wires them up.
//!
//! With [`Protocol::Blocking`] each actor first takes a counting permit
//! (`empty_slots` for the producer, `filled_slots` for the consumer), then
//! the segment lock, mutates the queue, drops the lock and releases the
//! opposite permit. With [`Protocol::Polling`] only the lock is used and a
//! full or empty queue is answered with a timed backoff.

use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::Duration,
};

use tracing::{info, warn};

use crate::config::{Protocol, RunConfig};
use crate::error::{QueueEmpty, QueueFull, Result, RunError};
use crate::item::QueueItem;
use crate::segment::Segment;
use crate::semaphore::SlotPermits;
use crate::shared_queue::SharedQueue;
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hooks into the actor loops. The critical section callbacks run while the
/// segment lock is held.
pub trait Observer: Send + Sync {
    fn entered_critical(&self, _role: Role) {}
    fn leaving_critical(&self, _role: Role) {}
    fn produced(&self, _item: &QueueItem) {}
    fn consumed(&self, _item: &QueueItem) {}
    fn backed_off(&self, _role: Role) {}
}

pub struct NoopObserver;

impl Observer for NoopObserver {}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Backoffs {
    pub producer: usize,
    pub consumer: usize,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub produced: Vec<QueueItem>,
    pub consumed: Vec<QueueItem>,
    pub backoffs: Backoffs,
    /// Items still queued when the segment was destroyed.
    pub leftover: Vec<QueueItem>,
}

struct ActorOutcome {
    items: Vec<QueueItem>,
    backoffs: usize,
}

// Stops the other actor if this one unwinds, so neither waits on a permit
// that will never be released.
struct TriggerOnPanic<'a>(&'a Shutdown);

impl Drop for TriggerOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.trigger();
        }
    }
}

struct Actor {
    role: Role,
    protocol: Protocol,
    segment: Arc<Segment>,
    permits: Arc<SlotPermits>,
    shutdown: Shutdown,
    observer: Arc<dyn Observer>,
}

impl Actor {
    fn blocking(&self) -> bool {
        self.protocol == Protocol::Blocking
    }

    fn critical<T>(&self, f: impl FnOnce(&mut SharedQueue) -> T) -> T {
        let mut queue = self.segment.lock();
        self.observer.entered_critical(self.role);
        let out = f(&mut *queue);
        self.observer.leaving_critical(self.role);
        out
    }

    fn stopping(&self) -> bool {
        if self.shutdown.is_triggered() {
            warn!(role = %self.role, "stopping on shutdown");
            return true;
        }
        false
    }

    fn back_off(&self, backoff: Duration, backoffs: &mut usize) {
        *backoffs += 1;
        self.observer.backed_off(self.role);
        self.shutdown.sleep(backoff);
    }

    fn produce(
        &self,
        iterations: usize,
        prefix: &str,
        delay: Duration,
        backoff: Duration,
    ) -> ActorOutcome {
        let _guard = TriggerOnPanic(&self.shutdown);
        let mut outcome = ActorOutcome {
            items: Vec::with_capacity(iterations),
            backoffs: 0,
        };
        let mut next_id: u32 = 0;

        for _ in 0..iterations {
            if self.stopping() {
                break;
            }
            if self.blocking() && !self.permits.empty_slots.acquire(&self.shutdown) {
                break;
            }

            let attempt = self.critical(|queue| {
                let item = QueueItem::numbered(next_id, prefix);
                queue.enqueue(item.clone()).map(|()| item)
            });

            match attempt {
                Ok(item) => {
                    if self.blocking() {
                        self.permits.filled_slots.release();
                    }
                    info!(id = item.id(), label = %item.label(), "added to the queue");
                    self.observer.produced(&item);
                    outcome.items.push(item);
                    next_id += 1;
                    self.shutdown.sleep(delay);
                }
                Err(QueueFull(_)) => {
                    if self.blocking() {
                        self.permits.empty_slots.release();
                    }
                    info!("queue is full, producer waiting");
                    self.back_off(backoff, &mut outcome.backoffs);
                }
            }
        }
        outcome
    }

    fn consume(&self, iterations: usize, delay: Duration, backoff: Duration) -> ActorOutcome {
        let _guard = TriggerOnPanic(&self.shutdown);
        let mut outcome = ActorOutcome {
            items: Vec::with_capacity(iterations),
            backoffs: 0,
        };

        for _ in 0..iterations {
            if self.stopping() {
                break;
            }
            if self.blocking() && !self.permits.filled_slots.acquire(&self.shutdown) {
                break;
            }

            match self.critical(SharedQueue::dequeue) {
                Ok(item) => {
                    if self.blocking() {
                        self.permits.empty_slots.release();
                    }
                    info!(id = item.id(), label = %item.label(), "processing item");
                    self.observer.consumed(&item);
                    outcome.items.push(item);
                    self.shutdown.sleep(delay);
                }
                Err(QueueEmpty) => {
                    if self.blocking() {
                        self.permits.filled_slots.release();
                    }
                    info!("queue is empty, consumer waiting");
                    self.back_off(backoff, &mut outcome.backoffs);
                }
            }
        }
        outcome
    }
}

/// Runs one producer and one consumer over a fresh segment.
pub struct Coordinator {
    config: RunConfig,
    shutdown: Shutdown,
    observer: Arc<dyn Observer>,
}

impl Coordinator {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            shutdown: Shutdown::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    fn actor(&self, role: Role, segment: Arc<Segment>, permits: &Arc<SlotPermits>) -> Actor {
        Actor {
            role,
            protocol: self.config.protocol,
            segment,
            permits: Arc::clone(permits),
            shutdown: self.shutdown.clone(),
            observer: Arc::clone(&self.observer),
        }
    }

    /// Creates the segment and permits, runs the consumer on its own thread
    /// and the producer on the calling one, joins the consumer and destroys
    /// the segment. Resources created before a failure are released on the
    /// way out.
    pub fn run(&self) -> Result<RunReport> {
        let config = &self.config;
        config.validate()?;

        let permits = Arc::new(SlotPermits::create(config.capacity)?);
        let owner = Segment::create(config.capacity)?;
        let producer = self.actor(Role::Producer, owner.map()?, &permits);
        let consumer = self.actor(Role::Consumer, owner.map()?, &permits);
        info!(
            capacity = config.capacity,
            protocol = ?config.protocol,
            "starting actors"
        );

        let (iterations, delay, backoff) = (
            config.consumer_iterations,
            config.consumer_delay(),
            config.backoff(),
        );
        let handle = thread::Builder::new()
            .name(Role::Consumer.to_string())
            .spawn(move || consumer.consume(iterations, delay, backoff))
            .map_err(|source| RunError::ActorSpawnFailed {
                role: Role::Consumer.name(),
                source,
            })?;

        // A producer panic triggers shutdown through its guard, so the
        // consumer still ends and is joined before the panic is reported.
        let produced = catch_unwind(AssertUnwindSafe(|| {
            producer.produce(
                config.producer_iterations,
                &config.label_prefix,
                config.producer_delay(),
                config.backoff(),
            )
        }));
        let consumed = handle.join();
        let produced = produced.map_err(|_| RunError::ActorPanicked {
            role: Role::Producer.name(),
        })?;
        let consumed = consumed.map_err(|_| RunError::ActorPanicked {
            role: Role::Consumer.name(),
        })?;

        let leftover = owner.destroy();
        info!(
            produced = produced.items.len(),
            consumed = consumed.items.len(),
            "run finished"
        );
        Ok(RunReport {
            produced: produced.items,
            consumed: consumed.items,
            backoffs: Backoffs {
                producer: produced.backoffs,
                consumer: consumed.backoffs,
            },
            leftover,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    fn fast_config(capacity: usize, iterations: usize, protocol: Protocol) -> RunConfig {
        RunConfig {
            capacity,
            producer_iterations: iterations,
            consumer_iterations: iterations,
            producer_delay_ms: 0,
            consumer_delay_ms: 0,
            backoff_ms: 0,
            protocol,
            ..RunConfig::default()
        }
    }

    fn ids(items: &[QueueItem]) -> Vec<u32> {
        items.iter().map(QueueItem::id).collect()
    }

    #[derive(Default)]
    struct Recorder {
        inside: AtomicUsize,
        overlaps: AtomicUsize,
        entries: AtomicUsize,
        consumed: Mutex<Vec<u32>>,
    }

    impl Observer for Recorder {
        fn entered_critical(&self, _role: Role) {
            self.entries.fetch_add(1, Ordering::SeqCst);
            if self.inside.fetch_add(1, Ordering::SeqCst) != 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn leaving_critical(&self, _role: Role) {
            self.inside.fetch_sub(1, Ordering::SeqCst);
        }

        fn consumed(&self, item: &QueueItem) {
            self.consumed.lock().unwrap().push(item.id());
        }
    }

    #[test]
    fn test_reference_run_consumes_all_items_in_order() {
        let config = RunConfig {
            producer_delay_ms: 10,
            consumer_delay_ms: 20,
            backoff_ms: 20,
            ..RunConfig::default()
        };
        let report = Coordinator::new(config).run().unwrap();

        assert_eq!(ids(&report.consumed), vec![0, 1, 2, 3, 4]);
        let labels: Vec<String> = report
            .consumed
            .iter()
            .map(|item| item.label().to_string())
            .collect();
        assert_eq!(
            labels,
            vec!["Patient 0", "Patient 1", "Patient 2", "Patient 3", "Patient 4"]
        );
        assert_eq!(report.produced, report.consumed);
        assert!(report.leftover.is_empty());
        assert_eq!(report.backoffs, Backoffs::default());
    }

    #[test]
    fn test_blocking_actors_never_share_the_critical_section() {
        let recorder = Arc::new(Recorder::default());
        let report = Coordinator::new(fast_config(1, 200, Protocol::Blocking))
            .with_observer(recorder.clone())
            .run()
            .unwrap();

        assert_eq!(recorder.overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.entries.load(Ordering::SeqCst), 400);
        assert_eq!(ids(&report.consumed), (0..200).collect::<Vec<u32>>());
        assert_eq!(*recorder.consumed.lock().unwrap(), ids(&report.consumed));
        assert!(report.leftover.is_empty());
    }

    #[test]
    fn test_polling_actors_never_share_the_critical_section() {
        let recorder = Arc::new(Recorder::default());
        let report = Coordinator::new(fast_config(1, 200, Protocol::Polling))
            .with_observer(recorder.clone())
            .run()
            .unwrap();

        assert_eq!(recorder.overlaps.load(Ordering::SeqCst), 0);
        // Whatever was not consumed is still queued, in order, and within
        // capacity.
        let consumed = ids(&report.consumed);
        assert_eq!(consumed, (0..consumed.len() as u32).collect::<Vec<u32>>());
        assert!(report.leftover.len() <= 1);
        let mut all = consumed;
        all.extend(ids(&report.leftover));
        assert_eq!(all, ids(&report.produced));
        assert_eq!(report.produced.len() + report.backoffs.producer, 200);
        assert_eq!(report.consumed.len() + report.backoffs.consumer, 200);
    }

    #[test]
    fn test_full_queue_backs_off_without_corrupting_stored_item() {
        let config = RunConfig {
            producer_iterations: 2,
            consumer_iterations: 0,
            ..fast_config(1, 0, Protocol::Polling)
        };
        let report = Coordinator::new(config).run().unwrap();

        assert_eq!(ids(&report.produced), vec![0]);
        assert_eq!(report.backoffs.producer, 1);
        assert_eq!(report.leftover, vec![QueueItem::numbered(0, "Patient")]);
        assert!(report.consumed.is_empty());
    }

    #[test]
    fn test_empty_queue_backs_off() {
        let config = RunConfig {
            producer_iterations: 0,
            consumer_iterations: 3,
            ..fast_config(2, 0, Protocol::Polling)
        };
        let report = Coordinator::new(config).run().unwrap();

        assert!(report.consumed.is_empty());
        assert_eq!(report.backoffs.consumer, 3);
    }

    #[test]
    fn test_shutdown_ends_a_run_early() {
        let config = RunConfig {
            consumer_delay_ms: 60_000,
            ..fast_config(10, 5, Protocol::Blocking)
        };
        let coordinator = Coordinator::new(config);
        let shutdown = coordinator.shutdown_handle();
        let start = Instant::now();

        let report = thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(100));
                shutdown.trigger();
            });
            coordinator.run().unwrap()
        });

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(report.consumed.len() < 5);
        let mut all = ids(&report.consumed);
        all.extend(ids(&report.leftover));
        assert_eq!(all, ids(&report.produced));
    }

    struct PanicOnConsume;

    impl Observer for PanicOnConsume {
        fn consumed(&self, _item: &QueueItem) {
            panic!("consumer failure");
        }
    }

    #[test]
    fn test_consumer_panic_is_reported() {
        let err = Coordinator::new(fast_config(1, 3, Protocol::Blocking))
            .with_observer(Arc::new(PanicOnConsume))
            .run()
            .unwrap_err();
        assert!(matches!(err, RunError::ActorPanicked { role: "consumer" }));
    }

    struct PanicOnProduce;

    impl Observer for PanicOnProduce {
        fn produced(&self, _item: &QueueItem) {
            panic!("producer failure");
        }
    }

    #[test]
    fn test_producer_panic_is_reported() {
        let start = Instant::now();
        let err = Coordinator::new(fast_config(1, 3, Protocol::Blocking))
            .with_observer(Arc::new(PanicOnProduce))
            .run()
            .unwrap_err();
        assert!(matches!(err, RunError::ActorPanicked { role: "producer" }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_oversized_capacity_is_a_setup_error() {
        for protocol in [Protocol::Polling, Protocol::Blocking] {
            let err = Coordinator::new(fast_config(usize::MAX / 16, 0, protocol))
                .run()
                .unwrap_err();
            assert!(matches!(err, RunError::CounterCreationFailed { .. }));
        }
    }

    #[test]
    fn test_setup_failures_are_fatal() {
        let err = Coordinator::new(fast_config(0, 0, Protocol::Blocking))
            .run()
            .unwrap_err();
        assert!(matches!(err, RunError::SegmentCreationFailed { .. }));

        let err = Coordinator::new(fast_config(40_000, 0, Protocol::Polling))
            .run()
            .unwrap_err();
        assert!(matches!(err, RunError::CounterCreationFailed { capacity: 40_000 }));
    }
}
