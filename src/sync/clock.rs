//! Time and identifier sources for the sync engine.
//!
//! Both are injected into [`SyncEngine`](super::SyncEngine) so tests can pin
//! exact timestamps and item ids.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Supplies the instant used to stamp a mutation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never repeats or goes backwards within a process.
///
/// Readings have nanosecond resolution. When the wall clock has not moved
/// past the previous reading, the previous reading plus one nanosecond is
/// returned instead, so two operations stamped by the same process never
/// tie under the strict `stored < incoming` guard.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_nanos: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now();
        let wall_nanos = match wall.timestamp_nanos_opt() {
            Some(nanos) => nanos,
            // Outside the i64 nanosecond range (year 2262); nothing to order against.
            None => return wall,
        };

        let mut last = self.last_nanos.load(Ordering::Relaxed);
        loop {
            let next = if wall_nanos > last { wall_nanos } else { last + 1 };
            match self.last_nanos.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return DateTime::from_timestamp_nanos(next),
                Err(current) => last = current,
            }
        }
    }
}

/// Test clock that returns a fixed instant, optionally stepping forward on
/// every reading.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
    step: TimeDelta,
}

impl ManualClock {
    /// A clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
            step: TimeDelta::zero(),
        }
    }

    /// A clock frozen at `millis` milliseconds after the Unix epoch.
    pub fn at_millis(millis: i64) -> Self {
        Self::new(DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }

    /// Advance by `step` after every reading.
    pub fn ticking(mut self, step: TimeDelta) -> Self {
        self.step = step;
        self
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.lock() = at;
    }

    pub fn set_millis(&self, millis: i64) {
        self.set(DateTime::from_timestamp_millis(millis).unwrap_or_default());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.lock();
        let reading = *current;
        *current = reading + self.step;
        reading
    }
}

/// Produces fresh, globally unique item identifiers.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Predictable `<prefix><n>` identifiers for tests.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<T: IdGenerator + ?Sized> IdGenerator for std::sync::Arc<T> {
    fn new_id(&self) -> String {
        (**self).new_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_system_clock_strictly_increasing() {
        let clock = SystemClock::new();
        let mut previous = clock.now();
        for _ in 0..10_000 {
            let next = clock.now();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_system_clock_unique_across_threads() {
        let clock = Arc::new(SystemClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || (0..1000).map(|_| clock.now()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for reading in handle.join().unwrap() {
                assert!(seen.insert(reading), "duplicate reading {}", reading);
            }
        }
    }

    #[test]
    fn test_manual_clock_frozen() {
        let clock = ManualClock::at_millis(100);
        assert_eq!(clock.now().timestamp_millis(), 100);
        assert_eq!(clock.now().timestamp_millis(), 100);

        clock.set_millis(150);
        assert_eq!(clock.now().timestamp_millis(), 150);
    }

    #[test]
    fn test_manual_clock_ticking() {
        let clock = ManualClock::at_millis(100).ticking(TimeDelta::milliseconds(10));
        assert_eq!(clock.now().timestamp_millis(), 100);
        assert_eq!(clock.now().timestamp_millis(), 110);
        assert_eq!(clock.now().timestamp_millis(), 120);
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidIds;
        let generated: HashSet<_> = (0..100).map(|_| ids.new_id()).collect();
        assert_eq!(generated.len(), 100);
        assert!(generated.iter().all(|id| uuid::Uuid::parse_str(id).is_ok()));
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new("x");
        assert_eq!(ids.new_id(), "x1");
        assert_eq!(ids.new_id(), "x2");
    }
}
