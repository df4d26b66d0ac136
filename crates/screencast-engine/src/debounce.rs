//! Trailing-edge debouncing over an injectable clock.
//!
//! The debouncer never fires by itself: the host loop asks it for due
//! entries with [`Debouncer::take_due`] and uses [`Debouncer::next_deadline`]
//! to decide how long it may sleep.

use std::cell::Cell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

#[derive(Debug)]
struct Pending<P> {
    deadline: Instant,
    payload: P,
}

/// One timer per key. Scheduling a key again replaces its payload and pushes
/// its deadline back to a full window after the latest call.
#[derive(Debug)]
pub struct Debouncer<K, P> {
    window: Duration,
    pending: HashMap<K, Pending<P>>,
}

impl<K: Eq + Hash + Clone, P> Debouncer<K, P> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, key: K, payload: P, now: Instant) {
        self.pending.insert(
            key,
            Pending {
                deadline: now + self.window,
                payload,
            },
        );
    }

    /// Fire `key` immediately, returning its payload if it was pending
    pub fn flush_now(&mut self, key: &K) -> Option<P> {
        self.pending.remove(key).map(|pending| pending.payload)
    }

    /// Drop `key` without firing. Returns whether anything was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Remove and return every entry whose quiet period has elapsed, oldest
    /// deadline first.
    pub fn take_due(&mut self, now: Instant) -> Vec<(K, P)> {
        let mut due_keys: Vec<(Instant, K)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(key, pending)| (pending.deadline, key.clone()))
            .collect();
        due_keys.sort_by_key(|(deadline, _)| *deadline);

        due_keys
            .into_iter()
            .filter_map(|(_, key)| {
                let pending = self.pending.remove(&key)?;
                Some((key, pending.payload))
            })
            .collect()
    }

    /// Remove and return everything, regardless of deadline
    pub fn take_all(&mut self) -> Vec<(K, P)> {
        let mut all: Vec<(K, Pending<P>)> = self.pending.drain().collect();
        all.sort_by_key(|(_, pending)| pending.deadline);
        all.into_iter()
            .map(|(key, pending)| (key, pending.payload))
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    #[test]
    fn test_nothing_fires_on_leading_edge() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(WINDOW);

        debouncer.schedule("a", 1, clock.now());

        assert!(debouncer.take_due(clock.now()).is_empty());
        assert!(debouncer.is_pending(&"a"));
    }

    #[test]
    fn test_burst_collapses_to_latest_payload() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(WINDOW);

        for i in 0..10 {
            debouncer.schedule("a", i, clock.now());
            clock.advance(Duration::from_millis(100));
        }
        // 100ms after the last schedule: still quiet period
        assert!(debouncer.take_due(clock.now()).is_empty());

        clock.advance(Duration::from_millis(400));
        assert_eq!(debouncer.take_due(clock.now()), vec![("a", 9)]);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn test_keys_have_independent_timers() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(WINDOW);

        debouncer.schedule("a", 1, clock.now());
        clock.advance(Duration::from_millis(300));
        debouncer.schedule("b", 2, clock.now());

        clock.advance(Duration::from_millis(200));
        assert_eq!(debouncer.take_due(clock.now()), vec![("a", 1)]);

        clock.advance(Duration::from_millis(300));
        assert_eq!(debouncer.take_due(clock.now()), vec![("b", 2)]);
    }

    #[test]
    fn test_flush_now_and_cancel() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.schedule("a", 1, clock.now());
        debouncer.schedule("b", 2, clock.now());

        assert_eq!(debouncer.flush_now(&"a"), Some(1));
        assert_eq!(debouncer.flush_now(&"a"), None);
        assert!(debouncer.cancel(&"b"));
        assert!(!debouncer.cancel(&"b"));
        assert!(debouncer.is_empty());
    }

    #[test]
    fn test_next_deadline_is_earliest() {
        let clock = ManualClock::new();
        let start = clock.now();
        let mut debouncer = Debouncer::new(WINDOW);
        assert_eq!(debouncer.next_deadline(), None);

        debouncer.schedule("a", 1, start);
        clock.advance(Duration::from_millis(50));
        debouncer.schedule("b", 2, clock.now());

        assert_eq!(debouncer.next_deadline(), Some(start + WINDOW));
    }

    #[test]
    fn test_take_all_ignores_deadlines() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.schedule("a", 1, clock.now());
        clock.advance(Duration::from_millis(10));
        debouncer.schedule("b", 2, clock.now());

        assert_eq!(debouncer.take_all(), vec![("a", 1), ("b", 2)]);
        assert_eq!(debouncer.len(), 0);
    }
}
