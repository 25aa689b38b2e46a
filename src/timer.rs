//! Cooperative timers for the single-threaded player loop.
//!
//! Nothing here runs on its own: the owner calls [`Timers::fire_due`] from
//! its tick with the current clock reading and handles whatever came due.
//! Cancelling a timer removes it outright, so a cancelled id never fires
//! again even if its deadline has already passed.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Upper bound on catch-up firings handed out for one timer per call. A
/// timer that fell further behind is rescheduled from `now`.
const MAX_CATCH_UP: usize = 256;

pub trait Clock {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get().saturating_add(by));
    }

    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct TimerEntry {
    id: TimerId,
    interval: Duration,
    next_due: Duration,
}

#[derive(Debug, Default)]
pub struct Timers {
    next_id: u64,
    entries: Vec<TimerEntry>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a repeating timer whose first firing is one `interval`
    /// after `now`.
    pub fn every(&mut self, now: Duration, interval: Duration) -> TimerId {
        let interval = interval.max(Duration::from_millis(1));
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(TimerEntry {
            id,
            interval,
            next_due: now.saturating_add(interval),
        });
        id
    }

    /// Returns false when the timer had already been cancelled or never
    /// existed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collects every firing due at or before `now`, in deadline order. A
    /// timer that missed several intervals appears once per missed interval.
    pub fn fire_due(&mut self, now: Duration) -> Vec<TimerId> {
        let mut fired: Vec<(Duration, TimerId)> = Vec::new();

        for entry in &mut self.entries {
            let mut count = 0;
            while entry.next_due <= now {
                fired.push((entry.next_due, entry.id));
                entry.next_due = entry.next_due.saturating_add(entry.interval);
                count += 1;
                if count == MAX_CATCH_UP {
                    entry.next_due = now.saturating_add(entry.interval);
                    break;
                }
            }
        }

        fired.sort_by_key(|(due, id)| (*due, id.0));
        fired.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn timer_fires_once_per_elapsed_interval() {
        let mut timers = Timers::new();
        let id = timers.every(ms(0), ms(50));

        assert!(timers.fire_due(ms(49)).is_empty());
        assert_eq!(timers.fire_due(ms(50)), vec![id]);
        assert_eq!(timers.fire_due(ms(175)), vec![id, id]);
        assert!(timers.fire_due(ms(199)).is_empty());
        assert_eq!(timers.fire_due(ms(200)), vec![id]);
    }

    #[test]
    fn cancelled_timer_never_fires_again() {
        let mut timers = Timers::new();
        let id = timers.every(ms(0), ms(10));
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(timers.fire_due(ms(1_000)).is_empty());
        assert!(!timers.is_scheduled(id));
    }

    #[test]
    fn firings_are_interleaved_by_deadline() {
        let mut timers = Timers::new();
        let slow = timers.every(ms(0), ms(250));
        let fast = timers.every(ms(0), ms(100));

        let fired = timers.fire_due(ms(300));
        assert_eq!(fired, vec![fast, fast, slow, fast]);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut timers = Timers::new();
        let first = timers.every(ms(0), ms(10));
        timers.cancel_all();
        let second = timers.every(ms(0), ms(10));
        assert_ne!(first, second);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn long_stall_is_capped() {
        let mut timers = Timers::new();
        let id = timers.every(ms(0), ms(1));
        let fired = timers.fire_due(Duration::from_secs(60));
        assert_eq!(fired.len(), MAX_CATCH_UP);
        assert!(timers.fire_due(Duration::from_secs(60)).is_empty());
        assert_eq!(timers.fire_due(Duration::from_secs(60) + ms(1)), vec![id]);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.advance(ms(120));
        assert_eq!(view.now(), ms(120));
        view.set(ms(5));
        assert_eq!(clock.now(), ms(5));
    }
}
