//! Ordered timer set with cancel-by-key semantics and bounded per-tick work
//! (spec §3 "Timer", §4.7).
//!
//! Ported from the teacher's `timeouts::process` sweep (`src/timeouts.rs`),
//! generalized from "walk every live connection and compare `last_activity`"
//! into a proper min-heap keyed by fire time, the way the original C++
//! `zener::v0::HeapTimer`/`HeapTimerManager` (`include/task/timer/heaptimer.h`)
//! does it. Cancellation stays lazy by design (spec §9 "Lazy timer
//! cancellation"): `cancel` only drops the key→id mapping, and a popped
//! timer whose mapping is gone is a silent no-op rather than a heap removal.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

pub type TimerId = u64;

/// Caller-supplied handle identifying what a timer is for (e.g. a
/// connection's file descriptor). Re-scheduling for the same key cancels
/// any timer already outstanding for it.
pub type Key = u64;

/// Bound on how many timers a single `update()` call will fire, so one
/// overdue backlog can't starve the reactor loop (spec §4.7).
const MAX_FIRED_PER_TICK: usize = 100;

struct Entry {
    fire_at: Instant,
    id: TimerId,
    key: Key,
    period: Option<Duration>,
    remaining: i64, // -1 == infinite
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.id == other.id
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// `BinaryHeap` is a max-heap; reverse the comparison so the earliest
// `fire_at` is popped first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.fire_at.cmp(&self.fire_at).then_with(|| other.id.cmp(&self.id))
    }
}

pub trait Callback: FnMut(Key) + Send {}
impl<F: FnMut(Key) + Send> Callback for F {}

pub struct TimerService {
    heap: BinaryHeap<Entry>,
    key_to_id: HashMap<Key, TimerId>,
    callbacks: HashMap<TimerId, Box<dyn FnMut(Key) + Send>>,
    next_id: TimerId,
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            key_to_id: HashMap::new(),
            callbacks: HashMap::new(),
            next_id: 1,
        }
    }

    /// Cancel any prior timer for `key`, insert a new one, return its id.
    /// `repeat == -1` means fire forever every `delay`; `repeat == 0` means
    /// fire once; `repeat == N > 0` means fire `N + 1` times total (an
    /// initial fire plus `N` repeats), matching spec §4.7's "remaining
    /// repeat count" semantics.
    pub fn schedule<F>(&mut self, key: Key, delay: Duration, repeat: i64, callback: F) -> TimerId
    where
        F: FnMut(Key) + Send + 'static,
    {
        self.cancel(key);
        let id = self.next_id;
        self.next_id += 1;

        let period = if repeat != 0 { Some(delay) } else { None };
        self.heap.push(Entry {
            fire_at: Instant::now() + delay,
            id,
            key,
            period,
            remaining: repeat,
        });
        self.key_to_id.insert(key, id);
        self.callbacks.insert(id, Box::new(callback));
        id
    }

    /// Remove the key→id mapping. The heap entry itself is removed lazily:
    /// when it is popped, `update()` checks `key_to_id` and no-ops if the
    /// mapping no longer points at this timer's id.
    pub fn cancel(&mut self, key: Key) {
        if let Some(id) = self.key_to_id.remove(&key) {
            self.callbacks.remove(&id);
        }
    }

    /// Milliseconds until the next timer is due: `0` if already due, `-1`
    /// if the store is empty.
    pub fn next_tick_ms(&self) -> i64 {
        match self.heap.peek() {
            None => -1,
            Some(entry) => {
                let now = Instant::now();
                if entry.fire_at <= now {
                    0
                } else {
                    (entry.fire_at - now).as_millis() as i64
                }
            }
        }
    }

    /// Pop and fire every timer whose `fire_at <= now`, up to
    /// `MAX_FIRED_PER_TICK` entries; re-insert repeating timers advanced by
    /// `period`. Returns the number of timers fired (for the `warn` log the
    /// caller emits when the cap was hit).
    pub fn update(&mut self) -> usize {
        let now = Instant::now();
        let mut fired = 0usize;

        while fired < MAX_FIRED_PER_TICK {
            let due = matches!(self.heap.peek(), Some(e) if e.fire_at <= now);
            if !due {
                break;
            }
            let entry = self.heap.pop().unwrap();
            fired += 1;

            // Lazy-cancel check: only act if the key still maps to this id.
            let still_live = self.key_to_id.get(&entry.key) == Some(&entry.id);
            if still_live {
                if let Some(cb) = self.callbacks.get_mut(&entry.id) {
                    cb(entry.key);
                }
            }

            if let Some(period) = entry.period {
                let next_remaining = if entry.remaining < 0 { -1 } else { entry.remaining - 1 };
                let keep_going = still_live && (entry.remaining < 0 || next_remaining >= 0);
                if keep_going {
                    self.heap.push(Entry {
                        fire_at: entry.fire_at + period,
                        id: entry.id,
                        key: entry.key,
                        period: Some(period),
                        remaining: next_remaining,
                    });
                } else if still_live {
                    self.key_to_id.remove(&entry.key);
                    self.callbacks.remove(&entry.id);
                }
            } else if still_live {
                self.key_to_id.remove(&entry.key);
                self.callbacks.remove(&entry.id);
            }
        }

        fired
    }

    pub fn is_empty(&self) -> bool {
        self.key_to_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn next_tick_is_minus_one_when_empty() {
        let svc = TimerService::new();
        assert_eq!(svc.next_tick_ms(), -1);
    }

    #[test]
    fn fires_a_one_shot_timer_exactly_once() {
        let fired = Arc::new(Mutex::new(0));
        let mut svc = TimerService::new();
        let f = fired.clone();
        svc.schedule(1, Duration::from_millis(0), 0, move |_| {
            *f.lock().unwrap() += 1;
        });
        std::thread::sleep(Duration::from_millis(2));
        svc.update();
        svc.update();
        assert_eq!(*fired.lock().unwrap(), 1);
        assert!(svc.is_empty());
    }

    #[test]
    fn cancel_by_key_survives_fire_race() {
        let fired = Arc::new(Mutex::new(0));
        let mut svc = TimerService::new();
        let f = fired.clone();
        svc.schedule(7, Duration::from_millis(0), 0, move |_| {
            *f.lock().unwrap() += 1;
        });
        // Cancel before the callback runs: update() must self-check and no-op.
        svc.cancel(7);
        std::thread::sleep(Duration::from_millis(2));
        svc.update();
        assert_eq!(*fired.lock().unwrap(), 0);
    }

    #[test]
    fn rescheduling_a_key_replaces_the_old_timer() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut svc = TimerService::new();

        let f1 = fired.clone();
        svc.schedule(1, Duration::from_millis(0), 0, move |k| f1.lock().unwrap().push((k, 1)));
        let f2 = fired.clone();
        svc.schedule(1, Duration::from_millis(0), 0, move |k| f2.lock().unwrap().push((k, 2)));

        std::thread::sleep(Duration::from_millis(2));
        svc.update();
        assert_eq!(*fired.lock().unwrap(), vec![(1, 2)]);
    }

    #[test]
    fn update_caps_work_at_100_entries_per_tick() {
        let mut svc = TimerService::new();
        let count = Arc::new(Mutex::new(0));
        for i in 0..150u64 {
            let c = count.clone();
            svc.schedule(i, Duration::from_millis(0), 0, move |_| {
                *c.lock().unwrap() += 1;
            });
        }
        std::thread::sleep(Duration::from_millis(2));
        let fired_first_tick = svc.update();
        assert_eq!(fired_first_tick, 100);
        assert_eq!(*count.lock().unwrap(), 100);
        let fired_second_tick = svc.update();
        assert_eq!(fired_second_tick, 50);
        assert_eq!(*count.lock().unwrap(), 150);
    }

    #[test]
    fn infinite_repeat_keeps_firing() {
        let mut svc = TimerService::new();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        svc.schedule(1, Duration::from_millis(0), -1, move |_| {
            *c.lock().unwrap() += 1;
        });
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(2));
            svc.update();
        }
        assert_eq!(*count.lock().unwrap(), 3);
        assert!(!svc.is_empty());
    }
}
