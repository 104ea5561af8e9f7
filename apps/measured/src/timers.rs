//! One-shot timers with absolute deadlines and an opaque payload.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Timers ordered by deadline; timers sharing a deadline fire in the order
/// they were added
pub struct TimerQueue<T> {
    queue: BTreeMap<(Instant, TimerId), T>,
    deadlines: HashMap<TimerId, Instant>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self { queue: BTreeMap::new(), deadlines: HashMap::new(), next_id: 0 }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, deadline: Instant, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        self.queue.insert((deadline, id), payload);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Remove a timer before it fires
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let deadline = self.deadlines.remove(&id)?;
        self.queue.remove(&(deadline, id))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer if it is due at `now`
    pub fn pop_expired(&mut self, now: Instant) -> Option<(TimerId, T)> {
        if self.next_deadline()? > now {
            return None;
        }

        let ((_, id), payload) = self.queue.pop_first()?;
        self.deadlines.remove(&id);
        Some((id, payload))
    }

    /// Keep only the timers whose payload matches `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        let deadlines = &mut self.deadlines;
        self.queue.retain(|(_, id), payload| {
            let kept = keep(payload);
            if !kept {
                deadlines.remove(id);
            }
            kept
        });
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
