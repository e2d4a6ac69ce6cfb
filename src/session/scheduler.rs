//! Cooperative scheduler with named, cancellable timers.
//!
//! Time is virtual: the scheduler only moves forward when its owner asks it
//! to, so the same controller runs under a real event loop and under tests
//! that step time explicitly. Timers due at the same instant fire in the
//! order they were registered.

use std::time::Duration;

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerName {
    /// Periodic level measurement.
    LevelUpdate,
    /// One-second session countdown.
    Countdown,
    /// End of a calibration tone.
    ToneFinished,
}

/// Handle for cancelling a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Timer {
    id: TimerId,
    name: TimerName,
    due: Duration,
    period: Option<Duration>,
}

/// Smallest period a repeating timer may have.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    next_id: u64,
    timers: Vec<Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Register a timer firing every `period`, first at `now + period`.
    pub fn every(&mut self, name: TimerName, period: Duration) -> TimerId {
        let period = period.max(MIN_PERIOD);
        self.insert(name, self.now + period, Some(period))
    }

    /// Register a timer firing once at `now + delay`.
    pub fn once(&mut self, name: TimerName, delay: Duration) -> TimerId {
        self.insert(name, self.now + delay, None)
    }

    fn insert(&mut self, name: TimerName, due: Duration, period: Option<Duration>) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            name,
            due,
            period,
        });
        id
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    /// Number of registered timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Earliest instant at which any timer is due.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.iter().map(|t| t.due).min()
    }

    /// Pop the earliest timer due at or before `until`.
    ///
    /// Moves the clock to the timer's due time. Repeating timers are
    /// rescheduled one period later; one-shot timers are removed.
    pub fn pop_due(&mut self, until: Duration) -> Option<(TimerId, TimerName)> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= until)
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(i, _)| i)?;

        let timer = &mut self.timers[index];
        let fired = (timer.id, timer.name);
        self.now = self.now.max(timer.due);
        match timer.period {
            Some(period) => timer.due += period,
            None => {
                self.timers.remove(index);
            }
        }
        Some(fired)
    }

    /// Move the clock forward to `t` without firing anything.
    pub fn advance_to(&mut self, t: Duration) {
        self.now = self.now.max(t);
    }
}
