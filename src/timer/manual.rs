//! Deterministic fake-clock scheduler for tests.
//!
//! Nothing fires on its own. [`ManualScheduler::advance_to`] moves the shared
//! [`ManualClock`] forward and runs every due action on the caller's thread,
//! in deadline order. Actions may arm further timers; those fire within the
//! same call when they are already due.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Scheduler, TimerAction, TimerHandle, TimerSlot};
use crate::time_source::{ManualClock, TimeSource};

struct ManualEntry {
    at: DateTime<Utc>,
    seq: u64,
    every: Option<Duration>,
    slot: Arc<TimerSlot>,
    action: TimerAction,
}

#[derive(Default)]
struct ManualQueue {
    entries: Vec<ManualEntry>,
    next_seq: u64,
}

/// [`Scheduler`] whose time only moves when the test says so.
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    queue: Mutex<ManualQueue>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            queue: Mutex::new(ManualQueue::default()),
        }
    }

    /// The clock this scheduler advances.
    pub fn clock(&self) -> Arc<ManualClock> {
        self.clock.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ManualQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move time to `target`, firing everything due on the way.
    ///
    /// While an action runs the clock reads its deadline (or the current time
    /// for timers that were already overdue). Returns the number of actions run.
    pub fn advance_to(&self, target: DateTime<Utc>) -> usize {
        let mut fired = 0;

        loop {
            let next = {
                let mut queue = self.lock();
                queue.entries.retain(|e| !e.slot.is_cancelled());

                let due = queue
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.at <= target)
                    .min_by_key(|(_, e)| (e.at, e.seq))
                    .map(|(index, _)| index);

                match due {
                    Some(index) => {
                        let entry = queue.entries.swap_remove(index);
                        if let Some(every) = entry.every {
                            let seq = queue.next_seq;
                            queue.next_seq += 1;
                            queue.entries.push(ManualEntry {
                                at: entry.at + every,
                                seq,
                                every: entry.every,
                                slot: entry.slot.clone(),
                                action: entry.action.clone(),
                            });
                        }
                        Some(entry)
                    }
                    None => None,
                }
            };

            let Some(entry) = next else {
                break;
            };

            if entry.at > self.clock.now() {
                self.clock.set(entry.at);
            }
            if entry.slot.fire(&entry.action) {
                fired += 1;
            }
        }

        if target > self.clock.now() {
            self.clock.set(target);
        }
        fired
    }

    pub fn advance(&self, by: Duration) -> usize {
        self.advance_to(self.clock.now() + by)
    }

    /// Fire whatever is due at the current time.
    pub fn run_due(&self) -> usize {
        self.advance_to(self.clock.now())
    }

    /// Armed timers that have not been cancelled.
    pub fn pending(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|e| !e.slot.is_cancelled())
            .count()
    }

    /// Earliest deadline among live timers.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .entries
            .iter()
            .filter(|e| !e.slot.is_cancelled())
            .map(|e| e.at)
            .min()
    }

    fn arm(&self, at: DateTime<Utc>, every: Option<Duration>, action: TimerAction) -> TimerHandle {
        let slot = TimerSlot::new();
        let handle = TimerHandle::new(slot.clone());
        let mut queue = self.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.push(ManualEntry {
            at,
            seq,
            every,
            slot,
            action,
        });
        handle
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, at: DateTime<Utc>, action: TimerAction) -> TimerHandle {
        self.arm(at, None, action)
    }

    fn schedule_repeating(
        &self,
        first_at: DateTime<Utc>,
        every: Duration,
        action: TimerAction,
    ) -> TimerHandle {
        self.arm(first_at, Some(every.max(Duration::seconds(1))), action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 15, 0, 0, 0).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> TimerAction {
        let log = log.clone();
        let label = label.to_string();
        Arc::new(move || log.lock().unwrap().push(label.clone()))
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let scheduler = ManualScheduler::new(Arc::new(ManualClock::new(start())));
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.schedule_once(start() + Duration::hours(3), recorder(&log, "c"));
        scheduler.schedule_once(start() + Duration::hours(1), recorder(&log, "a"));
        scheduler.schedule_once(start() + Duration::hours(2), recorder(&log, "b1"));
        scheduler.schedule_once(start() + Duration::hours(2), recorder(&log, "b2"));

        assert_eq!(scheduler.advance(Duration::hours(2)), 3);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b1", "b2"]);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(
            scheduler.next_deadline(),
            Some(start() + Duration::hours(3))
        );
        assert_eq!(scheduler.clock().now(), start() + Duration::hours(2));
    }

    #[test]
    fn test_past_due_fires_on_run_due() {
        let scheduler = ManualScheduler::new(Arc::new(ManualClock::new(start())));
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.schedule_once(start() - Duration::hours(5), recorder(&log, "late"));
        assert_eq!(scheduler.run_due(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
        // Clock never moves backwards for overdue timers
        assert_eq!(scheduler.clock().now(), start());
    }

    #[test]
    fn test_cancelled_timers_are_skipped() {
        let scheduler = ManualScheduler::new(Arc::new(ManualClock::new(start())));
        let log = Arc::new(Mutex::new(Vec::new()));

        let handle = scheduler.schedule_once(start() + Duration::hours(1), recorder(&log, "x"));
        handle.cancel();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.advance(Duration::hours(2)), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_repeating_fires_every_period() {
        let scheduler = ManualScheduler::new(Arc::new(ManualClock::new(start())));
        let log = Arc::new(Mutex::new(Vec::new()));

        let handle = scheduler.schedule_repeating(
            start() + Duration::hours(1),
            Duration::hours(24),
            recorder(&log, "tick"),
        );
        assert_eq!(scheduler.advance(Duration::days(3)), 3);
        assert_eq!(handle.fire_count(), 3);

        handle.cancel();
        assert_eq!(scheduler.advance(Duration::days(3)), 0);
    }

    #[test]
    fn test_actions_can_arm_due_timers() {
        let clock = Arc::new(ManualClock::new(start()));
        let scheduler = Arc::new(ManualScheduler::new(clock));
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_scheduler = scheduler.clone();
        let inner_log = log.clone();
        scheduler.schedule_once(
            start() + Duration::hours(1),
            Arc::new(move || {
                inner_log.lock().unwrap().push("outer".to_string());
                inner_scheduler.schedule_once(
                    start() + Duration::minutes(90),
                    recorder(&inner_log, "inner"),
                );
            }),
        );

        assert_eq!(scheduler.advance(Duration::hours(2)), 2);
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }
}
