//! Threaded timer engine.
//!
//! One dispatcher thread keeps every armed timer in a min-heap ordered by
//! deadline (ties broken by arming order). It sleeps on a condition variable
//! until the earliest deadline, or until a new timer is armed, and hands due
//! actions to a small worker pool over a channel. Sleeps are capped at
//! [`MAX_TIMER_WAIT_SECS`] so jumps of the wall clock (suspend, NTP
//! corrections) are picked up promptly.

use chrono::{DateTime, Duration, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use super::{Scheduler, TimerAction, TimerHandle, TimerSlot};
use crate::constants::{MAX_TIMER_WAIT_SECS, TIMER_WORKER_THREADS};

struct Entry {
    at: DateTime<Utc>,
    seq: u64,
    every: Option<Duration>,
    slot: Arc<TimerSlot>,
    action: TimerAction,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Job {
    slot: Arc<TimerSlot>,
    action: TimerAction,
}

/// Production [`Scheduler`] backed by a dispatcher thread and worker pool.
pub struct TimerEngine {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl TimerEngine {
    /// Start the dispatcher and [`TIMER_WORKER_THREADS`] workers.
    pub fn new() -> std::io::Result<Self> {
        Self::with_workers(TIMER_WORKER_THREADS)
    }

    pub fn with_workers(workers: usize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
        });

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut threads = Vec::with_capacity(workers.max(1) + 1);
        for index in 0..workers.max(1) {
            let rx = job_rx.clone();
            threads.push(
                thread::Builder::new()
                    .name(format!("timer-worker-{index}"))
                    .spawn(move || worker_loop(rx))?,
            );
        }

        let dispatcher_shared = shared.clone();
        threads.push(
            thread::Builder::new()
                .name("timer-dispatcher".to_string())
                .spawn(move || dispatcher_loop(dispatcher_shared, job_tx))?,
        );

        Ok(Self {
            shared,
            threads: Mutex::new(threads),
        })
    }

    fn arm(&self, at: DateTime<Utc>, every: Option<Duration>, action: TimerAction) -> TimerHandle {
        let slot = TimerSlot::new();
        let handle = TimerHandle::new(slot.clone());

        let mut queue = self.shared.lock();
        if queue.shutdown {
            // Nothing will ever run it
            drop(queue);
            handle.cancel();
            return handle;
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Reverse(Entry {
            at,
            seq,
            every,
            slot,
            action,
        }));
        drop(queue);
        self.shared.wake.notify_all();

        handle
    }

    /// Number of queued timers that have not been cancelled.
    pub fn pending(&self) -> usize {
        self.shared
            .lock()
            .heap
            .iter()
            .filter(|Reverse(entry)| !entry.slot.is_cancelled())
            .count()
    }

    /// Stop the dispatcher and workers. Queued timers never fire.
    ///
    /// Actions already handed to a worker finish first.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.lock();
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
            queue.heap.clear();
        }
        self.shared.wake.notify_all();

        let threads = std::mem::take(&mut *self.threads.lock().unwrap_or_else(|e| e.into_inner()));
        let me = thread::current().id();
        for handle in threads {
            // A worker shutting the engine down cannot join itself
            if handle.thread().id() != me {
                let _ = handle.join();
            }
        }
    }
}

impl Scheduler for TimerEngine {
    fn schedule_once(&self, at: DateTime<Utc>, action: TimerAction) -> TimerHandle {
        self.arm(at, None, action)
    }

    fn schedule_repeating(
        &self,
        first_at: DateTime<Utc>,
        every: Duration,
        action: TimerAction,
    ) -> TimerHandle {
        // A non-positive interval would re-fire in a tight loop
        let every = every.max(Duration::seconds(1));
        self.arm(first_at, Some(every), action)
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatcher_loop(shared: Arc<Shared>, jobs: Sender<Job>) {
    let max_wait = StdDuration::from_secs(MAX_TIMER_WAIT_SECS);
    let mut queue = shared.lock();

    loop {
        if queue.shutdown {
            break;
        }

        let now = Utc::now();
        let next_at = queue.heap.peek().map(|Reverse(entry)| entry.at);

        match next_at {
            Some(at) if at <= now => {
                let Some(Reverse(entry)) = queue.heap.pop() else {
                    continue;
                };
                if entry.slot.is_cancelled() {
                    continue;
                }

                if let Some(every) = entry.every {
                    // Missed periods (suspend) collapse into this single run
                    let mut next = entry.at + every;
                    while next <= now {
                        next += every;
                    }
                    let seq = queue.next_seq;
                    queue.next_seq += 1;
                    queue.heap.push(Reverse(Entry {
                        at: next,
                        seq,
                        every: entry.every,
                        slot: entry.slot.clone(),
                        action: entry.action.clone(),
                    }));
                }

                let job = Job {
                    slot: entry.slot,
                    action: entry.action,
                };
                if jobs.send(job).is_err() {
                    break;
                }
            }
            Some(at) => {
                let wait = (at - now).to_std().unwrap_or_default().min(max_wait);
                queue = shared
                    .wake
                    .wait_timeout(queue, wait)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|e| e.into_inner().0);
            }
            None => {
                queue = shared
                    .wake
                    .wait_timeout(queue, max_wait)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|e| e.into_inner().0);
            }
        }
    }

    #[cfg(debug_assertions)]
    eprintln!("DEBUG: timer dispatcher stopped");
}

fn worker_loop(jobs: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let rx = jobs.lock().unwrap_or_else(|e| e.into_inner());
            rx.recv()
        };
        match job {
            Ok(job) => {
                job.slot.fire(&job.action);
            }
            // Dispatcher gone
            Err(_) => break,
        }
    }
}
