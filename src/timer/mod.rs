//! Timer abstraction used by the controller.
//!
//! The controller never sleeps or spawns threads itself. It arms actions at
//! absolute instants through a [`Scheduler`] and keeps the returned
//! [`TimerHandle`]s so it can cancel them again.
//!
//! - [`engine::TimerEngine`]: dispatcher thread plus worker pool, used in production
//! - [`manual::ManualScheduler`]: fake-clock implementation driven by tests
//!
//! ## Cancellation guarantee
//!
//! Once [`TimerHandle::cancel`] returns, the action will not start again. If the
//! action is running on another thread at that moment, `cancel` blocks until it
//! has finished. An action cancelling its own handle does not wait for itself.

pub mod engine;
#[cfg(any(test, feature = "testing-support"))]
pub mod manual;

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

pub use engine::TimerEngine;
#[cfg(any(test, feature = "testing-support"))]
pub use manual::ManualScheduler;

/// Callback run when a timer fires. Repeating timers run it many times.
pub type TimerAction = Arc<dyn Fn() + Send + Sync + 'static>;

/// Capability: run actions at absolute instants.
pub trait Scheduler: Send + Sync {
    /// Run `action` once at `at`. Past instants fire as soon as possible.
    fn schedule_once(&self, at: DateTime<Utc>, action: TimerAction) -> TimerHandle;

    /// Run `action` at `first_at` and then every `every` until cancelled.
    fn schedule_repeating(
        &self,
        first_at: DateTime<Utc>,
        every: Duration,
        action: TimerAction,
    ) -> TimerHandle;
}

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct SlotState {
    cancelled: bool,
    /// Threads currently executing the action
    running: Vec<ThreadId>,
    fired: u64,
}

/// Shared state of one armed timer.
#[derive(Debug)]
pub(crate) struct TimerSlot {
    id: u64,
    state: Mutex<SlotState>,
    idle: Condvar,
}

impl TimerSlot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(SlotState::default()),
            idle: Condvar::new(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Run `action` unless the timer was cancelled first.
    ///
    /// Returns whether the action ran.
    pub(crate) fn fire(&self, action: &TimerAction) -> bool {
        {
            let mut state = self.lock();
            if state.cancelled {
                return false;
            }
            state.running.push(thread::current().id());
            state.fired += 1;
        }

        // Clears the running marker even if the action panics
        struct Running<'a>(&'a TimerSlot);
        impl Drop for Running<'_> {
            fn drop(&mut self) {
                let me = thread::current().id();
                let mut state = self.0.lock();
                if let Some(pos) = state.running.iter().position(|t| *t == me) {
                    state.running.swap_remove(pos);
                }
                drop(state);
                self.0.idle.notify_all();
            }
        }

        let _running = Running(self);
        action();
        true
    }
}

/// Handle to an armed timer.
///
/// Cloning the handle does not duplicate the timer; all clones control the
/// same one. Dropping a handle does not cancel the timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    slot: Arc<TimerSlot>,
}

impl TimerHandle {
    pub(crate) fn new(slot: Arc<TimerSlot>) -> Self {
        Self { slot }
    }

    /// Unique id of the timer, for logging.
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    /// Prevent any further execution of the action.
    ///
    /// Blocks while the action is executing on another thread. Calling it on
    /// a timer that already fired (or was cancelled) is a no-op.
    pub fn cancel(&self) {
        let me = thread::current().id();
        let mut state = self.slot.lock();
        state.cancelled = true;
        while state.running.iter().any(|t| *t != me) {
            state = self
                .slot
                .idle
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.is_cancelled()
    }

    /// How many times the action has started.
    pub fn fire_count(&self) -> u64 {
        self.slot.lock().fired
    }
}
