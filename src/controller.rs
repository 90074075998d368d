//! The terrarium controller.
//!
//! A [`Controller`] owns the configuration and the injected capabilities and
//! drives the daily cycle:
//!
//! 1. `start()` arms a repeating timer at every local midnight and runs one
//!    scheduling pass for today right away.
//! 2. Each pass cancels the timers of the previous pass, selects today's
//!    program per terrarium, computes its transitions around solar noon and
//!    arms one timer per transition.
//! 3. When a transition timer fires, every switch of the rule is set and a
//!    notification is sent.
//! 4. `stop()` cancels everything. It is safe to call from any thread.
//!
//! A failure while planning one terrarium is logged and notified, and the
//! pass continues with the next terrarium.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use crate::config::{Configuration, Terrarium};
use crate::constants::{RESCHEDULE_LOOKAHEAD_SECS, SECONDS_PER_DAY};
use crate::day::Day;
use crate::geo::SolarTimeProvider;
use crate::notify::{NotificationLevel, Notifier};
use crate::schedule::{Transition, WallClock, compute_transitions, select_program};
use crate::switches::SwitchActuator;
use crate::time_source::TimeSource;
use crate::timer::{Scheduler, TimerAction, TimerHandle};

/// Errors callers of the controller may want to match on.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("controller is already running")]
    AlreadyRunning,

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),
}

/// Everything a controller needs, injected explicitly.
pub struct ControllerParams {
    pub config: Configuration,
    pub solar: Arc<dyn SolarTimeProvider>,
    pub actuator: Arc<dyn SwitchActuator>,
    pub notifier: Arc<dyn Notifier>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn TimeSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
}

struct Armed {
    handle: TimerHandle,
    transition: Transition,
}

/// Today's program of one terrarium and the transitions it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrariumPlan {
    pub program: String,
    pub transitions: Vec<Transition>,
}

struct Inner {
    config: Configuration,
    tz: Tz,
    solar: Arc<dyn SolarTimeProvider>,
    actuator: Arc<dyn SwitchActuator>,
    notifier: Arc<dyn Notifier>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn TimeSource>,

    state: Mutex<ControllerState>,
    state_changed: Condvar,
    daily: Mutex<Option<TimerHandle>>,
    armed: Mutex<Vec<Armed>>,
}

/// Schedules every terrarium's switches day after day.
pub struct Controller {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// The local calendar date of `at` in `tz`.
pub fn local_date(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// First instant of `date` in `tz`.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    WallClock::new(date, tz).instant(NaiveTime::MIN)
}

/// The next local midnight strictly after `now`.
pub fn next_local_midnight(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let today = local_date(now, tz);
    let tomorrow = today.succ_opt().unwrap_or(today);
    start_of_day(tomorrow, tz)
}

impl Controller {
    pub fn new(params: ControllerParams) -> Result<Self, ControllerError> {
        let tz = params
            .config
            .tz
            .parse::<Tz>()
            .map_err(|_| ControllerError::InvalidTimezone(params.config.tz.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                config: params.config,
                tz,
                solar: params.solar,
                actuator: params.actuator,
                notifier: params.notifier,
                scheduler: params.scheduler,
                clock: params.clock,
                state: Mutex::new(ControllerState::Idle),
                state_changed: Condvar::new(),
                daily: Mutex::new(None),
                armed: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn timezone(&self) -> Tz {
        self.inner.tz
    }

    pub fn state(&self) -> ControllerState {
        *lock(&self.inner.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ControllerState::Running
    }

    /// Start the daily cycle and schedule today.
    pub fn start(&self) -> Result<(), ControllerError> {
        let inner = &self.inner;

        // Held until the daily handle is stored so a concurrent stop() sees it
        let mut daily = lock(&inner.daily);
        {
            let mut state = lock(&inner.state);
            if *state == ControllerState::Running {
                return Err(ControllerError::AlreadyRunning);
            }
            *state = ControllerState::Running;
        }
        inner.state_changed.notify_all();

        inner.notify(
            NotificationLevel::Info,
            &format!(
                "terracontrol starting with {} terrarium(s)",
                inner.config.terrariums.len()
            ),
        );

        let now = inner.clock.now();
        if inner.clock.is_simulated() {
            log_debug!("Running on a simulated clock, now {now}");
        }
        let first_midnight = next_local_midnight(now, inner.tz);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let action: TimerAction = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let fired_at = inner.clock.now();
                let date = local_date(
                    fired_at + Duration::seconds(RESCHEDULE_LOOKAHEAD_SECS),
                    inner.tz,
                );
                inner.reschedule_for(date);
            }
        });

        let handle = inner.scheduler.schedule_repeating(
            first_midnight,
            Duration::seconds(SECONDS_PER_DAY),
            action,
        );
        log_debug!(
            "Daily timer {} armed from {}",
            handle.id(),
            first_midnight.with_timezone(&inner.tz).format("%Y-%m-%d %H:%M %Z")
        );
        *daily = Some(handle);
        drop(daily);

        // Today's midnight has already passed
        inner.reschedule_for(local_date(now, inner.tz));

        Ok(())
    }

    /// Re-run the scheduling pass for the current local date.
    ///
    /// Cancels the timers of the previous pass first, so running it twice
    /// leaves exactly one set of timers armed. Does nothing unless running.
    pub fn reschedule(&self) {
        let now = self.inner.clock.now();
        self.inner.reschedule_for(local_date(now, self.inner.tz));
    }

    /// Re-run the scheduling pass for a specific local date.
    pub fn reschedule_for(&self, date: NaiveDate) {
        self.inner.reschedule_for(date);
    }

    /// Stop the daily cycle and cancel every armed transition.
    ///
    /// Stopping an idle controller does nothing.
    pub fn stop(&self) {
        let inner = &self.inner;

        {
            let mut state = lock(&inner.state);
            if *state == ControllerState::Idle {
                return;
            }
            *state = ControllerState::Idle;
        }

        // Waits for an in-flight scheduling pass
        if let Some(daily) = lock(&inner.daily).take() {
            daily.cancel();
        }

        let cancelled = {
            let mut armed = lock(&inner.armed);
            let count = armed.len();
            for entry in armed.drain(..) {
                entry.handle.cancel();
            }
            count
        };
        log_debug!("Cancelled {cancelled} transition timer(s)");

        inner.notify(NotificationLevel::Info, "terracontrol stopping");
        inner.state_changed.notify_all();
    }

    /// Block until [`Controller::stop`] is called. Returns at once when idle.
    pub fn wait(&self) {
        let mut state = lock(&self.inner.state);
        while *state == ControllerState::Running {
            state = self
                .inner
                .state_changed
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Transitions armed by the latest pass, in time order.
    pub fn planned(&self) -> Vec<Transition> {
        lock(&self.inner.armed)
            .iter()
            .map(|armed| armed.transition.clone())
            .collect()
    }

    /// Planned transitions that have neither fired nor been cancelled.
    pub fn pending(&self) -> Vec<Transition> {
        lock(&self.inner.armed)
            .iter()
            .filter(|armed| armed.handle.fire_count() == 0 && !armed.handle.is_cancelled())
            .map(|armed| armed.transition.clone())
            .collect()
    }

    /// Compute the transitions for `date` without arming anything.
    ///
    /// Per-terrarium failures are returned alongside the successful plans.
    pub fn preview(&self, date: NaiveDate) -> Vec<(String, Result<Option<TerrariumPlan>>)> {
        self.inner
            .config
            .terrariums
            .iter()
            .map(|terrarium| {
                (
                    terrarium.name.clone(),
                    self.inner.plan_terrarium(terrarium, date),
                )
            })
            .collect()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn is_running(&self) -> bool {
        *lock(&self.state) == ControllerState::Running
    }

    /// Deliver a notification; failures only end up in the log.
    fn notify(&self, level: NotificationLevel, message: &str) {
        if let Err(e) = self.notifier.notify(level, message) {
            log_warning!("Notification failed: {e:#}");
        }
    }

    /// Plan of one terrarium for `date`, or `None` without programs.
    fn plan_terrarium(
        &self,
        terrarium: &Terrarium,
        date: NaiveDate,
    ) -> Result<Option<TerrariumPlan>> {
        let today = Day::from_date(date)
            .with_context(|| format!("Cannot schedule {date}: not a day of the fixed calendar"))?;

        let Some(program) = select_program(&terrarium.programs, today) else {
            return Ok(None);
        };

        let solar = self
            .solar
            .solar_times(date, &self.config.location, self.tz)
            .with_context(|| format!("Solar times unavailable for {date}"))?;

        let wall_clock = WallClock::new(date, self.tz);
        Ok(Some(TerrariumPlan {
            program: program.name.clone(),
            transitions: compute_transitions(
                &terrarium.name,
                program,
                today,
                &solar,
                &wall_clock,
            )?,
        }))
    }

    fn reschedule_for(&self, date: NaiveDate) {
        let mut armed = lock(&self.armed);

        // A pass racing stop() must not arm anything
        if !self.is_running() {
            log_debug!("Skipping scheduling pass for {date}: controller stopped");
            return;
        }

        for previous in armed.drain(..) {
            previous.handle.cancel();
        }

        log_block_start!("Scheduling {date}");

        let mut transitions = Vec::new();
        let mut failures = 0;
        for terrarium in &self.config.terrariums {
            match self.plan_terrarium(terrarium, date) {
                Ok(Some(plan)) => {
                    log_decorated!(
                        "Terrarium '{}': program '{}', {} transition(s)",
                        terrarium.name,
                        plan.program,
                        plan.transitions.len()
                    );
                    transitions.extend(plan.transitions);
                }
                Ok(None) => {
                    log_pipe!();
                    log_warning!("Terrarium '{}' has no programs", terrarium.name);
                    self.notify(
                        NotificationLevel::Warning,
                        &format!(
                            "{}: no program configured, nothing scheduled for {date}",
                            terrarium.name
                        ),
                    );
                }
                Err(e) => {
                    failures += 1;
                    log_pipe!();
                    log_error!("Terrarium '{}': {e:#}", terrarium.name);
                    self.notify(
                        NotificationLevel::Error,
                        &format!("{}: scheduling failed: {e:#}", terrarium.name),
                    );
                }
            }
        }

        // Arm in global time order so replayed past transitions keep their order
        transitions.sort_by_key(|t| t.at);

        for transition in transitions {
            log_indented!(
                "{} {} {}",
                transition.at.with_timezone(&self.tz).format("%H:%M:%S"),
                transition.switches.join(", "),
                transition.action()
            );
            let handle = self
                .scheduler
                .schedule_once(transition.at, self.transition_action(&transition));
            armed.push(Armed { handle, transition });
        }

        let summary = format!(
            "Scheduled {} transition(s) for {date}{}",
            armed.len(),
            if failures > 0 {
                format!(", {failures} terrarium(s) failed")
            } else {
                String::new()
            }
        );
        self.notify(NotificationLevel::Info, &summary);
    }

    fn transition_action(&self, transition: &Transition) -> TimerAction {
        let actuator = self.actuator.clone();
        let notifier = self.notifier.clone();
        let tz = self.tz;
        let transition = transition.clone();

        Arc::new(move || {
            let action = transition.action();
            let at = transition.at.with_timezone(&tz).format("%H:%M:%S");

            let mut failed = Vec::new();
            for id in &transition.switches {
                let result = actuator.set_switch_state(&transition.terrarium, id, transition.on);
                if let Err(e) = result {
                    log_pipe!();
                    log_error!("Switching {id} {action} failed: {e:#}");
                    failed.push(format!("{id}: {e:#}"));
                }
            }

            let (level, message) = if failed.is_empty() {
                (
                    NotificationLevel::Info,
                    format!(
                        "{}: {} {action} at {at}",
                        transition.terrarium,
                        transition.switches.join(", ")
                    ),
                )
            } else {
                (
                    NotificationLevel::Error,
                    format!(
                        "{}: switching {action} at {at} failed ({})",
                        transition.terrarium,
                        failed.join("; ")
                    ),
                )
            };
            if let Err(e) = notifier.notify(level, &message) {
                log_warning!("Notification failed: {e:#}");
            }
        })
    }
}
