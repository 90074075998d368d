//! Turning a program's rules into absolute switch transitions.
//!
//! Every rule describes a window of `hours_on` hours centred on solar noon. The
//! window grows (or shrinks) by `hours_on_increment_per_day` for every day the
//! program has been running, counted with the same year wrap-around the
//! selector uses. Optional clamps narrow the window to wall-clock bounds or to
//! daylight.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

use crate::config::{Program, Rule};
use crate::constants::DAYS_PER_YEAR;
use crate::day::Day;
use crate::geo::SolarTimes;

/// A single planned switch change.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub terrarium: String,
    pub program: String,
    pub switches: Vec<String>,
    pub at: DateTime<Utc>,
    pub on: bool,
}

impl Transition {
    pub fn action(&self) -> &'static str {
        if self.on { "on" } else { "off" }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} {}",
            self.at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.terrarium,
            self.switches.join(", "),
            self.action()
        )
    }
}

/// Local date and timezone used to place wall-clock clamps on the timeline.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    date: NaiveDate,
    tz: Tz,
}

impl WallClock {
    pub fn new(date: NaiveDate, tz: Tz) -> Self {
        Self { date, tz }
    }

    /// The instant `time` occurs on this date.
    ///
    /// Ambiguous times (clocks going back) resolve to the earlier instant; times
    /// inside a DST gap move forward by the length of the gap.
    pub fn instant(&self, time: NaiveTime) -> DateTime<Utc> {
        let naive = self.date.and_time(time);
        let local = match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => {
                // Gaps are at most an hour in practice
                let shifted = naive + Duration::hours(1);
                match self.tz.from_local_datetime(&shifted) {
                    LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
                    LocalResult::None => self.tz.from_utc_datetime(&naive),
                }
            }
        };
        local.with_timezone(&Utc)
    }
}

/// Days elapsed since `start`, wrapping into the previous year when `start`
/// lies after `today`. Always in `0..365`.
pub fn days_since_start(start: Day, today: Day) -> i32 {
    let days = today - start;
    if days < 0 { days + DAYS_PER_YEAR } else { days }
}

/// Length of the rule's on-window after `days` days of the program.
pub fn effective_hours_on(rule: &Rule, days: i32) -> f64 {
    rule.hours_on + f64::from(days) * rule.hours_on_increment_per_day
}

/// On and off instants of a rule, or `None` when the rule is inert today.
///
/// Fails when the window does not fit on the timeline, which only a program
/// with absurd hours or increments can cause.
pub fn rule_window(
    rule: &Rule,
    days: i32,
    solar: &SolarTimes,
    wall_clock: &WallClock,
) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    let hours = effective_hours_on(rule, days);
    if hours.is_nan() || hours <= 0.0 {
        return Ok(None);
    }

    let half_millis = (hours / 2.0 * 3_600_000.0).round();
    let half_interval = (half_millis.is_finite() && half_millis < i64::MAX as f64)
        .then(|| Duration::try_milliseconds(half_millis as i64))
        .flatten()
        .with_context(|| format!("{hours} hours on is out of range"))?;
    let (Some(mut on), Some(mut off)) = (
        solar.noon.checked_sub_signed(half_interval),
        solar.noon.checked_add_signed(half_interval),
    ) else {
        anyhow::bail!("{hours} hours on around {} is out of range", solar.noon);
    };

    if let Some(earliest) = rule.earliest_on {
        on = on.max(wall_clock.instant(earliest));
    }
    if let Some(latest) = rule.latest_off {
        off = off.min(wall_clock.instant(latest));
    }
    if rule.clamp_to_daylight {
        on = on.max(solar.sunrise);
        off = off.min(solar.sunset);
    }

    Ok((on < off).then_some((on, off)))
}

/// All transitions of `program` for `today`, ordered by time.
///
/// Each active rule yields an "on" transition before noon and an "off"
/// transition after it. Transitions at the same instant keep rule order.
pub fn compute_transitions(
    terrarium: &str,
    program: &Program,
    today: Day,
    solar: &SolarTimes,
    wall_clock: &WallClock,
) -> Result<Vec<Transition>> {
    let days = days_since_start(program.start, today);

    let mut transitions = Vec::new();
    for (index, rule) in program.rules.iter().enumerate() {
        let window = rule_window(rule, days, solar, wall_clock).with_context(|| {
            format!("Program '{}', rule {}: {days} days in", program.name, index + 1)
        })?;
        let Some((on, off)) = window else {
            continue;
        };
        transitions.extend([(on, true), (off, false)].map(|(at, on)| Transition {
            terrarium: terrarium.to_string(),
            program: program.name.clone(),
            switches: rule.switches.clone(),
            at,
            on,
        }));
    }

    transitions.sort_by_key(|t| t.at);
    Ok(transitions)
}
