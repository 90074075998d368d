//! Configuration system for terracontrol.
//!
//! The configuration describes the site (timezone and location) and every
//! terrarium with its switches and seasonal programs. It is read once at
//! startup, validated, and treated as read-only afterwards.
//!
//! ## Configuration Sources
//!
//! 1. An explicit path given with `--config <path>`
//! 2. **XDG_CONFIG_HOME**/terracontrol/terracontrol.toml
//!
//! Files ending in `.json` are parsed as JSON, everything else as TOML. JSON
//! files may use camelCase keys (`hoursOn`, `hoursOnIncrementPerDay`).
//!
//! ## Configuration Structure
//!
//! ```toml
//! tz = "Europe/Berlin"
//! location = { latitude = 52.52, longitude = 13.40 }
//!
//! [notifications]
//! command = ["notify-send", "--app-name=terracontrol"]
//!
//! [[terrariums]]
//! name = "Desert"
//!
//! [[terrariums.switches]]
//! id = "desert-light"
//! name = "Light"
//! on_command = ["relayctl", "1", "on"]
//! off_command = ["relayctl", "1", "off"]
//!
//! [[terrariums.programs]]
//! name = "Winter"
//! start = { day = 1, month = 10 }
//!
//! [[terrariums.programs.rules]]
//! hours_on = 10.0
//! hours_on_increment_per_day = 0.0
//! switches = ["desert-light"]
//! earliest_on = "07:00"        # optional clamp, local wall-clock time
//! latest_off = "20:00:00"      # optional clamp
//! clamp_to_daylight = false    # optional, keep the window between sunrise and sunset
//! ```
//!
//! ## Validation
//!
//! Validation rejects unknown timezones, coordinates out of range, empty or
//! duplicate names, rules referencing unknown switches and non-finite rule
//! numbers. See [`validation::validate_config`].

pub mod loading;
pub mod validation;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};

use crate::day::Day;

// Re-export public API
pub use loading::{default_config_path, load, load_from_path};
pub use validation::validate_config;

/// Root configuration value.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// IANA timezone name used for start-of-day and wall-clock clamps.
    #[serde(alias = "timezone")]
    pub tz: String,

    pub location: Location,

    #[serde(default)]
    pub terrariums: Vec<Terrarium>,

    /// Optional external notification command.
    #[serde(default)]
    pub notifications: Option<NotificationConfig>,
}

/// Geographic location of the site.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Location {
    /// Latitude in degrees (-90 to +90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to +180)
    pub longitude: f64,
}

/// A terrarium with its switches and seasonal programs.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Terrarium {
    pub name: String,
    #[serde(default)]
    pub switches: Vec<Switch>,
    #[serde(default)]
    pub programs: Vec<Program>,
}

/// A physical switch (light, heat mat, moonlight, ...).
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Switch {
    pub id: String,
    pub name: String,
    /// Command (argv) run when the switch is turned on.
    #[serde(default, alias = "onCommand")]
    pub on_command: Option<Vec<String>>,
    /// Command (argv) run when the switch is turned off.
    #[serde(default, alias = "offCommand")]
    pub off_command: Option<Vec<String>>,
}

/// A seasonal program, active from its start day until the next program starts.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Program {
    pub name: String,
    pub start: Day,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A symmetric on-window around solar noon for a group of switches.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(alias = "hoursOn")]
    pub hours_on: f64,

    /// Hours added to the window for every day since the program started.
    #[serde(default, alias = "hoursOnIncrementPerDay")]
    pub hours_on_increment_per_day: f64,

    pub switches: Vec<String>,

    #[serde(
        default,
        alias = "earliestOn",
        deserialize_with = "deserialize_wall_clock"
    )]
    pub earliest_on: Option<NaiveTime>,

    #[serde(
        default,
        alias = "latestOff",
        deserialize_with = "deserialize_wall_clock"
    )]
    pub latest_off: Option<NaiveTime>,

    #[serde(default, alias = "clampToDaylight")]
    pub clamp_to_daylight: bool,
}

/// External notification settings.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// argv of the command; title and message are appended as two arguments.
    pub command: Vec<String>,
}

/// Accept "HH:MM" and "HH:MM:SS".
fn deserialize_wall_clock<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_wall_clock(&s).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid time '{s}', use HH:MM or HH:MM:SS"))
        }),
    }
}

pub(crate) fn parse_wall_clock(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

impl Rule {
    /// A rule with a fixed window and no clamps.
    pub fn new(hours_on: f64, switches: &[&str]) -> Self {
        Self {
            hours_on,
            hours_on_increment_per_day: 0.0,
            switches: switches.iter().map(|s| s.to_string()).collect(),
            earliest_on: None,
            latest_off: None,
            clamp_to_daylight: false,
        }
    }

    pub fn with_increment(mut self, hours_per_day: f64) -> Self {
        self.hours_on_increment_per_day = hours_per_day;
        self
    }

    pub fn has_clamps(&self) -> bool {
        self.earliest_on.is_some() || self.latest_off.is_some() || self.clamp_to_daylight
    }
}

impl Terrarium {
    pub fn switch(&self, id: &str) -> Option<&Switch> {
        self.switches.iter().find(|s| s.id == id)
    }
}

impl Configuration {
    /// Load and validate the configuration; see [`loading::load`].
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        loading::load(path)
    }

    /// The configured timezone.
    pub fn timezone(&self) -> Result<Tz> {
        self.tz
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Unknown timezone '{}'", self.tz))
    }

    /// Iterate over every switch with the name of its terrarium.
    pub fn all_switches(&self) -> impl Iterator<Item = (&str, &Switch)> {
        self.terrariums
            .iter()
            .flat_map(|t| t.switches.iter().map(move |s| (t.name.as_str(), s)))
    }

    /// Log a summary of the loaded configuration.
    pub fn log_config(&self) {
        log_block_start!("Loaded configuration");
        log_indented!("Timezone: {}", self.tz);
        log_indented!(
            "Location: {:.4}°, {:.4}°",
            self.location.latitude,
            self.location.longitude
        );
        if let Some(notifications) = &self.notifications {
            log_indented!("Notifications: {}", notifications.command.join(" "));
        }

        for terrarium in &self.terrariums {
            log_block_start!("Terrarium '{}'", terrarium.name);
            let switches: Vec<&str> = terrarium.switches.iter().map(|s| s.id.as_str()).collect();
            log_indented!("Switches: {}", switches.join(", "));

            if terrarium.programs.is_empty() {
                log_indented!("No programs configured");
            }
            for program in &terrarium.programs {
                let clamped = program.rules.iter().filter(|r| r.has_clamps()).count();
                log_indented!(
                    "Program '{}' from {} ({} rules, {clamped} clamped)",
                    program.name,
                    program.start,
                    program.rules.len()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests;
