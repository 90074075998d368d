//! Configuration validation functionality.
//!
//! Rejects configurations the scheduler cannot work with: unknown timezones,
//! coordinates out of range, empty or duplicate names, rules that refer to
//! switches the terrarium does not have, and rule hours outside a day. The
//! first violation found is reported.

use anyhow::Result;
use chrono_tz::Tz;
use std::collections::HashSet;

use super::{Configuration, Rule, Terrarium};
use crate::constants::*;

/// Validate a parsed configuration before the controller sees it.
pub fn validate_config(config: &Configuration) -> Result<()> {
    if config.tz.trim().is_empty() {
        anyhow::bail!("tz must not be empty");
    }
    if config.tz.parse::<Tz>().is_err() {
        anyhow::bail!(
            "tz '{}' is not a known IANA timezone (e.g. \"Europe/Berlin\")",
            config.tz
        );
    }

    let lat = config.location.latitude;
    if !lat.is_finite() || !(MINIMUM_LATITUDE..=MAXIMUM_LATITUDE).contains(&lat) {
        anyhow::bail!("latitude must be between -90 and 90 degrees (got {})", lat);
    }

    let lon = config.location.longitude;
    if !lon.is_finite() || !(MINIMUM_LONGITUDE..=MAXIMUM_LONGITUDE).contains(&lon) {
        anyhow::bail!(
            "longitude must be between -180 and 180 degrees (got {})",
            lon
        );
    }

    if let Some(notifications) = &config.notifications
        && notifications
            .command
            .first()
            .is_none_or(|program| program.trim().is_empty())
    {
        anyhow::bail!("notifications.command must name a program to run");
    }

    let mut terrarium_names = HashSet::new();
    for terrarium in &config.terrariums {
        if terrarium.name.trim().is_empty() {
            anyhow::bail!("terrarium names must not be empty");
        }
        if !terrarium_names.insert(terrarium.name.as_str()) {
            anyhow::bail!("duplicate terrarium name '{}'", terrarium.name);
        }
        validate_terrarium(terrarium)?;
    }

    Ok(())
}

fn validate_terrarium(terrarium: &Terrarium) -> Result<()> {
    let name = &terrarium.name;

    let mut switch_ids = HashSet::new();
    for switch in &terrarium.switches {
        if switch.id.trim().is_empty() {
            anyhow::bail!("terrarium '{name}': switch ids must not be empty");
        }
        if !switch_ids.insert(switch.id.as_str()) {
            anyhow::bail!("terrarium '{name}': duplicate switch id '{}'", switch.id);
        }
        for (field, command) in [
            ("on_command", &switch.on_command),
            ("off_command", &switch.off_command),
        ] {
            if let Some(argv) = command
                && argv.first().is_none_or(|program| program.trim().is_empty())
            {
                anyhow::bail!(
                    "terrarium '{name}': switch '{}' has an empty {field}",
                    switch.id
                );
            }
        }
    }

    let mut program_names = HashSet::new();
    for program in &terrarium.programs {
        if program.name.trim().is_empty() {
            anyhow::bail!("terrarium '{name}': program names must not be empty");
        }
        if !program_names.insert(program.name.as_str()) {
            anyhow::bail!(
                "terrarium '{name}': duplicate program name '{}'",
                program.name
            );
        }
        for (index, rule) in program.rules.iter().enumerate() {
            let context = format!(
                "terrarium '{name}', program '{}', rule {}",
                program.name,
                index + 1
            );
            validate_rule(rule, &switch_ids, &context)?;
        }
    }

    Ok(())
}

fn validate_rule(rule: &Rule, switch_ids: &HashSet<&str>, context: &str) -> Result<()> {
    if !rule.hours_on.is_finite() {
        anyhow::bail!("{context}: hours_on must be a finite number");
    }
    if !rule.hours_on_increment_per_day.is_finite() {
        anyhow::bail!("{context}: hours_on_increment_per_day must be a finite number");
    }
    if rule.hours_on.abs() > MAXIMUM_HOURS_ON {
        anyhow::bail!(
            "{context}: hours_on must be between -{MAXIMUM_HOURS_ON} and \
             {MAXIMUM_HOURS_ON} (got {})",
            rule.hours_on
        );
    }
    if rule.hours_on_increment_per_day.abs() > MAXIMUM_HOURS_INCREMENT {
        anyhow::bail!(
            "{context}: hours_on_increment_per_day must be between -{MAXIMUM_HOURS_INCREMENT} \
             and {MAXIMUM_HOURS_INCREMENT} (got {})",
            rule.hours_on_increment_per_day
        );
    }

    if rule.switches.is_empty() {
        anyhow::bail!("{context}: rule must reference at least one switch");
    }
    for id in &rule.switches {
        if !switch_ids.contains(id.as_str()) {
            anyhow::bail!("{context}: unknown switch '{id}'");
        }
    }

    if let (Some(earliest), Some(latest)) = (rule.earliest_on, rule.latest_off)
        && earliest >= latest
    {
        anyhow::bail!(
            "{context}: earliest_on ({}) must be before latest_off ({})",
            earliest.format("%H:%M:%S"),
            latest.format("%H:%M:%S")
        );
    }

    Ok(())
}
