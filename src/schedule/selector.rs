//! Seasonal program selection.

use crate::config::Program;
use crate::day::Day;

/// Select the program that applies on `today`.
///
/// The applicable program is the one with the latest start day that is not
/// after `today`. When every program starts later in the year, the program
/// with the latest start wins: last year's season continues over the new year.
/// Programs sharing a start day resolve to the one listed first.
///
/// Returns `None` only for an empty program list.
pub fn select_program(programs: &[Program], today: Day) -> Option<&Program> {
    let started = programs
        .iter()
        .filter(|p| p.start <= today)
        .fold(None, latest_start);

    started.or_else(|| programs.iter().fold(None, latest_start))
}

fn latest_start<'a>(best: Option<&'a Program>, candidate: &'a Program) -> Option<&'a Program> {
    match best {
        Some(b) if b.start >= candidate.start => Some(b),
        _ => Some(candidate),
    }
}
