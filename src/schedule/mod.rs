//! Program selection and schedule computation.
//!
//! Both halves are pure: they take today's [`Day`](crate::day::Day) and the
//! day's solar times as arguments and never read the wall clock.
//!
//! - [`selector`]: which program of a terrarium applies today
//! - [`compute`]: the absolute on/off transitions of that program's rules

pub mod compute;
pub mod selector;

pub use compute::{Transition, WallClock, compute_transitions, days_since_start};
pub use selector::select_program;
