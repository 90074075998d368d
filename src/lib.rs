//! # terracontrol library
//!
//! Internal library for the terracontrol binary.
//!
//! This library exists to enable testing of the scheduling internals and to keep
//! a clean separation between CLI dispatch (main.rs) and application logic.
//!
//! ## Architecture
//!
//! - **Calendar**: `day` holds the year-less calendar day used by program start dates
//! - **Scheduling**: `schedule` selects today's program and turns its rules into
//!   absolute on/off transitions around solar noon
//! - **Timers**: `timer` provides the `Scheduler` trait, a threaded engine and a
//!   manual fake-clock implementation for tests
//! - **Controller**: `controller` ties everything together and re-derives the
//!   schedule every local midnight
//! - **Capabilities**: `geo` (solar times), `switches` (actuation), `notify`
//!   (notifications) and `time_source` (clock)
//! - **Infrastructure**: configuration, signal handling, argument parsing and logging

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod config;
pub mod constants;
pub mod controller;
pub mod day;
pub mod geo;
pub mod notify;
pub mod schedule;
pub mod signals;
pub mod switches;
pub mod time_source;
pub mod timer;

// Re-export for binary
pub use config::Configuration;
pub use controller::{Controller, ControllerError, ControllerParams};
pub use day::{Day, DayError};
