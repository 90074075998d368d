//! Application constants and default values for terracontrol.
//!
//! This module contains configuration defaults, validation limits, and
//! operational constants used throughout the application.

// ═══ Configuration ═══

pub const CONFIG_DIR_NAME: &str = "terracontrol";
pub const CONFIG_FILE_NAME: &str = "terracontrol.toml";

// ═══ Calendar ═══
// The calendar ignores leap years: February always has 28 days

pub const DAYS_PER_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
pub const DAYS_PER_YEAR: i32 = 365;

// ═══ Validation Limits ═══

pub const MINIMUM_LATITUDE: f64 = -90.0;
pub const MAXIMUM_LATITUDE: f64 = 90.0;
pub const MINIMUM_LONGITUDE: f64 = -180.0;
pub const MAXIMUM_LONGITUDE: f64 = 180.0;
pub const MAXIMUM_HOURS_ON: f64 = 24.0; // Bound for hours_on in both directions
pub const MAXIMUM_HOURS_INCREMENT: f64 = 24.0; // Bound for the daily increment in both directions

// ═══ Operational Timing Constants ═══

pub const TIMER_WORKER_THREADS: usize = 1; // One worker runs due actions strictly in deadline order
pub const MAX_TIMER_WAIT_SECS: u64 = 30; // Longest dispatcher sleep, so clock jumps are noticed
pub const SECONDS_PER_DAY: i64 = 86_400; // Interval of the daily re-derive timer
pub const RESCHEDULE_LOOKAHEAD_SECS: i64 = 3_600; // Late DST-shifted firings plan the next day
pub const SWITCH_COMMAND_TIMEOUT_SECS: u64 = 30; // Relay tools still running after this are killed
pub const NOTIFICATION_TIMEOUT_SECS: u64 = 10; // Same for notification commands
pub const COMMAND_POLL_INTERVAL_MS: u64 = 50; // How often a running command is checked

// ═══ Exit Codes ═══

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
