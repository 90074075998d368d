//! Solar event calculations.
//!
//! The scheduler only needs three instants per day and location: sunrise,
//! solar noon and sunset. They are provided through the [`SolarTimeProvider`]
//! capability so the controller can be driven by fixed values in tests.
//!
//! ## Module Structure
//!
//! - [`solar`]: the capability trait and the `sunrise`-crate implementation

pub mod solar;

// Re-exports for public API
pub use solar::{SolarTimeProvider, SolarTimes, SunriseCalculator};
