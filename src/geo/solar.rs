//! Sunrise, solar noon and sunset for a date and location.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use sunrise::{Coordinates, SolarDay, SolarEvent};

use crate::config::Location;

/// Solar events of one day, as absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolarTimes {
    pub sunrise: DateTime<Utc>,
    pub noon: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

impl SolarTimes {
    /// Build from sunrise and sunset; noon is their midpoint.
    pub fn from_sunrise_sunset(sunrise: DateTime<Utc>, sunset: DateTime<Utc>) -> Self {
        let noon = sunrise + (sunset - sunrise) / 2;
        Self {
            sunrise,
            noon,
            sunset,
        }
    }

    pub fn day_length(&self) -> Duration {
        self.sunset - self.sunrise
    }
}

/// Capability: solar times for a local date at a location.
#[cfg_attr(test, mockall::automock)]
pub trait SolarTimeProvider: Send + Sync {
    fn solar_times(&self, date: NaiveDate, location: &Location, tz: Tz) -> Result<SolarTimes>;
}

/// [`SolarTimeProvider`] backed by the `sunrise` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SunriseCalculator;

impl SolarTimeProvider for SunriseCalculator {
    fn solar_times(&self, date: NaiveDate, location: &Location, tz: Tz) -> Result<SolarTimes> {
        let coord = Coordinates::new(location.latitude, location.longitude)
            .ok_or_else(|| anyhow::anyhow!("Invalid coordinates"))
            .with_context(|| {
                format!(
                    "Cannot compute solar times for {:.4}°, {:.4}°",
                    location.latitude, location.longitude
                )
            })?;

        let solar_day = SolarDay::new(coord, date);
        let sunrise = solar_day.event_time(SolarEvent::Sunrise);
        let sunset = solar_day.event_time(SolarEvent::Sunset);

        // Polar day or night yields no usable pair of events
        let reference = date
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc())
            .context("Invalid reference date")?;
        let plausible = |t: DateTime<Utc>| (t - reference).abs() <= Duration::hours(36);
        if sunset <= sunrise || !plausible(sunrise) || !plausible(sunset) {
            anyhow::bail!(
                "No sunrise/sunset on {} at {:.4}°, {:.4}° (polar day or night)",
                date,
                location.latitude,
                location.longitude
            );
        }

        let times = SolarTimes::from_sunrise_sunset(sunrise, sunset);

        log_debug!(
            "Solar times for {date}: sunrise {}, noon {}, sunset {}",
            times.sunrise.with_timezone(&tz).format("%H:%M:%S"),
            times.noon.with_timezone(&tz).format("%H:%M:%S"),
            times.sunset.with_timezone(&tz).format("%H:%M:%S")
        );

        Ok(times)
    }
}
