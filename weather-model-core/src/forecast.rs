//! Simulated daily outlook built around a live observation.
//!
//! No model is involved; values are the observation plus bounded noise.

use chrono::{Days, NaiveDate};
use rand::Rng;
use serde::Serialize;

use crate::{Observation, PredictError};

pub const DEFAULT_FORECAST_DAYS: u32 = 5;
pub const MAX_FORECAST_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temperature_max_c: f64,
    pub temperature_min_c: f64,
    pub humidity_percent: f64,
    pub wind_speed_ms: f64,
}

/// Check a requested horizon, defaulting when absent.
pub fn forecast_days(requested: Option<u32>) -> Result<u32, PredictError> {
    match requested {
        None => Ok(DEFAULT_FORECAST_DAYS),
        Some(days) if (1..=MAX_FORECAST_DAYS).contains(&days) => Ok(days),
        Some(days) => Err(PredictError::InvalidInput(format!(
            "Parameter \"days\" must be between 1 and {MAX_FORECAST_DAYS}, got {days}."
        ))),
    }
}

/// One entry per day starting the day after `start`.
pub fn simulate<R: Rng>(
    observation: &Observation,
    start: NaiveDate,
    days: u32,
    rng: &mut R,
) -> Result<Vec<DailyForecast>, PredictError> {
    observation.ensure_finite()?;
    let days = forecast_days(Some(days))?;

    let mut out = Vec::with_capacity(days as usize);
    for offset in 1..=u64::from(days) {
        let date = start
            .checked_add_days(Days::new(offset))
            .ok_or_else(|| PredictError::InvalidInput("Forecast date out of range.".to_string()))?;

        let centre = observation.temperature_c + rng.gen_range(-1.5..1.5);
        let spread = rng.gen_range(2.0..6.0);
        let humidity = (observation.humidity_pct + rng.gen_range(-8.0..8.0)).clamp(0.0, 100.0);
        let wind = (observation.wind_speed_ms + rng.gen_range(-1.5..1.5)).max(0.0);

        out.push(DailyForecast {
            date,
            temperature_max_c: round1(centre + spread / 2.0),
            temperature_min_c: round1(centre - spread / 2.0),
            humidity_percent: round1(humidity),
            wind_speed_ms: round1(wind),
        });
    }

    Ok(out)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
