use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PredictError;

/// A point on the globe, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, PredictError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(PredictError::InvalidInput(format!(
                "Latitude must be between -90 and 90, got {lat}."
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(PredictError::InvalidInput(format!(
                "Longitude must be between -180 and 180, got {lng}."
            )));
        }
        Ok(Self { lat, lng })
    }

    /// Parse raw query-string values.
    pub fn parse(lat: &str, lng: &str) -> Result<Self, PredictError> {
        let lat: f64 = lat.trim().parse().map_err(|_| {
            PredictError::InvalidInput(format!("Parameter \"lat\" is not a number: '{lat}'."))
        })?;
        let lng: f64 = lng.trim().parse().map_err(|_| {
            PredictError::InvalidInput(format!("Parameter \"lng\" is not a number: '{lng}'."))
        })?;
        Self::new(lat, lng)
    }
}

/// Current conditions at a location, normalised to the units the models use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    /// Surface pressure in kPa.
    pub pressure_kpa: f64,
    pub wind_speed_ms: f64,
    pub location_name: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    /// Rejects observations carrying NaN or infinite readings.
    pub fn ensure_finite(&self) -> Result<(), PredictError> {
        let fields = [
            ("temperature", self.temperature_c),
            ("humidity", self.humidity_pct),
            ("pressure", self.pressure_kpa),
            ("wind speed", self.wind_speed_ms),
        ];
        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, v)) => Err(PredictError::DataUnavailable(format!(
                "observation has a non-finite {name} reading ({v})"
            ))),
            None => Ok(()),
        }
    }
}

/// Convert a pressure reading in hectopascals (millibars) to kilopascals.
pub fn hpa_to_kpa(hpa: f64) -> f64 {
    hpa / 10.0
}

/// Convert a speed in km/h to m/s.
pub fn kph_to_ms(kph: f64) -> f64 {
    kph / 3.6
}
