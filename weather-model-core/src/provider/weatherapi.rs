use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    Coordinates, Observation, PredictError,
    observation::{hpa_to_kpa, kph_to_ms},
    provider::{ProviderId, http_client, transport_error, truncate_body},
};

use super::WeatherProvider;

const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, PredictError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(
        api_key: String,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, PredictError> {
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: http_client(timeout)?,
        })
    }

    async fn fetch_current(&self, coordinates: &Coordinates) -> Result<WaResponse, PredictError> {
        let url = format!("{}/v1/current.json", self.base_url);
        let q = format!("{},{}", coordinates.lat, coordinates.lng);

        let res = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", q.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(ProviderId::WeatherApi, e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| transport_error(ProviderId::WeatherApi, e))?;

        if !status.is_success() {
            return Err(PredictError::DataUnavailable(format!(
                "WeatherAPI current request failed with status {}: {}",
                status,
                truncate_body(&body),
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            PredictError::DataUnavailable(format!("failed to parse WeatherAPI current JSON: {e}"))
        })
    }
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: Option<f64>,
    humidity: Option<f64>,
    pressure_mb: Option<f64>,
    wind_kph: Option<f64>,
    last_updated_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: Option<WaLocation>,
    current: Option<WaCurrent>,
}

impl WaResponse {
    fn into_observation(self) -> Result<Observation, PredictError> {
        let current = self.current.ok_or_else(|| missing("current"))?;

        let location_name = self.location.and_then(|l| match (l.name, l.country) {
            (Some(name), Some(country)) => Some(format!("{name}, {country}")),
            (Some(name), None) => Some(name),
            _ => None,
        });
        let observed_at = current
            .last_updated_epoch
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        let observation = Observation {
            temperature_c: current.temp_c.ok_or_else(|| missing("current.temp_c"))?,
            humidity_pct: current.humidity.ok_or_else(|| missing("current.humidity"))?,
            pressure_kpa: hpa_to_kpa(
                current.pressure_mb.ok_or_else(|| missing("current.pressure_mb"))?,
            ),
            wind_speed_ms: kph_to_ms(current.wind_kph.ok_or_else(|| missing("current.wind_kph"))?),
            location_name,
            observed_at,
        };
        observation.ensure_finite()?;
        Ok(observation)
    }
}

fn missing(field: &str) -> PredictError {
    PredictError::DataUnavailable(format!("WeatherAPI response is missing '{field}'"))
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn current_observation(
        &self,
        coordinates: &Coordinates,
    ) -> Result<Observation, PredictError> {
        let observation = self.fetch_current(coordinates).await?.into_observation()?;
        tracing::debug!(
            lat = coordinates.lat,
            lng = coordinates.lng,
            temperature = observation.temperature_c,
            "WeatherAPI observation received"
        );
        Ok(observation)
    }
}
