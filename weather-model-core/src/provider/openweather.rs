use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    Coordinates, Observation, PredictError,
    observation::hpa_to_kpa,
    provider::{ProviderId, http_client, transport_error, truncate_body},
};

use super::WeatherProvider;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
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

    async fn fetch_current(
        &self,
        coordinates: &Coordinates,
    ) -> Result<OwCurrentResponse, PredictError> {
        let url = format!("{}/data/2.5/weather", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", coordinates.lat.to_string()),
                ("lon", coordinates.lng.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(ProviderId::OpenWeather, e))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| transport_error(ProviderId::OpenWeather, e))?;

        if !status.is_success() {
            return Err(PredictError::DataUnavailable(format!(
                "OpenWeather current request failed with status {}: {}",
                status,
                truncate_body(&body),
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            PredictError::DataUnavailable(format!("failed to parse OpenWeather current JSON: {e}"))
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: Option<f64>,
    humidity: Option<f64>,
    /// hPa
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    dt: Option<i64>,
    main: Option<OwMain>,
    wind: Option<OwWind>,
}

impl OwCurrentResponse {
    fn into_observation(self) -> Result<Observation, PredictError> {
        let main = self.main.ok_or_else(|| missing("main"))?;
        let wind = self.wind.ok_or_else(|| missing("wind"))?;

        let observed_at = self
            .dt
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        let observation = Observation {
            temperature_c: main.temp.ok_or_else(|| missing("main.temp"))?,
            humidity_pct: main.humidity.ok_or_else(|| missing("main.humidity"))?,
            pressure_kpa: hpa_to_kpa(main.pressure.ok_or_else(|| missing("main.pressure"))?),
            wind_speed_ms: wind.speed.ok_or_else(|| missing("wind.speed"))?,
            location_name: self.name.filter(|n| !n.is_empty()),
            observed_at,
        };
        observation.ensure_finite()?;
        Ok(observation)
    }
}

fn missing(field: &str) -> PredictError {
    PredictError::DataUnavailable(format!("OpenWeather response is missing '{field}'"))
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_observation(
        &self,
        coordinates: &Coordinates,
    ) -> Result<Observation, PredictError> {
        let observation = self.fetch_current(coordinates).await?.into_observation()?;
        tracing::debug!(
            lat = coordinates.lat,
            lng = coordinates.lng,
            temperature = observation.temperature_c,
            "OpenWeather observation received"
        );
        Ok(observation)
    }
}
