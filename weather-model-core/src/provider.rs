use crate::{
    Config, Coordinates, Observation, PredictError,
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
};
use async_trait::async_trait;
use reqwest::Client;
use std::{convert::TryFrom, fmt::Debug, time::Duration};

pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi."
            )),
        }
    }
}

/// Source of live, point-in-time weather.
///
/// Implementations fail closed: any transport error, timeout, non-success
/// status or incomplete payload becomes [`PredictError::DataUnavailable`].
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current_observation(
        &self,
        coordinates: &Coordinates,
    ) -> Result<Observation, PredictError>;
}

/// HTTP client shared by the providers; every request is bounded by `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, PredictError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PredictError::DataUnavailable(format!("failed to build HTTP client: {e}")))
}

/// Map a transport failure, distinguishing timeouts in the message.
pub(crate) fn transport_error(provider: ProviderId, e: reqwest::Error) -> PredictError {
    if e.is_timeout() {
        PredictError::DataUnavailable(format!("{provider} request timed out"))
    } else {
        PredictError::DataUnavailable(format!("{provider} request failed: {e}"))
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let api_key = config.provider_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `weather-model configure {id}` and enter your API key."
        )
    })?;
    let timeout = config.http_timeout();

    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => Box::new(OpenWeatherProvider::new(api_key.to_owned(), timeout)?),
        ProviderId::WeatherApi => Box::new(WeatherApiProvider::new(api_key.to_owned(), timeout)?),
    };

    Ok(boxed)
}

/// Construct the default provider from config, using `default_provider` field.
pub fn default_provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let id = config.default_provider_id()?;
    provider_from_config(id, config)
}
