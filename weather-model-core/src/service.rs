//! Request-path facade shared by every handler.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::dispatcher::{PredictionBounds, Predictions, dispatch};
use crate::features::{DEFAULT_LAG_DEPTH, FeatureMap, FeatureSynthesizer};
use crate::forecast::{self, DailyForecast};
use crate::registry::ModelRegistry;
use crate::{Coordinates, Observation, PredictError, WeatherProvider};

/// Outcome of a live-coordinates prediction.
#[derive(Debug, Clone)]
pub struct LivePrediction {
    pub coordinates: Coordinates,
    pub location_name: Option<String>,
    pub predictions: Predictions,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulatedForecast {
    pub coordinates: Coordinates,
    pub location_name: Option<String>,
    pub days: Vec<DailyForecast>,
}

/// Models, weather source and random source, wired once at startup.
///
/// The registry is read-only. The RNG is the only mutable state and is held
/// only while synthesizing, never across an await.
#[derive(Debug)]
pub struct PredictionService {
    registry: Arc<ModelRegistry>,
    provider: Option<Arc<dyn WeatherProvider>>,
    synthesizer: FeatureSynthesizer,
    bounds: PredictionBounds,
    rng: Mutex<StdRng>,
}

impl PredictionService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        let lag_depth = match registry.max_lag_depth() {
            0 => DEFAULT_LAG_DEPTH,
            depth => depth,
        };

        Self {
            registry,
            provider: None,
            synthesizer: FeatureSynthesizer::new(lag_depth),
            bounds: PredictionBounds::default(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn WeatherProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_bounds(mut self, bounds: PredictionBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    fn ensure_models(&self) -> Result<(), PredictError> {
        if self.registry.is_empty() {
            return Err(PredictError::ModelUnavailable);
        }
        Ok(())
    }

    async fn observe(&self, coordinates: &Coordinates) -> Result<Observation, PredictError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            PredictError::DataUnavailable("no weather provider is configured".to_string())
        })?;

        provider.current_observation(coordinates).await.inspect_err(|e| {
            tracing::warn!(
                lat = coordinates.lat,
                lng = coordinates.lng,
                "Live weather fetch failed: {e}"
            );
        })
    }

    /// Predict next month's conditions at `coordinates` from live weather.
    pub async fn predict_live(
        &self,
        coordinates: Coordinates,
    ) -> Result<LivePrediction, PredictError> {
        self.predict_live_on(coordinates, Utc::now().date_naive()).await
    }

    /// As [`Self::predict_live`], with the calendar date supplied.
    pub async fn predict_live_on(
        &self,
        coordinates: Coordinates,
        today: NaiveDate,
    ) -> Result<LivePrediction, PredictError> {
        self.ensure_models()?;
        let observation = self.observe(&coordinates).await?;

        let features = {
            let mut rng = self.rng.lock();
            self.synthesizer.synthesize(&observation, today, &mut *rng)?
        };
        let predictions = dispatch(&self.registry, &features, &self.bounds)?;

        tracing::info!(
            lat = coordinates.lat,
            lng = coordinates.lng,
            targets = predictions.len(),
            "Live prediction served"
        );

        Ok(LivePrediction {
            coordinates,
            location_name: observation.location_name,
            predictions,
        })
    }

    /// Predict from caller-supplied features.
    pub fn predict_from_features(
        &self,
        features: &FeatureMap,
    ) -> Result<Predictions, PredictError> {
        self.ensure_models()?;
        if features.is_empty() {
            return Err(PredictError::InvalidInput("No features were provided.".to_string()));
        }
        dispatch(&self.registry, features, &self.bounds)
    }

    /// Simulated daily outlook around the live observation at `coordinates`.
    pub async fn forecast(
        &self,
        coordinates: Coordinates,
        days: Option<u32>,
    ) -> Result<SimulatedForecast, PredictError> {
        let days = forecast::forecast_days(days)?;
        let observation = self.observe(&coordinates).await?;
        let today = Utc::now().date_naive();

        let days = {
            let mut rng = self.rng.lock();
            forecast::simulate(&observation, today, days, &mut *rng)?
        };

        Ok(SimulatedForecast {
            coordinates,
            location_name: observation.location_name,
            days,
        })
    }
}
