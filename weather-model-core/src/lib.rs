//! Core library for the weather model prediction service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over live weather providers
//! - Feature schemas and synthesis of lagged features from one observation
//! - Model artifacts, the model registry and prediction dispatch
//!
//! It is used by `weather-model-api`, but can also be reused by other binaries or services.

pub mod cities;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod features;
pub mod forecast;
pub mod observation;
pub mod provider;
pub mod regressor;
pub mod registry;
pub mod service;

pub use config::{Config, ProviderConfig};
pub use dispatcher::{Bound, PredictionBounds, Predictions};
pub use error::{ModelLoadError, PredictError};
pub use features::{FeatureMap, FeatureSchema, FeatureSynthesizer, FeatureVector, Variable};
pub use observation::{Coordinates, Observation};
pub use provider::{ProviderId, WeatherProvider};
pub use regressor::{LoadedModel, Regressor};
pub use registry::{ModelRegistry, Target};
pub use service::{LivePrediction, PredictionService, SimulatedForecast};
