//! JSON bodies and error mapping for the HTTP surface.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};
use weather_model_core::{
    LivePrediction, PredictError, Predictions, Regressor, SimulatedForecast, Target,
    cities::City, forecast::DailyForecast,
};

/// Any failure leaving a handler. Always rendered as
/// `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Predict(PredictError),
    /// The route exists but not for this HTTP method.
    MethodNotAllowed,
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        Self::Predict(e)
    }
}

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Predict(PredictError::InvalidInput(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Predict(PredictError::InvalidInput(_) | PredictError::SchemaMismatch { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Predict(PredictError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Predict(
                PredictError::ModelUnavailable
                | PredictError::DataUnavailable(_)
                | PredictError::Inference(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            Self::MethodNotAllowed => {
                tracing::debug!(%status, "Rejected request: method not allowed");
                "Method not allowed".to_string()
            }
            Self::Predict(e) if e.is_client_error() => {
                tracing::debug!(%status, "Rejected request: {e}");
                e.public_message()
            }
            Self::Predict(e) => {
                tracing::error!(%status, "Request failed: {e}");
                e.public_message()
            }
        };

        let body = ErrorBody {
            success: false,
            error,
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: String,
    pub models_loaded_successfully: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models_loaded: bool,
    pub provider_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub target: Target,
    pub kind: &'static str,
    pub n_features: usize,
    pub feature_names: Vec<String>,
}

impl ModelInfo {
    pub fn new(target: Target, model: &dyn Regressor) -> Self {
        Self {
            target,
            kind: model.kind(),
            n_features: model.schema().len(),
            feature_names: model.schema().keys().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub success: bool,
    pub models: Vec<ModelInfo>,
}

/// Next-month values; a target without a model is `null`.
#[derive(Debug, Serialize)]
pub struct NextMonth {
    pub temperature_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub pressure_kpa: Option<f64>,
}

impl From<&Predictions> for NextMonth {
    fn from(p: &Predictions) -> Self {
        Self {
            temperature_celsius: p.get(Target::Temperature),
            humidity_percent: p.get(Target::Humidity),
            wind_speed_ms: p.get(Target::WindSpeed),
            pressure_kpa: p.get(Target::Pressure),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LiveResponse {
    pub success: bool,
    pub location: String,
    pub prediction_for_next_month: NextMonth,
}

impl From<&LivePrediction> for LiveResponse {
    fn from(live: &LivePrediction) -> Self {
        let name = live.location_name.as_deref().unwrap_or("Unknown location");
        Self {
            success: true,
            location: format!(
                "{name} (lat: {}, lon: {})",
                live.coordinates.lat, live.coordinates.lng
            ),
            prediction_for_next_month: NextMonth::from(&live.predictions),
        }
    }
}

/// `{"success": true, "predicted_temperature": .., ...}` for loaded targets.
pub fn features_response(predictions: &Predictions) -> Value {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    for (target, value) in predictions.iter() {
        body.insert(target.predicted_label().to_string(), Value::from(value));
    }
    Value::Object(body)
}

#[derive(Debug, Serialize)]
pub struct CitiesResponse {
    pub success: bool,
    pub cities: &'static [City],
}

#[derive(Debug, Serialize)]
pub struct CityResponse {
    pub success: bool,
    pub city: &'static City,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub success: bool,
    pub simulated: bool,
    pub location: String,
    pub daily: Vec<DailyForecast>,
}

impl From<SimulatedForecast> for ForecastResponse {
    fn from(f: SimulatedForecast) -> Self {
        let name = f.location_name.as_deref().unwrap_or("Unknown location");
        Self {
            success: true,
            simulated: true,
            location: format!("{name} (lat: {}, lon: {})", f.coordinates.lat, f.coordinates.lng),
            daily: f.days,
        }
    }
}
