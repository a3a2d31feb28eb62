//! HTTP API for the prediction service.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::Uri,
    routing::get,
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use weather_model_core::{Coordinates, FeatureMap, PredictError, PredictionService, cities};

use crate::response::{
    ApiError, CitiesResponse, CityResponse, ForecastResponse, HealthResponse, LiveResponse,
    ModelInfo, ModelInfoResponse, StatusResponse, features_response,
};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
}

/// Query params for GET /predict
#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

/// Query params for GET /forecast
#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub city: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub days: Option<String>,
}

/// JSON body for POST /forecast
#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub days: Option<u32>,
}

/// JSON body for POST /cities
#[derive(Debug, Deserialize)]
pub struct CityRequest {
    pub name: String,
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::invalid("Request body must not be empty."));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::invalid(format!("Invalid JSON body: {e}")))
}

/// Convert a JSON object of feature name to number.
fn feature_map(body: &Bytes) -> Result<FeatureMap, ApiError> {
    let value: Value = parse_json(body)?;
    let Value::Object(object) = value else {
        return Err(ApiError::invalid(
            "Request body must be a JSON object of feature values.",
        ));
    };

    object
        .into_iter()
        .map(|(name, value)| match value.as_f64() {
            Some(v) => Ok((name, v)),
            None => Err(ApiError::invalid(format!("Feature '{name}' must be a number."))),
        })
        .collect()
}

/// GET / - Service and model-load status
async fn home(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "Weather model prediction API is online".to_string(),
        models_loaded_successfully: state
            .service
            .registry()
            .targets()
            .iter()
            .map(ToString::to_string)
            .collect(),
    })
}

/// GET /health - Liveness and model availability
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        models_loaded: !state.service.registry().is_empty(),
        provider_configured: state.service.has_provider(),
    })
}

/// GET /model_info - Feature schema of every loaded model
async fn model_info(State(state): State<AppState>) -> Result<Json<ModelInfoResponse>, ApiError> {
    let registry = state.service.registry();
    if registry.is_empty() {
        return Err(PredictError::ModelUnavailable.into());
    }

    let models = registry.iter().map(|(t, m)| ModelInfo::new(t, m.as_ref())).collect();
    Ok(Json(ModelInfoResponse {
        success: true,
        models,
    }))
}

/// GET /predict?lat=..&lng=.. - Predict from live weather
async fn predict_live(
    State(state): State<AppState>,
    Query(query): Query<PredictQuery>,
) -> Result<Json<LiveResponse>, ApiError> {
    if state.service.registry().is_empty() {
        return Err(PredictError::ModelUnavailable.into());
    }

    let (Some(lat), Some(lng)) = (required(query.lat.as_deref()), required(query.lng.as_deref()))
    else {
        return Err(ApiError::invalid("Parameters \"lat\" and \"lng\" are required."));
    };
    let coordinates = Coordinates::parse(lat, lng)?;

    let live = state.service.predict_live(coordinates).await?;
    Ok(Json(LiveResponse::from(&live)))
}

/// POST /predict - Predict from caller-supplied features
async fn predict_features(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if state.service.registry().is_empty() {
        return Err(PredictError::ModelUnavailable.into());
    }

    let features = feature_map(&body)?;
    let predictions = state.service.predict_from_features(&features)?;
    tracing::info!(targets = predictions.len(), "Feature prediction served");

    Ok(Json(features_response(&predictions)))
}

/// GET /cities - Supported cities
async fn list_cities() -> Json<CitiesResponse> {
    Json(CitiesResponse {
        success: true,
        cities: cities::CITIES,
    })
}

/// POST /cities - Look up one city by name
async fn find_city(body: Bytes) -> Result<Json<CityResponse>, ApiError> {
    let request: CityRequest = parse_json(&body)?;
    let city = cities::find(&request.name)?;
    Ok(Json(CityResponse {
        success: true,
        city,
    }))
}

fn resolve_location(
    city: Option<&str>,
    lat: Option<&str>,
    lng: Option<&str>,
) -> Result<Coordinates, ApiError> {
    if let Some(city) = required(city) {
        return Ok(cities::find(city)?.coordinates());
    }
    match (required(lat), required(lng)) {
        (Some(lat), Some(lng)) => Ok(Coordinates::parse(lat, lng)?),
        _ => Err(ApiError::invalid(
            "Either \"city\" or both \"lat\" and \"lng\" are required.",
        )),
    }
}

async fn forecast(
    state: &AppState,
    coordinates: Coordinates,
    days: Option<u32>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let forecast = state.service.forecast(coordinates, days).await?;
    Ok(Json(ForecastResponse::from(forecast)))
}

/// GET /forecast?city=..|lat=..&lng=..&days=.. - Simulated daily outlook
async fn forecast_query(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let coordinates =
        resolve_location(query.city.as_deref(), query.lat.as_deref(), query.lng.as_deref())?;
    let days = required(query.days.as_deref())
        .map(|d| {
            d.parse::<u32>().map_err(|_| {
                ApiError::invalid(format!("Parameter \"days\" is not a number: '{d}'."))
            })
        })
        .transpose()?;

    forecast(&state, coordinates, days).await
}

/// POST /forecast - Simulated daily outlook, JSON body
async fn forecast_body(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ForecastResponse>, ApiError> {
    let request: ForecastRequest = parse_json(&body)?;
    let coordinates = match (request.city.as_deref(), request.lat, request.lng) {
        (Some(city), _, _) if !city.trim().is_empty() => cities::find(city)?.coordinates(),
        (_, Some(lat), Some(lng)) => Coordinates::new(lat, lng)?,
        _ => {
            return Err(ApiError::invalid(
                "Either \"city\" or both \"lat\" and \"lng\" are required.",
            ));
        }
    };

    forecast(&state, coordinates, request.days).await
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::Predict(PredictError::NotFound(format!("Route not found: {}", uri.path())))
}

/// Create the HTTP router
pub fn create_router(service: Arc<PredictionService>) -> Router {
    let state = AppState { service };

    // Browser clients call the API from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/model_info", get(model_info))
        .route("/predict", get(predict_live).post(predict_features))
        .route("/cities", get(list_cities).post(find_city))
        .route("/forecast", get(forecast_query).post(forecast_body))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server until Ctrl+C.
pub async fn run_http_server(
    service: Arc<PredictionService>,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let app = create_router(service);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down gracefully...");
            }
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use chrono::Utc;
    use serde_json::json;
    use tower::ServiceExt;
    use weather_model_core::{
        FeatureSchema, LoadedModel, ModelRegistry, Observation, Target, Variable, WeatherProvider,
        regressor::ModelArtifact,
    };

    #[derive(Debug)]
    struct FixedProvider {
        fail: bool,
    }

    #[async_trait]
    impl WeatherProvider for FixedProvider {
        async fn current_observation(
            &self,
            _coordinates: &Coordinates,
        ) -> Result<Observation, PredictError> {
            if self.fail {
                return Err(PredictError::DataUnavailable("upstream returned 503".into()));
            }
            Ok(Observation {
                temperature_c: 17.9,
                humidity_pct: 84.0,
                pressure_kpa: 101.3,
                wind_speed_ms: 3.8,
                location_name: Some("Lima".into()),
                observed_at: Utc::now(),
            })
        }
    }

    fn linear(target: Target, schema: &FeatureSchema, intercept: f64) -> Arc<LoadedModel> {
        let artifact: ModelArtifact = serde_json::from_value(json!({
            "target": target,
            "feature_names": schema.keys(),
            "model": {
                "type": "linear",
                "coefficients": vec![0.01; schema.len()],
                "intercept": intercept
            }
        }))
        .unwrap();
        Arc::new(LoadedModel::from_artifact(artifact).unwrap())
    }

    fn live_registry() -> ModelRegistry {
        let schema = FeatureSchema::standard();
        ModelRegistry::new()
            .with_model(Target::Temperature, linear(Target::Temperature, &schema, 17.0))
            .with_model(Target::Humidity, linear(Target::Humidity, &schema, 80.0))
            .with_model(Target::WindSpeed, linear(Target::WindSpeed, &schema, 3.0))
            .with_model(Target::Pressure, linear(Target::Pressure, &schema, 100.0))
    }

    /// Temperature-only model on three variables with `year`.
    fn features_registry() -> ModelRegistry {
        let schema = FeatureSchema::lagged(
            6,
            &[Variable::Temperature, Variable::Humidity, Variable::Pressure],
            true,
        );
        ModelRegistry::new()
            .with_model(Target::Temperature, linear(Target::Temperature, &schema, 0.0))
    }

    fn app(registry: ModelRegistry, provider_fails: bool) -> Router {
        let service = PredictionService::new(Arc::new(registry))
            .with_provider(Arc::new(FixedProvider {
                fail: provider_fails,
            }))
            .with_seed(42);
        create_router(Arc::new(service))
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn sample_features() -> Value {
        json!({
            "T2M_lag_1": 18.5, "RH2M_lag_1": 85.1, "PS_lag_1": 101.2,
            "T2M_lag_2": 19.1, "RH2M_lag_2": 86.2, "PS_lag_2": 101.3,
            "T2M_lag_3": 19.8, "RH2M_lag_3": 87.0, "PS_lag_3": 101.4,
            "T2M_lag_4": 20.5, "RH2M_lag_4": 85.5, "PS_lag_4": 101.5,
            "T2M_lag_5": 21.2, "RH2M_lag_5": 84.9, "PS_lag_5": 101.4,
            "T2M_lag_6": 22.0, "RH2M_lag_6": 83.1, "PS_lag_6": 101.2,
            "month": 8,
            "year": 2024
        })
    }

    #[tokio::test]
    async fn home_lists_loaded_models() {
        let (status, body) = send(app(live_registry(), false), Method::GET, "/", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models_loaded_successfully"], json!(["T2M", "RH2M", "WS2M", "PS"]));
    }

    #[tokio::test]
    async fn live_prediction_returns_four_fields() {
        let (status, body) =
            send(app(live_registry(), false), Method::GET, "/predict?lat=-12.04&lng=-77.04", None)
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["location"], json!("Lima (lat: -12.04, lon: -77.04)"));
        let next = body["prediction_for_next_month"].as_object().unwrap();
        assert_eq!(next.len(), 4);
        for key in ["temperature_celsius", "humidity_percent", "wind_speed_ms", "pressure_kpa"] {
            assert!(next[key].is_f64(), "{key} should be numeric");
        }
    }

    #[tokio::test]
    async fn live_prediction_requires_coordinates() {
        let (status, body) =
            send(app(live_registry(), false), Method::GET, "/predict?lat=-12.04", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("\"lng\""));
    }

    #[tokio::test]
    async fn live_prediction_rejects_bad_latitude() {
        let (status, _) =
            send(app(live_registry(), false), Method::GET, "/predict?lat=abc&lng=1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upstream_failure_is_500() {
        let (status, body) =
            send(app(live_registry(), true), Method::GET, "/predict?lat=-12.04&lng=-77.04", None)
                .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("live weather"));
    }

    #[tokio::test]
    async fn no_models_is_500_for_both_variants() {
        let (status, body) =
            send(app(ModelRegistry::new(), false), Method::GET, "/predict?lat=1&lng=1", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("No prediction model"));

        let (status, _) = send(
            app(ModelRegistry::new(), false),
            Method::POST,
            "/predict",
            Some(sample_features()),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn feature_prediction_returns_temperature() {
        let (status, body) =
            send(app(features_registry(), false), Method::POST, "/predict", Some(sample_features()))
                .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["predicted_temperature"].is_f64());
        assert!(body.get("predicted_humidity").is_none());
    }

    #[tokio::test]
    async fn feature_prediction_names_missing_key() {
        let mut features = sample_features();
        features.as_object_mut().unwrap().remove("RH2M_lag_4");

        let (status, body) =
            send(app(features_registry(), false), Method::POST, "/predict", Some(features)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("RH2M_lag_4"));
    }

    #[tokio::test]
    async fn empty_body_is_400() {
        let (status, body) =
            send(app(features_registry(), false), Method::POST, "/predict", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn non_numeric_feature_is_400() {
        let mut features = sample_features();
        features["month"] = json!("August");

        let (status, body) =
            send(app(features_registry(), false), Method::POST, "/predict", Some(features)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("month"));
    }

    #[tokio::test]
    async fn model_info_reports_schema() {
        let (status, body) =
            send(app(features_registry(), false), Method::GET, "/model_info", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"][0]["target"], json!("T2M"));
        assert_eq!(body["models"][0]["n_features"], json!(20));
        assert_eq!(body["models"][0]["feature_names"][19], json!("year"));
    }

    #[tokio::test]
    async fn health_reports_model_state() {
        let (_, body) = send(app(ModelRegistry::new(), false), Method::GET, "/health", None).await;
        assert_eq!(body["models_loaded"], json!(false));

        let (_, body) = send(app(live_registry(), false), Method::GET, "/health", None).await;
        assert_eq!(body["models_loaded"], json!(true));
    }

    #[tokio::test]
    async fn cities_lookup() {
        let (status, body) = send(app(live_registry(), false), Method::GET, "/cities", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["cities"].as_array().unwrap().len() >= 10);

        let (status, body) = send(
            app(live_registry(), false),
            Method::POST,
            "/cities",
            Some(json!({"name": "cusco"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["city"]["name"], json!("Cusco"));

        let (status, _) = send(
            app(live_registry(), false),
            Method::POST,
            "/cities",
            Some(json!({"name": "Gotham"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn forecast_by_city_and_body() {
        let (status, body) = send(
            app(live_registry(), false),
            Method::GET,
            "/forecast?city=lima&days=3",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["simulated"], json!(true));
        assert_eq!(body["daily"].as_array().unwrap().len(), 3);

        let (status, body) = send(
            app(live_registry(), false),
            Method::POST,
            "/forecast",
            Some(json!({"lat": -12.04, "lng": -77.04})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["daily"].as_array().unwrap().len(), 5);

        let (status, _) =
            send(app(live_registry(), false), Method::GET, "/forecast?days=3", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_method_is_json_405() {
        let (status, body) = send(
            app(live_registry(), false),
            Method::PUT,
            "/predict",
            Some(sample_features()),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Method not allowed"));

        let (status, body) =
            send(app(live_registry(), false), Method::DELETE, "/cities", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let (status, body) = send(app(live_registry(), false), Method::GET, "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], json!(false));
    }
}
