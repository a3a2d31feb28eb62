//! Feature schemas and the lagged-feature synthesizer.
//!
//! The models were trained on monthly time series with lagged inputs, while
//! the service only sees a single live observation. [`FeatureSynthesizer`]
//! fabricates the lagged values by perturbing that observation with uniform
//! noise and a per-lag drift. It is a stand-in for real history, not a
//! physical simulation, and it is the largest source of behavioural drift
//! between what the models saw in training and what they see here.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Observation, PredictError};

/// Lag depth the deployed models were trained with.
pub const DEFAULT_LAG_DEPTH: u32 = 6;

/// Deepest lag a model artifact may declare; two years of monthly history.
pub const MAX_LAG_DEPTH: u32 = 24;

const TEMPERATURE_NOISE_C: f64 = 3.0;
const TEMPERATURE_DECAY_C: f64 = 0.5;
const HUMIDITY_NOISE_PCT: f64 = 10.0;
const HUMIDITY_DECAY_PCT: f64 = 1.0;
const HUMIDITY_MIN_PCT: f64 = 20.0;
const HUMIDITY_MAX_PCT: f64 = 100.0;
const PRESSURE_NOISE_KPA: f64 = 0.5;
const WIND_NOISE_MS: f64 = 1.0;

/// Unordered feature name to value mapping, as supplied by a caller or
/// produced by the synthesizer.
pub type FeatureMap = HashMap<String, f64>;

/// Weather variables, named by their training-data column codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variable {
    #[serde(rename = "T2M")]
    Temperature,
    #[serde(rename = "RH2M")]
    Humidity,
    #[serde(rename = "WS2M")]
    WindSpeed,
    #[serde(rename = "PS")]
    Pressure,
}

impl Variable {
    pub fn code(&self) -> &'static str {
        match self {
            Variable::Temperature => "T2M",
            Variable::Humidity => "RH2M",
            Variable::WindSpeed => "WS2M",
            Variable::Pressure => "PS",
        }
    }

    pub const fn all() -> &'static [Variable] {
        &[
            Variable::Temperature,
            Variable::Humidity,
            Variable::WindSpeed,
            Variable::Pressure,
        ]
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::all().iter().copied().find(|v| v.code() == code)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single model input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureName {
    Lag { variable: Variable, lag: u32 },
    Month,
    Year,
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureName::Lag { variable, lag } => write!(f, "{}_lag_{lag}", variable.code()),
            FeatureName::Month => f.write_str("month"),
            FeatureName::Year => f.write_str("year"),
        }
    }
}

impl FromStr for FeatureName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => return Ok(FeatureName::Month),
            "year" => return Ok(FeatureName::Year),
            _ => {}
        }

        let (code, lag) = s
            .split_once("_lag_")
            .ok_or_else(|| format!("Unknown feature '{s}'"))?;
        let variable =
            Variable::from_code(code).ok_or_else(|| format!("Unknown variable in feature '{s}'"))?;
        let lag: u32 = lag.parse().map_err(|_| format!("Invalid lag in feature '{s}'"))?;
        if lag == 0 {
            return Err(format!("Lag must start at 1 in feature '{s}'"));
        }
        if lag > MAX_LAG_DEPTH {
            return Err(format!("Lag in feature '{s}' exceeds the maximum of {MAX_LAG_DEPTH}"));
        }

        Ok(FeatureName::Lag { variable, lag })
    }
}

/// The exact, ordered list of inputs a model was trained with.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    features: Vec<FeatureName>,
    keys: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema from trained column names, rejecting unknown or
    /// duplicated names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        if names.is_empty() {
            return Err("feature schema is empty".to_string());
        }

        let mut seen = HashSet::new();
        let mut features = Vec::with_capacity(names.len());
        for name in names {
            let feature: FeatureName = name.as_ref().parse()?;
            if !seen.insert(feature) {
                return Err(format!("duplicate feature '{}'", name.as_ref()));
            }
            features.push(feature);
        }

        Ok(Self::from_features(features))
    }

    /// Lags 1..=`lag_depth`, each listing `variables` in order, then `month`
    /// and optionally `year`.
    pub fn lagged(lag_depth: u32, variables: &[Variable], include_year: bool) -> Self {
        let mut features = Vec::new();
        for lag in 1..=lag_depth {
            for &variable in variables {
                features.push(FeatureName::Lag { variable, lag });
            }
        }
        features.push(FeatureName::Month);
        if include_year {
            features.push(FeatureName::Year);
        }
        Self::from_features(features)
    }

    /// Six lags of temperature, humidity, wind speed and pressure plus month.
    pub fn standard() -> Self {
        Self::lagged(DEFAULT_LAG_DEPTH, Variable::all(), false)
    }

    fn from_features(features: Vec<FeatureName>) -> Self {
        let keys = features.iter().map(ToString::to_string).collect();
        Self { features, keys }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn max_lag(&self) -> u32 {
        self.features
            .iter()
            .filter_map(|f| match f {
                FeatureName::Lag { lag, .. } => Some(*lag),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn needs_year(&self) -> bool {
        self.features.contains(&FeatureName::Year)
    }

    /// Order `map` according to this schema.
    ///
    /// Keys not in the schema are ignored. The first schema key absent from
    /// `map` is reported.
    pub fn select(&self, map: &FeatureMap) -> Result<FeatureVector, PredictError> {
        let mut values = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let value = map.get(key).ok_or_else(|| PredictError::SchemaMismatch {
                feature: key.clone(),
            })?;
            values.push(*value);
        }

        Ok(FeatureVector {
            keys: self.keys.clone(),
            values,
        })
    }
}

/// One row of model input, ordered by a [`FeatureSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    keys: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.keys.iter().map(String::as_str).zip(self.values.iter().copied())
    }
}

/// Fabricates lagged history around a single observation.
#[derive(Debug, Clone, Copy)]
pub struct FeatureSynthesizer {
    lag_depth: u32,
}

impl Default for FeatureSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_LAG_DEPTH)
    }
}

impl FeatureSynthesizer {
    pub fn new(lag_depth: u32) -> Self {
        Self { lag_depth }
    }

    pub fn lag_depth(&self) -> u32 {
        self.lag_depth
    }

    /// Produce every lagged feature up to the configured depth, plus `month`
    /// and `year` of `date`.
    ///
    /// For each lag the draws happen in the order temperature, humidity,
    /// pressure, wind, so a seeded `rng` always yields the same map.
    pub fn synthesize<R: Rng>(
        &self,
        observation: &Observation,
        date: NaiveDate,
        rng: &mut R,
    ) -> Result<FeatureMap, PredictError> {
        observation.ensure_finite()?;

        let mut features = FeatureMap::with_capacity(self.lag_depth as usize * 4 + 2);
        for lag in 1..=self.lag_depth {
            let step = f64::from(lag);

            let temperature = observation.temperature_c
                + rng.gen_range(-TEMPERATURE_NOISE_C..TEMPERATURE_NOISE_C)
                - step * TEMPERATURE_DECAY_C;
            let humidity = (observation.humidity_pct
                + rng.gen_range(-HUMIDITY_NOISE_PCT..HUMIDITY_NOISE_PCT)
                - step * HUMIDITY_DECAY_PCT)
                .clamp(HUMIDITY_MIN_PCT, HUMIDITY_MAX_PCT);
            let pressure =
                observation.pressure_kpa + rng.gen_range(-PRESSURE_NOISE_KPA..PRESSURE_NOISE_KPA);
            let wind =
                (observation.wind_speed_ms + rng.gen_range(-WIND_NOISE_MS..WIND_NOISE_MS)).max(0.0);

            for (variable, value) in [
                (Variable::Temperature, temperature),
                (Variable::Humidity, humidity),
                (Variable::Pressure, pressure),
                (Variable::WindSpeed, wind),
            ] {
                features.insert(FeatureName::Lag { variable, lag }.to_string(), value);
            }
        }

        features.insert(FeatureName::Month.to_string(), f64::from(date.month()));
        features.insert(FeatureName::Year.to_string(), f64::from(date.year()));

        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn observation(humidity: f64, wind: f64) -> Observation {
        Observation {
            temperature_c: 18.5,
            humidity_pct: humidity,
            pressure_kpa: 101.2,
            wind_speed_ms: wind,
            location_name: Some("Lima".into()),
            observed_at: Utc::now(),
        }
    }

    fn august() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 15).expect("valid date")
    }

    #[test]
    fn standard_schema_order() {
        let schema = FeatureSchema::standard();
        assert_eq!(schema.len(), 25);
        assert_eq!(
            &schema.keys()[..5],
            ["T2M_lag_1", "RH2M_lag_1", "WS2M_lag_1", "PS_lag_1", "T2M_lag_2"]
        );
        assert_eq!(schema.keys()[23], "PS_lag_6");
        assert_eq!(schema.keys()[24], "month");
        assert_eq!(schema.max_lag(), 6);
        assert!(!schema.needs_year());
    }

    #[test]
    fn feature_name_parsing() {
        assert_eq!(
            "RH2M_lag_4".parse::<FeatureName>(),
            Ok(FeatureName::Lag {
                variable: Variable::Humidity,
                lag: 4,
            })
        );
        assert_eq!("year".parse::<FeatureName>(), Ok(FeatureName::Year));
        assert!("T2M_lag_0".parse::<FeatureName>().is_err());
        assert!("PS_lag_24".parse::<FeatureName>().is_ok());
        assert!("PS_lag_25".parse::<FeatureName>().is_err());
        assert!("QV2M_lag_1".parse::<FeatureName>().is_err());
        assert!("temperature".parse::<FeatureName>().is_err());
    }

    #[test]
    fn schema_rejects_duplicates() {
        let err = FeatureSchema::from_names(&["month", "T2M_lag_1", "month"]).unwrap_err();
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn synthesized_features_match_schema_exactly() {
        let schema = FeatureSchema::standard();
        let synth = FeatureSynthesizer::default();
        let mut rng = StdRng::seed_from_u64(7);

        let map = synth.synthesize(&observation(85.0, 3.0), august(), &mut rng).unwrap();
        let vector = schema.select(&map).expect("all schema keys synthesized");

        assert_eq!(vector.keys(), schema.keys());
        assert_eq!(vector.len(), schema.len());
        assert_eq!(vector.values()[24], 8.0);
    }

    #[test]
    fn humidity_and_wind_stay_in_physical_range() {
        let schema = FeatureSchema::standard();
        let synth = FeatureSynthesizer::default();

        for (seed, (humidity, wind)) in [(0.0, 0.0), (100.0, 0.2), (25.0, 0.5), (99.0, 12.0)]
            .into_iter()
            .cycle()
            .take(200)
            .enumerate()
        {
            let mut rng = StdRng::seed_from_u64(seed as u64);
            let map = synth.synthesize(&observation(humidity, wind), august(), &mut rng).unwrap();
            let vector = schema.select(&map).unwrap();

            for (key, value) in vector.iter() {
                if key.starts_with("RH2M") {
                    assert!((20.0..=100.0).contains(&value), "{key}={value}");
                }
                if key.starts_with("WS2M") {
                    assert!(value >= 0.0, "{key}={value}");
                }
            }
        }
    }

    #[test]
    fn temperature_drifts_down_with_lag() {
        let synth = FeatureSynthesizer::default();
        let mut rng = StdRng::seed_from_u64(3);
        let map = synth.synthesize(&observation(80.0, 2.0), august(), &mut rng).unwrap();

        for lag in 1..=6 {
            let t = map[&format!("T2M_lag_{lag}")];
            let centre = 18.5 - 0.5 * f64::from(lag);
            assert!((t - centre).abs() <= 3.0, "lag {lag}: {t}");
        }
    }

    #[test]
    fn same_seed_reproduces_features() {
        let schema = FeatureSchema::lagged(6, Variable::all(), true);
        let synth = FeatureSynthesizer::default();
        let obs = observation(70.0, 4.0);

        let first = schema
            .select(&synth.synthesize(&obs, august(), &mut StdRng::seed_from_u64(42)).unwrap())
            .unwrap();
        let second = schema
            .select(&synth.synthesize(&obs, august(), &mut StdRng::seed_from_u64(42)).unwrap())
            .unwrap();
        let other = schema
            .select(&synth.synthesize(&obs, august(), &mut StdRng::seed_from_u64(43)).unwrap())
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.values()[25], 2024.0);
    }

    #[test]
    fn select_names_missing_feature() {
        let schema = FeatureSchema::from_names(&["T2M_lag_1", "PS_lag_1", "month"]).unwrap();
        let map: FeatureMap = [("T2M_lag_1".to_string(), 18.5), ("month".to_string(), 8.0)]
            .into_iter()
            .collect();

        let err = schema.select(&map).unwrap_err();
        assert_eq!(
            err,
            PredictError::SchemaMismatch {
                feature: "PS_lag_1".into(),
            }
        );
    }

    #[test]
    fn select_ignores_extra_keys() {
        let schema = FeatureSchema::from_names(&["month"]).unwrap();
        let map: FeatureMap =
            [("month".to_string(), 3.0), ("year".to_string(), 2024.0)].into_iter().collect();

        let vector = schema.select(&map).unwrap();
        assert_eq!(vector.values(), [3.0]);
    }

    #[test]
    fn non_finite_observation_fails_closed() {
        let synth = FeatureSynthesizer::default();
        let mut obs = observation(80.0, 2.0);
        obs.temperature_c = f64::INFINITY;

        let err = synth.synthesize(&obs, august(), &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, PredictError::DataUnavailable(_)));
    }
}
