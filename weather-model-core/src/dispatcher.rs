//! Runs every loaded model on one feature row and assembles the results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::features::FeatureMap;
use crate::registry::{ModelRegistry, Target};
use crate::PredictError;

/// Inclusive range a prediction is clipped to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn apply(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Optional per-target clipping. Unset targets are returned as predicted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionBounds {
    #[serde(default)]
    pub temperature: Option<Bound>,
    #[serde(default)]
    pub humidity: Option<Bound>,
    #[serde(default)]
    pub wind_speed: Option<Bound>,
    #[serde(default)]
    pub pressure: Option<Bound>,
}

impl PredictionBounds {
    pub fn for_target(&self, target: Target) -> Option<Bound> {
        match target {
            Target::Temperature => self.temperature,
            Target::Humidity => self.humidity,
            Target::WindSpeed => self.wind_speed,
            Target::Pressure => self.pressure,
        }
    }

    /// Reject bounds with `min > max` or non-finite ends.
    pub fn validate(&self) -> Result<(), String> {
        for &target in Target::all() {
            if let Some(b) = self.for_target(target) {
                if !b.min.is_finite() || !b.max.is_finite() || b.min > b.max {
                    return Err(format!("invalid bound for {target}: [{}, {}]", b.min, b.max));
                }
            }
        }
        Ok(())
    }
}

/// Rounded predictions, keyed by target in a stable order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predictions(BTreeMap<Target, f64>);

impl Predictions {
    pub fn get(&self, target: Target) -> Option<f64> {
        self.0.get(&target).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Target, f64)> + '_ {
        self.0.iter().map(|(t, v)| (*t, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Predict every loaded target from `features`.
///
/// Each model pulls its own columns out of `features` in its trained order,
/// so models with different schemas can share one request.
pub fn dispatch(
    registry: &ModelRegistry,
    features: &FeatureMap,
    bounds: &PredictionBounds,
) -> Result<Predictions, PredictError> {
    if registry.is_empty() {
        return Err(PredictError::ModelUnavailable);
    }

    let mut predictions = BTreeMap::new();
    for (target, model) in registry.iter() {
        let row = model.schema().select(features)?;
        let raw = model.predict(&row).inspect_err(|e| {
            tracing::error!(%target, "Inference failed: {e}");
        })?;

        let mut value = round2(raw);
        if let Some(bound) = bounds.for_target(target) {
            value = bound.apply(value);
        }
        tracing::debug!(%target, raw, value, "Prediction");
        predictions.insert(target, value);
    }

    Ok(Predictions(predictions))
}
