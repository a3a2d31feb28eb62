use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::features::Variable;
use crate::regressor::{LoadedModel, Regressor};

/// A variable the service predicts, one model per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "T2M")]
    Temperature,
    #[serde(rename = "RH2M")]
    Humidity,
    #[serde(rename = "WS2M")]
    WindSpeed,
    #[serde(rename = "PS")]
    Pressure,
}

impl Target {
    pub const fn all() -> &'static [Target] {
        &[
            Target::Temperature,
            Target::Humidity,
            Target::WindSpeed,
            Target::Pressure,
        ]
    }

    pub fn code(&self) -> &'static str {
        self.variable().code()
    }

    pub fn variable(&self) -> Variable {
        match self {
            Target::Temperature => Variable::Temperature,
            Target::Humidity => Variable::Humidity,
            Target::WindSpeed => Variable::WindSpeed,
            Target::Pressure => Variable::Pressure,
        }
    }

    /// Field name in the live-prediction response.
    pub fn label(&self) -> &'static str {
        match self {
            Target::Temperature => "temperature_celsius",
            Target::Humidity => "humidity_percent",
            Target::WindSpeed => "wind_speed_ms",
            Target::Pressure => "pressure_kpa",
        }
    }

    /// Field name in the feature-vector prediction response.
    pub fn predicted_label(&self) -> &'static str {
        match self {
            Target::Temperature => "predicted_temperature",
            Target::Humidity => "predicted_humidity",
            Target::WindSpeed => "predicted_wind_speed",
            Target::Pressure => "predicted_pressure",
        }
    }

    /// Conventional artifact file name, e.g. `model_T2M.json`.
    pub fn file_name(&self) -> String {
        format!("model_{}.json", self.code())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Models loaded at startup. Never mutated afterwards.
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<Target, Arc<dyn Regressor>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `model_<TARGET>.json` for every target found in `dir`.
    ///
    /// A model that fails to load is logged and skipped; the registry may
    /// end up empty, in which case predictions report the service as
    /// unavailable instead of the process exiting.
    pub fn load_from_dir(dir: &Path) -> Self {
        tracing::info!(dir = %dir.display(), "Loading prediction models");

        let mut registry = Self::new();
        for &target in Target::all() {
            let path = dir.join(target.file_name());
            match LoadedModel::load(&path) {
                Ok(model) if model.target() != target => {
                    tracing::error!(
                        file = %path.display(),
                        declared = %model.target(),
                        "Model file declares a different target, skipping"
                    );
                }
                Ok(model) => {
                    tracing::info!(
                        %target,
                        kind = model.kind(),
                        features = model.schema().len(),
                        "Loaded model '{}'",
                        path.display()
                    );
                    registry.insert(target, Arc::new(model));
                }
                Err(e) => {
                    tracing::error!(%target, "Failed to load model: {e}");
                }
            }
        }

        if registry.is_empty() {
            tracing::warn!("No models loaded; prediction endpoints will be unavailable");
        }
        registry
    }

    pub fn with_model(mut self, target: Target, model: Arc<dyn Regressor>) -> Self {
        self.insert(target, model);
        self
    }

    fn insert(&mut self, target: Target, model: Arc<dyn Regressor>) {
        self.models.insert(target, model);
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn targets(&self) -> Vec<Target> {
        self.models.keys().copied().collect()
    }

    /// Models in target order.
    pub fn iter(&self) -> impl Iterator<Item = (Target, &Arc<dyn Regressor>)> {
        self.models.iter().map(|(t, m)| (*t, m))
    }

    /// Deepest lag any loaded model consumes.
    pub fn max_lag_depth(&self) -> u32 {
        self.models.values().map(|m| m.schema().max_lag()).max().unwrap_or(0)
    }

    pub fn needs_year(&self) -> bool {
        self.models.values().any(|m| m.schema().needs_year())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSchema;
    use crate::regressor::ModelArtifact;
    use serde_json::json;
    use std::fs;

    fn write_linear(dir: &Path, target: &str, schema: &FeatureSchema) {
        let artifact = json!({
            "target": target,
            "feature_names": schema.keys(),
            "model": {
                "type": "linear",
                "coefficients": vec![0.0; schema.len()],
                "intercept": 1.0
            }
        });
        fs::write(dir.join(format!("model_{target}.json")), artifact.to_string()).unwrap();
    }

    #[test]
    fn target_labels() {
        assert_eq!(Target::Temperature.label(), "temperature_celsius");
        assert_eq!(Target::Pressure.predicted_label(), "predicted_pressure");
        assert_eq!(Target::Humidity.file_name(), "model_RH2M.json");
    }

    #[test]
    fn loads_available_models_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_linear(dir.path(), "T2M", &FeatureSchema::standard());
        write_linear(dir.path(), "PS", &FeatureSchema::standard());
        fs::write(dir.path().join("model_RH2M.json"), "{ not json").unwrap();

        let registry = ModelRegistry::load_from_dir(dir.path());

        assert_eq!(registry.targets(), vec![Target::Temperature, Target::Pressure]);
        assert_eq!(registry.max_lag_depth(), 6);
        assert!(!registry.needs_year());
    }

    #[test]
    fn empty_directory_yields_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::load_from_dir(dir.path());
        assert!(registry.is_empty());
        assert_eq!(registry.max_lag_depth(), 0);
    }

    #[test]
    fn rejects_model_declaring_another_target() {
        let dir = tempfile::tempdir().unwrap();
        write_linear(dir.path(), "T2M", &FeatureSchema::standard());
        fs::rename(dir.path().join("model_T2M.json"), dir.path().join("model_WS2M.json")).unwrap();

        let registry = ModelRegistry::load_from_dir(dir.path());
        assert!(registry.is_empty());
    }

    #[test]
    fn year_requirement_is_tracked() {
        let schema = FeatureSchema::lagged(6, &[Variable::Temperature], true);
        let artifact: ModelArtifact = serde_json::from_value(json!({
            "target": "T2M",
            "feature_names": schema.keys(),
            "model": { "type": "linear", "coefficients": vec![1.0; schema.len()], "intercept": 0.0 }
        }))
        .unwrap();
        let model = LoadedModel::from_artifact(artifact).unwrap();

        let registry = ModelRegistry::new().with_model(Target::Temperature, Arc::new(model));
        assert!(registry.needs_year());
        assert_eq!(registry.len(), 1);
    }
}
