//! Pre-trained regression artifacts.
//!
//! Models are exported from the training environment as JSON: the target
//! variable, the ordered feature names the model was fitted on, and either a
//! linear model or a tree ensemble. Everything is validated on load so that
//! inference never indexes out of bounds.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelLoadError;
use crate::features::{FeatureSchema, FeatureVector};
use crate::registry::Target;
use crate::PredictError;

/// Something that maps one ordered feature row to a scalar.
pub trait Regressor: Send + Sync + std::fmt::Debug {
    fn schema(&self) -> &FeatureSchema;

    fn kind(&self) -> &'static str;

    fn predict(&self, row: &FeatureVector) -> Result<f64, PredictError>;
}

/// On-disk representation of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub target: Target,
    pub feature_names: Vec<String>,
    pub model: ModelSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    Linear {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    TreeEnsemble {
        #[serde(default)]
        aggregation: Aggregation,
        #[serde(default)]
        base_score: f64,
        trees: Vec<Tree>,
    },
}

/// How per-tree outputs are combined: random forests average, boosted
/// ensembles add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Mean,
    Sum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

/// `x[feature] <= threshold` goes to `left`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A validated model ready for inference.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    target: Target,
    schema: FeatureSchema,
    spec: ModelSpec,
}

impl LoadedModel {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let contents = fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&contents).map_err(|source| ModelLoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelLoadError> {
        let schema =
            FeatureSchema::from_names(&artifact.feature_names).map_err(ModelLoadError::Invalid)?;
        validate_spec(&artifact.model, schema.len())?;

        Ok(Self {
            target: artifact.target,
            schema,
            spec: artifact.model,
        })
    }

    pub fn target(&self) -> Target {
        self.target
    }
}

impl Regressor for LoadedModel {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn kind(&self) -> &'static str {
        match self.spec {
            ModelSpec::Linear { .. } => "linear",
            ModelSpec::TreeEnsemble { .. } => "tree_ensemble",
        }
    }

    fn predict(&self, row: &FeatureVector) -> Result<f64, PredictError> {
        if row.len() != self.schema.len() {
            return Err(PredictError::Inference(format!(
                "{} model expects {} features, got {}",
                self.target,
                self.schema.len(),
                row.len()
            )));
        }
        if let Some((key, value)) = row.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PredictError::Inference(format!(
                "feature '{key}' is not finite ({value})"
            )));
        }

        let x = row.values();
        let prediction = match &self.spec {
            ModelSpec::Linear { coefficients, intercept } => {
                intercept + coefficients.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
            }
            ModelSpec::TreeEnsemble { aggregation, base_score, trees } => {
                let mut total = 0.0;
                for (i, tree) in trees.iter().enumerate() {
                    total += tree
                        .evaluate(x)
                        .ok_or_else(|| PredictError::Inference(format!("tree {i} is malformed")))?;
                }
                match aggregation {
                    Aggregation::Mean => base_score + total / trees.len() as f64,
                    Aggregation::Sum => base_score + total,
                }
            }
        };

        if !prediction.is_finite() {
            return Err(PredictError::Inference(format!(
                "{} model produced a non-finite value",
                self.target
            )));
        }
        Ok(prediction)
    }
}

impl Tree {
    fn evaluate(&self, x: &[f64]) -> Option<f64> {
        let mut index = 0;
        // Children always point forward, so this walk is bounded by the node count.
        loop {
            match self.nodes.get(index)? {
                TreeNode::Leaf { value } => return Some(*value),
                TreeNode::Split { feature, threshold, left, right } => {
                    index = if *x.get(*feature)? <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

fn validate_spec(spec: &ModelSpec, n_features: usize) -> Result<(), ModelLoadError> {
    match spec {
        ModelSpec::Linear { coefficients, intercept } => {
            if coefficients.len() != n_features {
                return Err(ModelLoadError::Invalid(format!(
                    "linear model has {} coefficients for {} features",
                    coefficients.len(),
                    n_features
                )));
            }
            if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                return Err(ModelLoadError::Invalid(
                    "linear model contains non-finite weights".to_string(),
                ));
            }
        }
        ModelSpec::TreeEnsemble { base_score, trees, .. } => {
            if trees.is_empty() {
                return Err(ModelLoadError::Invalid("tree ensemble has no trees".to_string()));
            }
            if !base_score.is_finite() {
                return Err(ModelLoadError::Invalid("base_score is not finite".to_string()));
            }
            for (t, tree) in trees.iter().enumerate() {
                validate_tree(tree, n_features)
                    .map_err(|msg| ModelLoadError::Invalid(format!("tree {t}: {msg}")))?;
            }
        }
    }
    Ok(())
}

fn validate_tree(tree: &Tree, n_features: usize) -> Result<(), String> {
    if tree.nodes.is_empty() {
        return Err("no nodes".to_string());
    }
    let n_nodes = tree.nodes.len();
    for (i, node) in tree.nodes.iter().enumerate() {
        match node {
            TreeNode::Leaf { value } if !value.is_finite() => {
                return Err(format!("node {i} has a non-finite leaf value"));
            }
            TreeNode::Leaf { .. } => {}
            TreeNode::Split { feature, threshold, left, right } => {
                if *feature >= n_features {
                    return Err(format!("node {i} splits on feature {feature} of {n_features}"));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {i} has a non-finite threshold"));
                }
                for child in [*left, *right] {
                    if child <= i || child >= n_nodes {
                        return Err(format!("node {i} has invalid child {child}"));
                    }
                }
            }
        }
    }
    Ok(())
}
