//! Error taxonomy for the prediction request path.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while answering a prediction request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    /// Missing or malformed request input.
    #[error("{0}")]
    InvalidInput(String),

    /// A feature required by a model's schema was not supplied.
    #[error("Missing required feature: '{feature}'")]
    SchemaMismatch { feature: String },

    /// No model was loaded at startup.
    #[error("No prediction model is available.")]
    ModelUnavailable,

    /// Live weather could not be obtained; nothing is substituted.
    #[error("Could not obtain live weather data: {0}")]
    DataUnavailable(String),

    /// Model evaluation failed.
    #[error("Model inference failed: {0}")]
    Inference(String),

    #[error("{0}")]
    NotFound(String),
}

impl PredictError {
    /// Message safe to return to a caller.
    ///
    /// Inference details stay in the logs; the caller only learns that the
    /// model failed.
    pub fn public_message(&self) -> String {
        match self {
            Self::Inference(_) => "An error occurred during model prediction.".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::SchemaMismatch { .. } | Self::NotFound(_)
        )
    }
}

/// Errors raised while loading a model artifact at startup.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid model artifact: {0}")]
    Invalid(String),
}
