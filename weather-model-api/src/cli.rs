use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::Password;
use weather_model_core::{
    Config, Coordinates, ModelRegistry, PredictionService, ProviderId,
    provider::default_provider_from_config,
};

use crate::{http_server, response::LiveResponse};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-model", version, about = "Weather model prediction service")]
pub struct Cli {
    /// Path to the config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the prediction API over HTTP.
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Directory holding `model_<TARGET>.json` artifacts.
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },

    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Run one live prediction and print the response JSON.
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };
        // `configure` must be able to repair a file that fails validation.
        let mut config = match self.command {
            Command::Configure { .. } => Config::load_unvalidated(&config_path)?,
            _ => Config::load_from(&config_path)?,
        };

        match self.command {
            Command::Serve { host, port, models_dir } => {
                if let Some(dir) = models_dir {
                    config.models.dir = dir;
                }
                let host = host.unwrap_or_else(|| config.server.host.clone());
                let port = port.unwrap_or(config.server.port);

                let service = build_service(&config);
                http_server::run_http_server(Arc::new(service), &host, port).await?;
            }
            Command::Configure { provider } => {
                let id = ProviderId::try_from(provider.as_str())?;
                let api_key = Password::new(&format!("API key for {id}:"))
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read API key")?;

                config.upsert_provider_api_key(id, api_key.trim().to_string());
                config.save_to(&config_path)?;
                println!("Saved {id} credentials to {}", config_path.display());
            }
            Command::Predict { lat, lng, models_dir } => {
                if let Some(dir) = models_dir {
                    config.models.dir = dir;
                }
                let coordinates = Coordinates::new(lat, lng)?;
                let service = build_service(&config);

                let live = service.predict_live(coordinates).await?;
                println!("{}", serde_json::to_string_pretty(&LiveResponse::from(&live))?);
            }
        }

        Ok(())
    }
}

/// Load models and wire the provider. Neither failure is fatal: the service
/// starts degraded and reports the problem per request.
pub fn build_service(config: &Config) -> PredictionService {
    let registry = Arc::new(ModelRegistry::load_from_dir(&config.models.dir));

    let mut service =
        PredictionService::new(registry).with_bounds(config.prediction.bounds.clone());

    match default_provider_from_config(config) {
        Ok(provider) => service = service.with_provider(Arc::from(provider)),
        Err(e) => tracing::warn!("Live weather disabled: {e}"),
    }
    if let Some(seed) = config.prediction.seed {
        tracing::info!(seed, "Using seeded feature synthesis");
        service = service.with_seed(seed);
    }

    service
}
