//! Binary crate for the `weather-model` service.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Serving predictions over HTTP
//! - Interactive provider configuration

use clap::Parser;

mod cli;
mod http_server;
mod response;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
