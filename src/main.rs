use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Error};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rustqa_serve::api::server;
use rustqa_serve::config::ServiceConfig;
use rustqa_serve::provision::{provision, source_for};
use rustqa_serve::AppState;

#[derive(Parser, Debug)]
#[command(version, about = "Answer questions with a seq2seq ONNX model over HTTP")]
struct Cli {
    /// JSON config file; every field is optional.
    #[arg(long, env = "RUSTQA_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "RUSTQA_HOST")]
    host: Option<String>,

    #[arg(long, env = "RUSTQA_PORT")]
    port: Option<u16>,

    /// Upper bound on generated tokens per answer.
    #[arg(long, env = "RUSTQA_MAX_OUTPUT_LENGTH")]
    max_output_length: Option<usize>,
}

impl Cli {
    fn resolve(self) -> Result<ServiceConfig, Error> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(max_output_length) = self.max_output_length {
            config.generation.max_output_length = max_output_length;
        }
        Ok(config)
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rustqa_serve=info,tower_http=info")),
        )
        .init();

    let config = Cli::parse().resolve()?;
    tracing::debug!("Service config: {:#?}", config);

    // Provisioning and loading run before any runtime exists: the download
    // clients block, and nothing should be served until both succeed.
    let source = source_for(config.artifacts.source);
    let paths = provision(&config.artifacts, source.as_ref())
        .context("could not provision model artifacts")?;
    let state = Arc::new(AppState::load(&paths, &config).context("could not load model")?);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tokio::runtime::Runtime::new()?
        .block_on(server::serve(state, &addr))
        .with_context(|| format!("server on {addr} failed"))?;

    Ok(())
}
