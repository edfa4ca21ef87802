//! AiGuard demo server
//!
//! A mock chat-completions endpoint with the AiGuard safety filter between
//! the generator and the client, plus admin routes for hot-reloading the
//! rule set.

use anyhow::Result;
use aiguard_policy::{Engine, FilterMode, YamlDirSource};
use aiguard_stream::Orchestrator;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

mod config;
mod mock;
mod routes;

use config::ServerConfig;
use routes::AppState;

#[derive(Parser, Debug)]
#[command(name = "aiguard-server")]
#[command(about = "Mock LLM server with streaming safety filtering", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Directory holding rule YAML files
    #[arg(long)]
    pub policies: Option<String>,

    /// Block-rule behaviour: mask or truncate
    #[arg(short, long, value_parser = parse_action)]
    pub action: Option<FilterMode>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_action(value: &str) -> Result<FilterMode, String> {
    match value {
        "mask" => Ok(FilterMode::Mask),
        "truncate" => Ok(FilterMode::Truncate),
        other => Err(format!("unknown action '{}', expected mask or truncate", other)),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ServerConfig::load(&cli.config, &cli)?;
    info!(policies = %config.policies_dir, action = ?config.guard.action, "starting aiguard server");

    let engine = Arc::new(Engine::new(YamlDirSource::new(&config.policies_dir))?);
    let orchestrator = Arc::new(Orchestrator::new(engine, config.guard_config())?);
    let state = Arc::new(AppState { orchestrator });

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, routes::router(state)).await?;
    Ok(())
}
