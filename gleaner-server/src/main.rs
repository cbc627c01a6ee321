//! # Gleaner Server
//!
//! Runs catalog extraction jobs in the background and exposes their
//! lifecycle over HTTP:
//!
//! - **Runs**: create a run from a list of catalog items, poll its snapshot
//! - **Live events**: per-run log lines and outcomes as server-sent events
//! - **Resolution**: supply shorter names for over-length attribute labels
//! - **Archives**: download the packaged CSV and attachments of a run
//! - **History**: every finished attempt, most recent first

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser};
use gleaner_core::RunOrchestrator;
use gleaner_server::{
    create_app,
    infra::{
        config::{Config, ConfigLoad, ConfigLoader},
        startup::wire_app_state,
    },
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "gleaner-server")]
#[command(about = "Catalog extraction runs with live progress and archives")]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to the configuration file (overrides GLEANER_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file to load before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_server(cli.serve).await
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Arc<Config>> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &args.env_file {
        loader = loader.with_env_file(path);
    }

    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    Ok(Arc::new(config))
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(&args)?;
    let state = wire_app_state(Arc::clone(&config))?;
    let orchestrator = state.orchestrator().clone();

    let addr = resolve_addr(&config).await?;
    let router = create_app(state);

    info!(
        "Starting Gleaner server (HTTP) on {}:{}",
        config.server.host, config.server.port
    );
    if config.dev_mode {
        warn!("DEV_MODE is enabled; CORS accepts any origin");
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(orchestrator))
        .await?;

    info!("server stopped");
    Ok(())
}

async fn resolve_addr(config: &Config) -> anyhow::Result<SocketAddr> {
    if let Some(addr) = config.server.socket_addr() {
        return Ok(addr);
    }
    tokio::net::lookup_host((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| format!("failed to resolve {}", config.server.host))?
        .next()
        .with_context(|| {
            format!("{} resolved to no addresses", config.server.host)
        })
}

/// Waits for ctrl-c or SIGTERM, then stops active runs so their event
/// streams finish and open connections can drain.
async fn shutdown_signal(orchestrator: RunOrchestrator) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
    orchestrator.shutdown().await;
}
