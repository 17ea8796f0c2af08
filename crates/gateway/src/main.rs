//! `wardline` — the hospital operations gateway binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ward_domain::config::Config;
use ward_gateway::{api, bootstrap};

#[derive(Parser)]
#[command(name = "wardline", about = "Hospital operations orchestration gateway")]
struct Cli {
    /// Path to the config file (defaults to ./wardline.toml when present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Override the configured port.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List the registered tool catalog and exit.
    Tools,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = path.or_else(|| {
        let default = PathBuf::from("wardline.toml");
        default.exists().then_some(default)
    });
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config = toml::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            tracing::info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => {
            tracing::info!("no config file found, using defaults");
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config)?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let config = Arc::new(config);
            let state = bootstrap::build_app_state(config.clone()).await?;
            bootstrap::spawn_background_tasks(&state);

            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            tracing::info!(
                addr = %addr,
                tools = state.registry.tool_count(),
                "wardline gateway listening"
            );

            let registry = state.registry.clone();
            let app = api::router().with_state(state);
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("shutdown signal received");
                    registry.teardown();
                })
                .await
                .context("serving HTTP")?;
        }
        Command::Tools => {
            let state = bootstrap::build_app_state(Arc::new(config)).await?;
            for descriptor in state.registry.list() {
                println!(
                    "{:40} [{}]{}  {}",
                    descriptor.name,
                    descriptor.owning_agent,
                    if descriptor.side_effecting { "*" } else { " " },
                    descriptor.description
                );
            }
        }
    }

    Ok(())
}
