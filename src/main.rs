//! racewire - race telemetry relay
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (UDP 0.0.0.0:20777, HTTP 0.0.0.0:8080)
//! cargo run --release
//!
//! # Feed it synthetic laps
//! cargo run --release --bin udp-replay -- --target 127.0.0.1:20777
//!
//! # Custom config, fresh durable log
//! ./racewire --config racewire.toml --reset-log
//! ```
//!
//! # Environment Variables
//!
//! - `RACEWIRE_CONFIG`: path to a TOML config file
//! - `RACEWIRE_LOG_JSON`: set to `1` for JSON log lines
//! - `RACEWIRE_CORS_ORIGINS`: comma-separated allowed origins (or `*`)
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use racewire::api::create_app;
use racewire::config::{self, RelayConfig};
use racewire::pipeline::{drain, run_supervisor, Relay, TaskName};
use racewire::stream::{SledLog, StreamLog};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "racewire")]
#[command(about = "Race telemetry relay: UDP ingestion, agent dispatch, live fan-out")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides RACEWIRE_CONFIG and ./racewire.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// HTTP / WebSocket bind address
    #[arg(long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// UDP telemetry bind address
    #[arg(long, value_name = "HOST:PORT")]
    udp: Option<String>,

    /// Durable log directory
    #[arg(long, value_name = "DIR")]
    data_dir: Option<String>,

    /// Wipe the durable log on startup
    #[arg(long, env = "RACEWIRE_RESET_LOG")]
    reset_log: bool,

    /// Do not run the in-process eda / explainer agents
    #[arg(long)]
    no_builtin_agents: bool,
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("RACEWIRE_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<RelayConfig> {
    let mut relay_config = match &args.config {
        Some(path) => RelayConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RelayConfig::load(),
    };

    if let Some(addr) = &args.addr {
        relay_config.server.addr = addr.clone();
    }
    if let Some(udp) = &args.udp {
        relay_config.ingest.udp_bind = udp.clone();
    }
    if let Some(dir) = &args.data_dir {
        relay_config.log.data_dir = dir.clone();
    }
    if args.no_builtin_agents {
        relay_config.agents.builtin = false;
    }
    relay_config.validate()?;
    Ok(relay_config)
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {e}"))
            }
        }
    });
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = CliArgs::parse();

    let relay_config = load_config(&args)?;
    config::init(relay_config.clone());

    info!("racewire {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        http = %relay_config.server.addr,
        udp = %relay_config.ingest.udp_bind,
        log_dir = %relay_config.log.data_dir,
        builtin_agents = relay_config.agents.builtin,
        "Configuration"
    );

    let sled_log = SledLog::open(&relay_config.log.data_dir, &relay_config.log)
        .with_context(|| format!("Failed to open durable log at {}", relay_config.log.data_dir))?;
    if args.reset_log {
        sled_log.reset()?;
    }
    let sled_log = Arc::new(sled_log);
    let log: Arc<dyn StreamLog> = Arc::clone(&sled_log) as Arc<dyn StreamLog>;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let http_listener = tokio::net::TcpListener::bind(&relay_config.server.addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", relay_config.server.addr))?;
    info!(addr = %relay_config.server.addr, "HTTP / WebSocket listening");

    let relay = Relay::new(relay_config, log);
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    let handle = relay.start(&mut task_set, &cancel_token).await?;
    spawn_http_server(&mut task_set, http_listener, create_app(handle.api), cancel_token.clone());

    let outcome = run_supervisor(&mut task_set, cancel_token.clone()).await;
    cancel_token.cancel();
    drain(&mut task_set).await;

    if let Err(e) = sled_log.flush() {
        error!(error = %e, "Final log flush failed");
    }

    match outcome {
        Ok(()) => {
            info!("racewire shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("racewire stopping after fatal error: {:#}", e);
            Err(e)
        }
    }
}
