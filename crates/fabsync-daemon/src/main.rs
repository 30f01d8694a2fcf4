//! `fabsync` Daemon
//!
//! Mirrors equipment state from the equipment-management API, keeps it
//! current through polling and webhooks, and serves it over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use fabsync_core::SystemClock;
use fabsync_core::config::{Config, load_config};
use fabsync_daemon::client::{ClientConfig, FabmanClient};
use fabsync_daemon::server::{AppState, build_router};
use fabsync_daemon::{Engine, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "fabsync-daemon")]
#[command(version, about = "fabsync daemon - equipment state mirror and webhook receiver")]
struct Args {
    /// Directory whose `.fabsync/settings.json` is loaded (default: current directory)
    #[arg(long, env = "FABSYNC_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// HTTP bind address
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// API root (e.g. "<https://fabman.io/api/v1>")
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer API token
    #[arg(long)]
    api_token: Option<String>,

    /// Seconds between periodic polls
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Disable periodic polling; only webhooks and deferred checks refresh
    #[arg(long)]
    no_periodic_sync: bool,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "FABSYNC_LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// CLI flags win over files and environment.
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = self.addr {
            config.server.addr = addr;
        }
        if let Some(url) = &self.api_url {
            config.api.url.clone_from(url);
        }
        if let Some(token) = &self.api_token {
            config.api.token = Some(token.clone());
        }
        if let Some(secs) = self.poll_interval {
            config.sync.poll_interval_secs = secs;
        }
        if self.no_periodic_sync {
            config.sync.enable_periodic_sync = false;
        }
        if let Some(level) = &self.log_level {
            config.server.log_level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let project_dir = match &args.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let mut config = load_config(Some(&project_dir))?;
    args.apply(&mut config);
    config.validate()?;

    let level = &config.server.log_level;
    fabsync_core::tracing_init::init_tracing(
        &format!("fabsync_daemon={level},fabsync_core={level}"),
        args.log_json,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        api_url = %config.api.url,
        periodic_sync = config.sync.enable_periodic_sync,
        poll_interval_secs = config.sync.poll_interval_secs,
        "Starting fabsync-daemon"
    );

    let client = FabmanClient::new(&ClientConfig {
        base_url: config.api.url.clone(),
        token: config.api.token.clone().unwrap_or_default(),
        page_limit: config.api.page_limit,
    })?;
    let engine = Arc::new(Engine::new(
        Arc::new(client),
        EngineConfig::from(&config.sync),
        Arc::new(SystemClock),
    ));

    // Consumers are only exposed once the first poll has finished.
    engine.start().await;

    let app = build_router(AppState {
        engine: Arc::clone(&engine),
        api_url: config.api.url.clone(),
    });
    let listener = tokio::net::TcpListener::bind(config.server.addr).await?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the daemon is ready to serve (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    info!(addr = %config.server.addr, "HTTP server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            #[cfg(unix)]
            let sigterm_future = sigterm.recv();
            #[cfg(not(unix))]
            let sigterm_future = std::future::pending::<Option<()>>();

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C shutdown signal");
                }
                _ = sigterm_future => {
                    info!("Received SIGTERM shutdown signal");
                }
            }
        })
        .await?;

    engine.shutdown().await;
    info!("Daemon stopped");
    Ok(())
}
