//! Rendering reverse proxy server.
//!
//! ```text
//!   GET|POST /proxy?url=&mode=   classify → render + rewrite, or direct fetch
//!   GET      /resource?url=      direct fetch
//!   GET      /health             liveness + render session state
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use render_proxy::config::watcher::ConfigWatcher;
use render_proxy::config::DeploymentProfile;
use render_proxy::lifecycle::{signals, startup, Shutdown};
use render_proxy::observability::{logging, metrics};
use render_proxy::{render, HttpServer};

#[derive(Debug, Parser)]
#[command(name = "render-proxy", version, about = "Rendering reverse proxy")]
struct Args {
    /// TOML configuration file, watched for classifier changes.
    #[arg(short, long, env = "RENDER_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides `listener.bind_address`.
    #[arg(short, long, env = "RENDER_PROXY_BIND")]
    bind: Option<String>,

    /// Engine executable, skips the install search.
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Deployment profile: local, container or serverless.
    #[arg(long, env = "RENDER_PROFILE")]
    profile: Option<DeploymentProfile>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = startup::resolve_config(
        args.config.as_deref(),
        startup::Overrides {
            bind_address: args.bind,
            executable: args.chrome_path,
            profile: args.profile,
        },
    )?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "render-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        profile = ?config.render.profile,
        strategies = config.navigation.strategies.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, render::default_engine())?;
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    tokio::select! {
        _ = signals::wait_for_termination() => {
            shutdown.trigger();
            (&mut server_task).await??;
        }
        result = &mut server_task => result??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
