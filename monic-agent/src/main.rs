//! Monic - host monitoring agent
//!
//! Samples system resources, HTTP endpoints and containers on a timer,
//! debounces unhealthy readings and sends alert and recovery notices:
//! - Resource sampling via sysinfo
//! - Endpoint probes via reqwest
//! - Container status via the docker CLI
//! - Notifications via SMTP, Mailgun and Telegram
//! - Optional read-only JSON stats endpoint

mod channels;
mod config;
mod containers;
mod discovery;
mod http;
mod metrics;
mod probe;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use monic_core::{Collaborators, ContainerLister, Monitor};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::containers::DockerCli;
use crate::discovery::HostInfo;
use crate::http::AppState;
use crate::metrics::SysinfoCollector;
use crate::probe::HttpProber;

#[derive(Debug, Parser)]
#[command(name = "monic", version, about = "Host monitoring agent with debounced alerting")]
struct Cli {
    /// Configuration file (defaults to <config_dir>/monic/config.toml)
    #[arg(short, long, env = "MONIC_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("monic=info,monic_core=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = config::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if cli.check_config {
        info!("Configuration is valid");
        return Ok(());
    }

    info!("Monic agent {} starting...", env!("CARGO_PKG_VERSION"));
    let host = HostInfo::discover();

    let channels = channels::build_channels(&config.alerting, &config.app_name)
        .context("Failed to configure alert channels")?;
    let containers = config
        .containers
        .enabled
        .then(|| Arc::new(DockerCli::new()) as Arc<dyn ContainerLister>);
    let collaborators = Collaborators {
        resources: Arc::new(SysinfoCollector::new()),
        prober: Arc::new(HttpProber::new().context("Failed to create HTTP prober")?),
        containers,
        channels,
    };

    let monitor = Arc::new(Monitor::new(config.clone(), collaborators));
    let handle = monitor.clone().start().await;

    let (stop_server, server_stopped) = tokio::sync::oneshot::channel::<()>();
    let server = config.http_server.clone().map(|server_config| {
        let state = AppState::new(monitor.clone(), host, &server_config);
        tokio::spawn(async move {
            http::serve(&server_config, state, async {
                let _ = server_stopped.await;
            })
            .await
        })
    });

    wait_for_signal().await?;
    info!("Shutdown signal received");

    handle.shutdown().await;
    let _ = stop_server.send(());
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("{:#}", e),
            Err(e) => error!("Stats server task failed: {}", e),
        }
    }

    info!("Monic agent stopped");
    Ok(())
}
