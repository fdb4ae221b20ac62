//! Peel binary entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use peel::config::{ConfigLoader, ConfigOverrides, LogFormat, LogLevel};
use peel::modules::control_plane::ControlPlane;
use peel::modules::relay::{HttpRouteResolver, Relay, RouteResolver};

/// Transparent UDP relay pinning each player IP to a backend server.
#[derive(Parser, Debug)]
#[command(name = "peel", version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "PEEL_CONFIG")]
    config: Option<PathBuf>,

    /// UDP address players connect to.
    #[arg(long, env = "PEEL_LISTEN_ADDR")]
    listen: Option<SocketAddr>,

    /// HTTP control plane address.
    #[arg(long, env = "PEEL_API_ADDR")]
    api: Option<SocketAddr>,

    /// Base URL of the route-assignment service. Empty disables lookups.
    #[arg(long, alias = "bananasplit", env = "PEEL_RESOLVER_URL")]
    resolver_url: Option<String>,

    /// Socket receive buffer size in bytes.
    #[arg(long, env = "PEEL_BUFFER_SIZE")]
    buffer: Option<usize>,

    /// Log level.
    #[arg(long, env = "PEEL_LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,

    /// Log format.
    #[arg(long, env = "PEEL_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,
}

/// Resolver URL variable read by older deployments.
const LEGACY_RESOLVER_URL_ENV: &str = "BANANASPLIT_URL";

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        self.overrides_with(std::env::var(LEGACY_RESOLVER_URL_ENV).ok())
    }

    fn overrides_with(&self, legacy_resolver_url: Option<String>) -> ConfigOverrides {
        ConfigOverrides {
            listen_addr: self.listen,
            api_addr: self.api,
            resolver_url: self.resolver_url.clone().or(legacy_resolver_url),
            recv_buffer_size: self.buffer,
            log_level: self.log_level,
            log_format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new()
        .resolve(args.config.as_deref(), args.overrides())
        .context("failed to load configuration")?;

    peel::logging::init(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting peel");

    let resolver = HttpRouteResolver::new(&config.resolver).context("failed to build route resolver")?;
    match resolver.endpoint() {
        Some(endpoint) => info!(%endpoint, "Route-assignment service configured"),
        None => warn!("No route-assignment service configured; only injected routes will be used"),
    }
    let resolver: Arc<dyn RouteResolver> = Arc::new(resolver);

    let relay = Relay::bind(config.relay.clone(), resolver)
        .await
        .context("failed to start UDP relay")?;

    let control_plane = ControlPlane::bind(&config.control_plane, Arc::clone(&relay))
        .await
        .context("failed to start control plane")?;

    info!(
        relay = %relay.local_addr(),
        api = %control_plane.local_addr(),
        recv_buffer = config.relay.recv_buffer_size,
        log_level = %config.logging.level,
        "Peel running"
    );

    let relay_task = tokio::spawn(Arc::clone(&relay).run());
    let api_task = tokio::spawn(control_plane.serve(relay.shutdown_token()));

    shutdown_signal().await;
    info!("Shutdown signal received");

    relay.stop().await;

    match relay_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Relay loop ended with error"),
        Err(e) => warn!(error = %e, "Relay task failed"),
    }
    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Control plane ended with error"),
        Err(e) => warn!(error = %e, "Control plane task failed"),
    }

    let stats = relay.stats();
    info!(
        received = stats.datagrams_received,
        forwarded = stats.datagrams_forwarded,
        replied = stats.datagrams_replied,
        dropped = stats.datagrams_dropped,
        resolver_failures = stats.resolver_failures,
        sessions_created = stats.sessions_created,
        sessions_closed = stats.sessions_closed,
        "Peel stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
