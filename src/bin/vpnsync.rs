//! vpnsync - VPN Service Lifecycle Tool
//!
//! Offline inspection of the VPN driver over a registry fixture: build the
//! snapshots an agent would receive, resolve router gateway IPs, and replay
//! lifecycle events to see the notifications they produce.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libvpnsync::vpn::{dispatch, resolve_gateway_ips, IpsecVpnDriver, LifecycleEvent};
use libvpnsync::{DriverConfig, Flavor, InMemoryRegistry, RequestContext, ServiceRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "vpnsync")]
#[command(version)]
#[command(about = "VPN service lifecycle tool - snapshots, gateway IPs and event replay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Registry fixture (JSON)
    #[arg(short, long)]
    registry: PathBuf,

    /// Driver configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the service snapshots an agent on HOST would receive
    Snapshot {
        #[arg(long)]
        host: String,
        /// Service flavor: ipsec, pptp, openvpn
        #[arg(long)]
        flavor: Option<Flavor>,
    },
    /// Print the gateway IPs a new VPN service on ROUTER would get
    Resolve {
        #[arg(long)]
        router: String,
    },
    /// Dispatch a JSON array of lifecycle events, printing each notification
    Replay {
        #[arg(long)]
        events: PathBuf,
        /// Write the resulting registry state to this file
        #[arg(long)]
        save_registry: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match &cli.config {
        Some(path) => DriverConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DriverConfig::default(),
    };

    let registry = Arc::new(
        InMemoryRegistry::load(&cli.registry)
            .await
            .with_context(|| format!("Failed to load registry {}", cli.registry.display()))?,
    );
    let ctx = RequestContext::admin();

    match cli.command {
        Commands::Snapshot { host, flavor } => {
            let (driver, _rx) = IpsecVpnDriver::new(registry, config);
            let snapshots = driver
                .callbacks()
                .get_vpn_services_on_host(&ctx, &host, flavor)
                .await
                .with_context(|| format!("Failed to build snapshots for host {}", host))?;
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
        Commands::Resolve { router } => {
            let router = registry.get_router(&ctx, &router).await?;
            let ips = resolve_gateway_ips(&router)
                .with_context(|| format!("Failed to resolve gateway IPs of router {}", router.id))?;
            println!("{}", serde_json::to_string_pretty(&ips)?);
        }
        Commands::Replay { events, save_registry } => {
            replay(registry, config, &ctx, &events, save_registry).await?;
        }
    }

    Ok(())
}

async fn replay(
    registry: Arc<InMemoryRegistry>,
    config: DriverConfig,
    ctx: &RequestContext,
    events: &Path,
    save_registry: Option<PathBuf>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("Failed to read events {}", events.display()))?;
    let events: Vec<LifecycleEvent> = serde_json::from_str(&content)
        .context("Failed to parse lifecycle events")?;

    let (driver, mut rx) = IpsecVpnDriver::new(registry.clone(), config);
    info!("Replaying {} lifecycle event(s)", events.len());

    for (index, event) in events.into_iter().enumerate() {
        let (kind, operation) = event.kind();
        dispatch(&driver, ctx, event)
            .await
            .with_context(|| format!("Event #{} ({} {}) failed", index, operation, kind))?;

        // Every hook casts at most once, so the queue never fills up here
        while let Ok(notification) = rx.try_recv() {
            println!("{}", serde_json::to_string(&notification)?);
        }
    }

    if let Some(path) = save_registry {
        let fixture = registry.to_fixture().await;
        tokio::fs::write(&path, serde_json::to_string_pretty(&fixture)?)
            .await
            .with_context(|| format!("Failed to write registry {}", path.display()))?;
        debug!("Saved registry to {}", path.display());
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable
fn init_logging(cli: &Cli) {
    let log_level = if cli.verbose {
        "debug"
    } else {
        &cli.log_level
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vpnsync={},libvpnsync={}", log_level, log_level)));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}
