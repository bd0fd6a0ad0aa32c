use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use hub_core::{HubConfig, HubService};
use tracing::{error, info};

use mcp_hub::{build_router, logging};

#[derive(Debug, Parser)]
#[command(name = "mcp-hub", about = "Aggregating gateway for MCP tool servers")]
struct Args {
    /// Path to the hub configuration file (YAML or JSON).
    #[arg(short, long, env = "MCP_HUB_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address.
    #[arg(long, env = "MCP_HUB_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Listen port.
    #[arg(short, long, env = "MCP_HUB_PORT", default_value_t = 3000)]
    port: u16,

    /// Log level for hub crates when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(path: &PathBuf) -> anyhow::Result<HubConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let config: HubConfig = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&raw).context("parse JSON config")?
    } else {
        serde_yaml::from_str(&raw).context("parse YAML config")?
    };
    config.validate().context("validate config")?;
    Ok(config)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    info!(
        servers = config.servers.len(),
        groups = config.groups.len(),
        api_tools = config.api_tools.len(),
        "configuration loaded"
    );

    let hub = Arc::new(HubService::new(config).context("build hub service")?);
    hub.initialize().await.context("initialize hub")?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "mcp-hub listening");

    let router = build_router(Arc::clone(&hub));
    let shutdown_hub = Arc::clone(&hub);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            if let Err(e) = shutdown_hub.shutdown().await {
                error!(error = %e, "shutdown reported errors");
            }
        })
        .await
        .context("serve")?;

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(&args.log_level);

    if let Err(e) = run(args).await {
        error!(error = %e, "fatal");
        eprintln!("mcp-hub: {e:#}");
        std::process::exit(1);
    }
}
