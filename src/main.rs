use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamshift_proxy::{config::Config, web::WebServer};

#[derive(Parser)]
#[command(name = "streamshift-proxy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A streaming-aware HTTP reverse proxy for HLS and DASH media delivery")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = format!("streamshift_proxy={}", cli.log_level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting streamshift-proxy v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config)?;
    info!(config_path = %cli.config, "configuration loaded");

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let web_server = WebServer::new(config).await?;
    info!(host = %web_server.host(), port = web_server.port(), "listening");
    web_server.serve().await?;

    Ok(())
}
