use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use railway_signals_service::config::{Config, LogFormat};

#[derive(Parser, Debug)]
#[command(about = "HTTP API for railway signals, tracks and their mileages")]
struct Args {
    /// Listen address. Overrides RAILWAY_BIND_ADDR.
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// `text` or `json`. Overrides RAILWAY_LOG_FORMAT.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env().context("load railway config")?;
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(log_format) = args.log_format {
        config.log_format = log_format;
    }

    init_tracing(config.log_format);
    railway_signals_service::serve(config).await
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}
