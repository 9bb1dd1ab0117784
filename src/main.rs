//! Stubber Mock Server - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use stubber::{MockServer, StubberConfig};
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "stubber",
    about = "Configurable mock HTTP API server - static stubs and scripted responses",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "/config/endpoints.json")]
    config: PathBuf,

    /// Listen address, overrides `settings.listen`
    #[arg(short, long, env = "LISTEN_ADDR", value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{}", include_str!("../demos/endpoints.json"));
        return Ok(());
    }

    info!(path = %args.config.display(), "Loading configuration");
    let mut config = StubberConfig::from_file(&args.config)
        .inspect_err(|e| error!(error = %e, "Failed to load configuration"))?;

    if args.validate {
        let endpoints = config.endpoints.len();
        // Builds the route table too; scripts that do not compile are logged.
        MockServer::new(config)?;
        println!("Configuration is valid ({} endpoints defined)", endpoints);
        return Ok(());
    }

    if let Some(listen) = args.listen {
        config.settings.listen = listen;
    }

    let server = MockServer::new(config)
        .inspect_err(|e| error!(error = %e, "Invalid configuration"))?;

    let listener = TcpListener::bind(server.settings().listen)
        .await
        .with_context(|| format!("failed to bind {}", server.settings().listen))?;

    server.run(listener).await?;

    Ok(())
}
