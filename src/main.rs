//! Waitlist Mailer Service
//!
//! Confirmation email delivery pipeline with webhook ingestion and an
//! authenticated admin API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use waitlist_mailer::config::AppConfig;
use waitlist_mailer::email::provider::ResendClient;
use waitlist_mailer::state::{router, AppState};
use waitlist_mailer::store::MemoryBackend;

/// Waitlist Mailer Service
#[derive(Parser, Debug)]
#[command(name = "waitlist-mailer")]
#[command(version)]
#[command(about = "Reliable confirmation email delivery pipeline")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3002")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "waitlist_mailer=debug,tower_http=debug"
    } else {
        "waitlist_mailer=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;

    let backend = Arc::new(MemoryBackend::new());
    let provider = Arc::new(ResendClient::new(config.provider_api_key.clone()));
    let state = AppState::new(&config, backend, provider);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("parsing bind address")?;
    info!(%addr, "waitlist mailer listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listener")?;
    axum::serve(listener, router(state))
        .await
        .context("serving")?;

    Ok(())
}
