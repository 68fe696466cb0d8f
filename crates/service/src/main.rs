use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use folio_service::{router, AppState, ServiceConfig};

#[derive(Debug, Parser)]
#[command(name = "folio", about = "Portfolio assistant backend", version)]
struct Args {
    /// TOML configuration file (defaults to $FOLIO_CONFIG or ./folio.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address, overriding host and port from the configuration
    #[arg(long)]
    bind: Option<String>,
    /// Re-embed the portfolio even when the stored index is current
    #[arg(long)]
    reindex: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ServiceConfig::load(args.config.as_deref())?;
    let addr = args.bind.clone().unwrap_or_else(|| config.bind_addr());
    let state = Arc::new(AppState::from_config(config)?);

    let report = if args.reindex {
        state.retriever.rebuild().await
    } else {
        state.retriever.ensure_indexed().await
    }
    .context("failed to index portfolio content")?;
    info!(
        "chunks" = report.chunks,
        "reused" = report.reused,
        "portfolio indexed"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening" = %addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
