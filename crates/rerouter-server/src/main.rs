use anyhow::Context;
use clap::Parser;
use rerouter_config::load_config;
use rerouter_server::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rerouter")]
#[command(about = "Serves an upstream site to crawlers from this origin and redirects humans", long_about = None)]
struct Cli {
    /// TOML config file. Missing files are fine; env vars fill the gaps.
    #[arg(long, default_value = "rerouter.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(AppState::from_config(config)?);
    tracing::info!(
        listen = %listen_addr,
        upstream = %state.config.b_base_url,
        proxy = state.config.a_base_url.as_deref().unwrap_or("(per request)"),
        cache_dir = %state.config.cache.dir,
        "starting"
    );

    let app = build_router(state);
    let listener = TcpListener::bind(listen_addr.as_str())
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
