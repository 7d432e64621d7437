//! Application entrypoint and state wiring.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use geneblock::config::Args;
use geneblock::routes::{router, AppState};
use geneblock::session::Session;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 0) logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 1) seeded session
    let config = args.session_config();
    info!(replicas = ?config.replica_ids, xor = config.xor_key.is_some(), "starting session");
    let session = Session::seeded(config).context("build seeded session")?;
    let canonical = session.canonical();
    info!(
        blocks = canonical.len(),
        tip = canonical.blocks().last().map(|b| b.hash()).unwrap_or_default(),
        "canonical ledger ready"
    );

    // 2) router
    let app = router(AppState::new(session));

    // 3) serve
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!("running on http://{}", args.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
