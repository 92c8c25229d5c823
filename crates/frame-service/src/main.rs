//! Dualcam Pipeline - Main Entry Point

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use frame_service::{init_logging, PipelineContext, SelectorService, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== Dualcam Pipeline v{} ===", env!("CARGO_PKG_VERSION"));

    let cfg = ServiceConfig::load().context("loading configuration")?;
    let ctx = PipelineContext::create(&cfg).context("creating shared-memory segments")?;
    let selector = ctx
        .build_selector(&cfg)
        .context("opening selector handles")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(SelectorService::new(selector, shutdown_rx).run());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    task.await.context("joining selector task")?;

    // Unmap but keep the segment files: stragglers polling the active slot
    // or the detection store still get the final published values.
    drop(ctx);
    Ok(())
}
