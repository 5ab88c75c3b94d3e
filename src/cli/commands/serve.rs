//! `cardforge serve` — run the HTTP Command API alongside the orchestrator
//! loop, one tick per `loop_interval`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::http::{build_router, AppState};
use crate::services::Orchestrator;

pub async fn handle_serve(
    state: Arc<AppState>,
    orchestrator: Arc<Orchestrator>,
    bind_addr: String,
    loop_interval: Duration,
    enabled: bool,
) -> Result<()> {
    if enabled {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(loop_interval);
            loop {
                interval.tick().await;
                if let Err(err) = orchestrator.tick().await {
                    error!(%err, "orchestrator tick failed");
                }
            }
        });
    } else {
        info!("orchestrator loop disabled (ORCHESTRATOR_ENABLED=false); serving HTTP API only");
    }

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.context("failed to bind HTTP listener")?;
    info!(addr = %bind_addr, "cardforge listening");
    axum::serve(listener, router).await.context("HTTP server error")
}
