use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use judoscale_agent::{Agent, Config};

mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration & logging ───────────────────────────────
    let config = Config::parse_config();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Starting Judoscale sample app");
    info!("  Reporting to: {}", config.api_base_url().unwrap_or("<not configured>"));
    info!("  Interval:     {}s", config.report_interval().as_secs());
    info!("  Container:    {}", config.runtime_container().unwrap_or_default());
    info!("  Enabled:      {}", config.enabled);

    // ── 2. Build the agent ───────────────────────────────────────
    let shutdown = CancellationToken::new();
    let agent = Agent::new(config, shutdown.clone())?;

    // ── 3. Start periodic reporting ──────────────────────────────
    let reporter_handle = if agent.config.enabled && agent.reporter.start() {
        Some(agent.reporter.clone().spawn(shutdown.clone()))
    } else {
        None
    };

    // ── 4. Build Axum router ─────────────────────────────────────
    let app = server::create_router(&agent);

    // ── 5. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&agent.config.bind_addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
            signal.cancel();
        })
        .await?;

    // ── 6. Stop reporting; in-flight retries abort on the token ──
    shutdown.cancel();
    agent.reporter.stop();
    if let Some(handle) = reporter_handle {
        // Ignore JoinError, the loop may have already finished
        let _ = handle.await;
    }

    Ok(())
}
