//! mh-daemon entry point.
//!
//! Intentionally thin: load env, init tracing, build the harness, run it,
//! map the result to an exit code. The binary wires a no-op processor and
//! `NullChatTransport` so the crate is runnable standalone for manual
//! smoke-testing; a real deployment embeds `mh_daemon::Harness` with its
//! own `EventProcessor` and `ChatTransport`.

use std::sync::Arc;

use anyhow::Context;
use mh_chat::NullChatTransport;
use mh_config::HarnessConfig;
use mh_daemon::{health, Harness, NoopProcessor};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // PATCH S1: dev convenience; silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    mh_daemon::init_tracing();

    let config = HarnessConfig::from_env().context("loading configuration")?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect(&config.db.url)
        .await
        .context("connecting to the database")?;

    let harness = Harness::new(config.clone(), pool.clone(), Arc::new(NullChatTransport), Arc::new(NoopProcessor));
    harness.migrate().await.context("running migrations")?;

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        ctrl_c_token.cancel();
    });

    let health_task = config.daemon_addr.clone().map(|addr| {
        let pool = pool.clone();
        let worker_count = config.worker.worker_count;
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run_health_server(addr, pool, worker_count, shutdown).await })
    });

    let result = harness.run(shutdown.clone()).await;

    if let Some(task) = health_task {
        shutdown.cancel();
        let _ = task.await;
    }

    match result {
        Ok(()) => {
            tracing::info!("mh-daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "mh-daemon crashed");
            std::process::exit(1);
        }
    }
}

async fn run_health_server(
    addr: String,
    pool: sqlx::PgPool,
    worker_count: u32,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let socket_addr: std::net::SocketAddr = addr.parse().context("parsing MH_DAEMON_ADDR")?;
    let state = Arc::new(health::HealthState { pool, worker_count });
    let app = health::build_router(state);

    tracing::info!("health endpoint listening on http://{socket_addr}");
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("health server crashed")?;

    Ok(())
}
