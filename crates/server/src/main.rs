mod bootstrap;
mod calendar_api;
mod health;
mod knowledge_api;
mod processor;
mod webhook;

use std::time::Duration;

use anyhow::{Context, Result};
use concierge_core::config::{AppConfig, LoadOptions};
use concierge_whatsapp::{MessageQueue, QueueWorker, RetryPolicy};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use concierge_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap(config).await?;
    let server = app.config.server.clone();

    let (queue, receiver) = MessageQueue::bounded(server.queue_capacity);
    let worker = tokio::spawn(QueueWorker::new(receiver, app.processor.clone(), RetryPolicy::default()).run());

    let address = format!("{}:{}", server.bind_address, server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        tools = app.tool_names.len(),
        "concierge-server listening"
    );

    // The router owns the only queue sender, so the worker drains once serving stops.
    axum::serve(listener, app.router(queue)).with_graceful_shutdown(wait_for_shutdown()).await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "draining message queue"
    );

    match tokio::time::timeout(Duration::from_secs(server.graceful_shutdown_secs), worker).await {
        Ok(Ok(stats)) => tracing::info!(
            event_name = "system.server.stopped",
            correlation_id = "shutdown",
            replied = stats.replied,
            skipped = stats.skipped,
            duplicates = stats.duplicates,
            failed = stats.failed,
            "message worker finished"
        ),
        Ok(Err(error)) => tracing::error!(
            event_name = "system.server.worker_panicked",
            correlation_id = "shutdown",
            error = %error,
            "message worker aborted"
        ),
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            timeout_secs = server.graceful_shutdown_secs,
            "gave up waiting for in-flight messages"
        ),
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(event_name = "system.server.signal_error", error = %error, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
