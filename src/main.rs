//! Easel - Collaborative Canvas Engine
//!
//! Binary entry point: configuration, storage bring-up, session-manager
//! wiring, and signal-driven shutdown. The chat gateway consumes the event
//! bus; until one is attached, a logging subscriber mirrors lifecycle events
//! into the process log.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use easel_canvas::{CanvasRepository, SessionManager, SqliteStorage, Storage};
use easel_core::{load_config, EventBus};

/// How often the in-memory registry is swept for long-terminal sessions.
const JANITOR_PERIOD: Duration = Duration::from_secs(3600);
/// How long terminal sessions stay queryable in memory before the sweep.
const JANITOR_RETENTION: Duration = Duration::from_secs(24 * 3600);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "easel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config().context("failed to load configuration")?;
    info!("starting easel v{}", env!("CARGO_PKG_VERSION"));

    let storage = SqliteStorage::from_path(&config.database.path)
        .await
        .context("failed to open canvas storage")?;

    // sessions left active by a previous run have no timers anymore
    let swept = storage.expire_stale_sessions().await?;
    if swept > 0 {
        warn!(swept, "expired orphaned edit sessions from a previous run");
    }

    let events = EventBus::default();
    let storage = Arc::new(storage);
    let repository = CanvasRepository::new(storage.clone(), config.canvas.clone());
    let manager = SessionManager::new(
        storage.clone(),
        repository,
        events.clone(),
        config.canvas.clone(),
    );
    let janitor = manager.start_janitor(JANITOR_PERIOD, JANITOR_RETENTION);

    // stand-in for the chat gateway: mirror lifecycle events into the log
    let mut rx = events.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(
                    kind = event.kind(),
                    canvas_id = %event.canvas_id(),
                    user_id = event.user_id(),
                    "canvas event"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!(
        timeout_minutes = config.canvas.edit_timeout_minutes,
        autosave_seconds = config.canvas.auto_save_interval_seconds,
        db = %config.database.path.display(),
        "easel ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    manager.shutdown().await;
    janitor.abort();
    event_log.abort();
    storage.close().await;
    info!("easel stopped");
    Ok(())
}
