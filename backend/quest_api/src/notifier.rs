//! Long-running background task that drains the engine's event channel
//! and appends each event to the SQLite log.
//!
//! Writes that fail are retried with exponential back-off, up to
//! [`MAX_ATTEMPTS`] tries and [`MAX_BACKOFF_MS`] between tries. The engine
//! never waits on this task; if it falls behind the channel drops the oldest
//! events and the gap is logged.

use std::time::Duration;

use chrono::Utc;
use quest_engine::EngineEvent;
use sqlx::SqlitePool;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db;
use crate::events::EventRow;

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2_000;

/// Run until `cancel` fires or the engine drops its sender.
pub async fn run(
    pool: SqlitePool,
    mut events: broadcast::Receiver<EngineEvent>,
    cancel: CancellationToken,
) {
    info!("Event notifier starting");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Event notifier stopping");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => persist(&pool, &event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event notifier lagged; {skipped} event(s) were not logged");
                }
                Err(RecvError::Closed) => {
                    info!("Event channel closed; notifier exiting");
                    break;
                }
            },
        }
    }
}

async fn persist(pool: &SqlitePool, event: &EngineEvent) {
    let row = match EventRow::from_event(event, Utc::now()) {
        Ok(row) => row,
        Err(e) => {
            error!("Could not encode {} event: {e}", event.as_str());
            return;
        }
    };

    let mut backoff = INITIAL_BACKOFF_MS;
    for attempt in 1..=MAX_ATTEMPTS {
        match db::insert_event(pool, &row).await {
            Ok(id) => {
                debug!("Logged {} for quest {} as #{id}", row.event_type, row.quest_id);
                return;
            }
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!("Event write failed (attempt {attempt}, retry in {backoff}ms): {e}");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_MS);
            }
            Err(e) => {
                error!(
                    "Dropping {} event for quest {} after {MAX_ATTEMPTS} attempts: {e}",
                    row.event_type, row.quest_id
                );
            }
        }
    }
}
