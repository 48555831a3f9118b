//! Database layer: migrations, event writes and event reads.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::Result;
use crate::events::{EventRecord, EventRow};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Create the file on first start.
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Event writes
// ─────────────────────────────────────────────────────────

/// Append one event to the log. Returns the new row id.
pub async fn insert_event(pool: &SqlitePool, row: &EventRow) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO events
            (event_type, quest_id, actor, amount, payload, recorded_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&row.event_type)
    .bind(&row.quest_id)
    .bind(&row.actor)
    .bind(row.amount)
    .bind(&row.payload)
    .bind(row.recorded_at)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

// ─────────────────────────────────────────────────────────
// Event reads
// ─────────────────────────────────────────────────────────

/// Fetch all events for a given quest, in emission order.
pub async fn get_events_for_quest(pool: &SqlitePool, quest_id: &str) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, event_type, quest_id, actor, amount, payload, recorded_at, created_at
        FROM   events
        WHERE  quest_id = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(quest_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fetch all events, in emission order.
pub async fn get_all_events(pool: &SqlitePool) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, event_type, quest_id, actor, amount, payload, recorded_at, created_at
        FROM   events
        ORDER  BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
