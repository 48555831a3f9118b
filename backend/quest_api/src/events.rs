//! Event log rows written by the notifier and served by the API.
//!
//! Every [`EngineEvent`] is flattened into a few indexed columns plus the
//! full JSON payload, so consumers can filter by type or quest without
//! parsing and still see the complete event.

use chrono::{DateTime, Utc};
use quest_engine::EngineEvent;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// A decoded engine event, ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub event_type: String,
    pub quest_id: String,
    pub actor: Option<String>,
    pub amount: Option<i64>,
    pub payload: String,
    pub recorded_at: i64,
}

impl EventRow {
    pub fn from_event(event: &EngineEvent, recorded_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            event_type: event.as_str().to_string(),
            quest_id: event.quest_id().to_string(),
            actor: event.actor().map(str::to_string),
            amount: event.amount().and_then(|a| i64::try_from(a).ok()),
            payload: serde_json::to_string(event)?,
            recorded_at: recorded_at.timestamp(),
        })
    }
}

/// An event row as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub event_type: String,
    pub quest_id: String,
    pub actor: Option<String>,
    pub amount: Option<i64>,
    pub payload: String,
    pub recorded_at: i64,
    pub created_at: i64,
}

/// API shape of a stored event, with the payload decoded back to JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: i64,
    pub event_type: String,
    pub quest_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    pub payload: serde_json::Value,
    pub recorded_at: i64,
}

impl From<EventRecord> for EventView {
    fn from(record: EventRecord) -> Self {
        let payload = serde_json::from_str(&record.payload)
            .unwrap_or(serde_json::Value::String(record.payload));
        Self {
            id: record.id,
            event_type: record.event_type,
            quest_id: record.quest_id,
            actor: record.actor,
            amount: record.amount,
            payload,
            recorded_at: record.recorded_at,
        }
    }
}
