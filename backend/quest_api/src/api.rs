//! Axum REST API handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use quest_engine::{
    Achievement, Action, Contribution, ContributionAction, ContributionRequest, Participation,
    Quest, QuestEngine, Role,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db;
use crate::errors::ApiError;
use crate::events::EventView;

pub struct ApiState {
    pub engine: Arc<QuestEngine>,
    pub pool: SqlitePool,
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// All routes, without middleware layers.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/quests", get(list_quests).post(create_quest))
        .route("/quests/:id", get(get_quest))
        .route("/quests/:id/contributions", post(contribute))
        .route("/quests/:id/participants", post(join_quest))
        .route(
            "/quests/:id/participants/:user_id/capabilities",
            get(get_capabilities),
        )
        .route("/quests/:id/achievements/:user_id", post(unlock_achievement))
        .route("/quests/:id/stages/:stage_id/progress", put(set_stage_progress))
        .route("/quests/:id/complete", post(complete_quest))
        .route("/quests/:id/archive", post(archive_quest))
        .route("/quests/:id/events", get(get_quest_events))
        .route("/events", get(get_all_events))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

/// Contribution body; the quest comes from the path.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionBody {
    pub stage_id: String,
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub action: Option<ContributionAction>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl ContributionBody {
    fn into_request(self, quest_id: String) -> ContributionRequest {
        ContributionRequest {
            quest_id,
            stage_id: self.stage_id,
            user_id: self.user_id,
            role: self.role,
            amount: self.amount,
            action: self.action,
            timestamp: self.timestamp,
            client_id: self.client_id,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBody {
    pub user_id: String,
    pub role: Role,
}

#[derive(Deserialize)]
pub struct ProgressBody {
    pub progress: u8,
}

#[derive(Serialize)]
pub struct QuestsResponse {
    pub count: usize,
    pub quests: Vec<Quest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    pub quest_id: String,
    pub user_id: String,
    pub actions: BTreeMap<&'static str, bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub quest_id: String,
    pub count: usize,
    pub events: Vec<EventView>,
}

#[derive(Serialize)]
pub struct AllEventsResponse {
    pub count: usize,
    pub events: Vec<EventView>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /quests`
pub async fn list_quests(State(state): State<Arc<ApiState>>) -> ApiResult<Json<QuestsResponse>> {
    let quests = state.engine.list_quests().await?;
    Ok(Json(QuestsResponse {
        count: quests.len(),
        quests,
    }))
}

/// `POST /quests`
pub async fn create_quest(
    State(state): State<Arc<ApiState>>,
    Json(quest): Json<Quest>,
) -> ApiResult<(StatusCode, Json<Quest>)> {
    let quest = state.engine.register_quest(quest).await?;
    Ok((StatusCode::CREATED, Json(quest)))
}

/// `GET /quests/:id`
pub async fn get_quest(
    State(state): State<Arc<ApiState>>,
    Path(quest_id): Path<String>,
) -> ApiResult<Json<Quest>> {
    Ok(Json(state.engine.quest(&quest_id).await?))
}

/// `POST /quests/:id/contributions`
///
/// Replaying a request with the same idempotency key returns the original
/// record while the quest is active.
pub async fn contribute(
    State(state): State<Arc<ApiState>>,
    Path(quest_id): Path<String>,
    Json(body): Json<ContributionBody>,
) -> ApiResult<(StatusCode, Json<Contribution>)> {
    let contribution = state.engine.contribute(body.into_request(quest_id)).await?;
    Ok((StatusCode::CREATED, Json(contribution)))
}

/// `POST /quests/:id/participants`
pub async fn join_quest(
    State(state): State<Arc<ApiState>>,
    Path(quest_id): Path<String>,
    Json(body): Json<JoinBody>,
) -> ApiResult<Json<Participation>> {
    let participation = state
        .engine
        .join(&quest_id, &body.user_id, body.role)
        .await?;
    Ok(Json(participation))
}

/// `GET /quests/:id/participants/:user_id/capabilities`
pub async fn get_capabilities(
    State(state): State<Arc<ApiState>>,
    Path((quest_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<CapabilitiesResponse>> {
    let mut actions = BTreeMap::new();
    for action in Action::ALL {
        let allowed = state.engine.can_perform(&quest_id, &user_id, action).await?;
        actions.insert(action.as_str(), allowed);
    }
    Ok(Json(CapabilitiesResponse {
        quest_id,
        user_id,
        actions,
    }))
}

/// `POST /quests/:id/achievements/:user_id`
pub async fn unlock_achievement(
    State(state): State<Arc<ApiState>>,
    Path((quest_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<Achievement>> {
    Ok(Json(state.engine.unlock(&quest_id, &user_id).await?))
}

/// `PUT /quests/:id/stages/:stage_id/progress`
pub async fn set_stage_progress(
    State(state): State<Arc<ApiState>>,
    Path((quest_id, stage_id)): Path<(String, String)>,
    Json(body): Json<ProgressBody>,
) -> ApiResult<Json<Quest>> {
    let quest = state
        .engine
        .set_stage_progress(&quest_id, &stage_id, body.progress)
        .await?;
    Ok(Json(quest))
}

/// `POST /quests/:id/complete`
pub async fn complete_quest(
    State(state): State<Arc<ApiState>>,
    Path(quest_id): Path<String>,
) -> ApiResult<Json<Quest>> {
    Ok(Json(state.engine.complete(&quest_id).await?))
}

/// `POST /quests/:id/archive`
pub async fn archive_quest(
    State(state): State<Arc<ApiState>>,
    Path(quest_id): Path<String>,
) -> ApiResult<Json<Quest>> {
    Ok(Json(state.engine.archive(&quest_id).await?))
}

/// `GET /quests/:id/events`
///
/// Returns the logged events for the given quest.
pub async fn get_quest_events(
    State(state): State<Arc<ApiState>>,
    Path(quest_id): Path<String>,
) -> ApiResult<Json<EventsResponse>> {
    let events: Vec<EventView> = db::get_events_for_quest(&state.pool, &quest_id)
        .await?
        .into_iter()
        .map(EventView::from)
        .collect();
    Ok(Json(EventsResponse {
        quest_id,
        count: events.len(),
        events,
    }))
}

/// `GET /events`
///
/// Returns all logged events across all quests.
pub async fn get_all_events(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<AllEventsResponse>> {
    let events: Vec<EventView> = db::get_all_events(&state.pool)
        .await?
        .into_iter()
        .map(EventView::from)
        .collect();
    Ok(Json(AllEventsResponse {
        count: events.len(),
        events,
    }))
}
