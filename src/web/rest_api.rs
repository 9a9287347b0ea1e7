use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::engine::draft::DraftState;

use super::app_state::AppState;
use super::champions::ChampionInfo;

/// GET /api/champions — the cached champion catalog.
pub async fn get_champions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChampionInfo>>, (StatusCode, &'static str)> {
    match state.catalog.champions().await {
        Ok(champions) => Ok(Json(champions)),
        Err(e) => {
            error!(error = %e, "champion catalog unavailable");
            Err((StatusCode::BAD_GATEWAY, "Champion catalog unavailable"))
        }
    }
}

/// GET /api/draft/{room_id} — read-only snapshot of a room's draft.
pub async fn get_draft_snapshot(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<DraftState>, (StatusCode, &'static str)> {
    state
        .engine
        .draft_snapshot(&room_id)
        .map(Json)
        .map_err(|_| (StatusCode::NOT_FOUND, "Room not found"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRoomReply {
    pub room_code: String,
}

/// GET /api/draft/default-room — the pinned room everyone can meet in.
/// Creates it on first use.
pub async fn get_default_room(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DefaultRoomReply>, (StatusCode, &'static str)> {
    state
        .engine
        .ensure_default_room()
        .map(|room_code| Json(DefaultRoomReply { room_code }))
        .ok_or((StatusCode::NOT_FOUND, "No default room configured"))
}
