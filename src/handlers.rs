use crate::error::AppError;
use crate::events::{EventEnvelope, SESSION_UPDATE};
use crate::game::CreateSessionParams;
use crate::missions::EquationSet;
use crate::models::{MissionTimesPatch, SessionState, Team};
use crate::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionPayload {
    pub teacher_name: String,
    #[serde(flatten)]
    pub params: CreateSessionParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub code: String,
    pub status: crate::models::SessionStatus,
    pub mission_times: crate::models::MissionTimes,
    pub rules: crate::models::SessionRules,
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<(StatusCode, Json<SessionCreated>), AppError> {
    let req_id = request_id_from_headers(&headers);
    let session = state
        .engine
        .create_session(&payload.teacher_name, payload.params)
        .await
        .map_err(|e| AppError::from_game(e, req_id))?;
    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            code: session.code,
            status: session.status,
            mission_times: session.mission_times,
            rules: session.rules,
        }),
    ))
}

pub async fn equation_sets() -> Json<Value> {
    let items: Vec<_> = EquationSet::ALL
        .iter()
        .map(|set| {
            json!({
                "key": set.key(),
                "name": set.display_name(),
                "description": set.description(),
            })
        })
        .collect();
    Json(json!({ "items": items, "total": items.len() }))
}

pub async fn session_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<SessionState>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let snapshot = state
        .engine
        .session_state(&code)
        .await
        .map_err(|e| AppError::from_game(e, req_id))?;
    Ok(Json(snapshot))
}

pub async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    state
        .engine
        .clone()
        .start_session(&code)
        .await
        .map_err(|e| AppError::from_game(e, req_id))?;
    Ok(Json(json!({ "status": "active" })))
}

pub async fn finish_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    state
        .engine
        .finish_session(&code)
        .await
        .map_err(|e| AppError::from_game(e, req_id))?;
    Ok(Json(json!({ "status": "finished" })))
}

pub async fn update_timers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(patch): Json<MissionTimesPatch>,
) -> Result<Json<crate::models::MissionTimes>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let times = state
        .engine
        .update_timers(&code, patch)
        .await
        .map_err(|e| AppError::from_game(e, req_id))?;
    Ok(Json(times))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub team_name: String,
}

pub async fn join_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(payload): Json<JoinPayload>,
) -> Result<(StatusCode, Json<Team>), AppError> {
    let req_id = request_id_from_headers(&headers);
    let team = state
        .engine
        .join_team(&code, &payload.team_name)
        .await
        .map_err(|e| AppError::from_game(e, req_id))?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn submit_mission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((team_id, mission_key)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> Result<Json<crate::game::SubmitOutcome>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let outcome = state
        .engine
        .submit_mission(&team_id, &mission_key, payload)
        .await
        .map_err(|e| AppError::from_game(e, req_id))?;
    Ok(Json(outcome))
}

pub async fn use_hint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((team_id, mission_key)): Path<(String, String)>,
) -> Result<Json<crate::game::HintOutcome>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let outcome = state
        .engine
        .use_hint(&team_id, &mission_key)
        .await
        .map_err(|e| AppError::from_game(e, req_id))?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct FinalPayload {
    pub equation: String,
    #[serde(default)]
    pub justification: String,
}

pub async fn submit_final(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(team_id): Path<String>,
    Json(payload): Json<FinalPayload>,
) -> Result<Json<crate::game::FinalOutcome>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let outcome = state
        .engine
        .submit_final(&team_id, &payload.equation, &payload.justification)
        .await
        .map_err(|e| AppError::from_game(e, req_id))?;
    Ok(Json(outcome))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Response {
    let req_id = request_id_from_headers(&headers);
    // Reject unknown codes before upgrading.
    if let Err(e) = state.engine.session_state(&code).await {
        return AppError::from_game(e, req_id).into_response();
    }
    ws.on_upgrade(move |socket| ws_session(socket, state, code))
}

async fn ws_session(stream: WebSocket, state: AppState, code: String) {
    let mut rx = state.engine.events.subscribe(&code);
    let (mut sender_ws, mut receiver_ws) = stream.split();

    // Late joiners get the current picture before the event stream.
    if let Ok(snapshot) = state.engine.session_state(&code).await {
        let envelope = EventEnvelope {
            event: SESSION_UPDATE.to_string(),
            payload: serde_json::to_value(&snapshot).unwrap_or(Value::Null),
            ts: Some(Utc::now().to_rfc3339()),
        };
        if let Ok(text) = serde_json::to_string(&envelope) {
            if sender_ws.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
    }

    let send_task = tokio::spawn(async move {
        while let Ok(envelope) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&envelope) {
                if sender_ws.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Observers only send pings and close frames.
    while let Some(Ok(message)) = receiver_ws.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }

    send_task.abort();
    info!("ws disconnected for session {}", code);
}
