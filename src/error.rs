use crate::math::MathError;
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;

/// Caller-facing failures of the game core (spec taxonomy). The HTTP
/// layer maps these onto the JSON error envelope; nothing here is fatal
/// to the process.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("team {0} not found")]
    TeamNotFound(String),
    #[error("mission {0} not found")]
    MissionNotFound(String),
    #[error("session {0} has already started")]
    SessionAlreadyStarted(String),
    #[error("operation not allowed in current session state: {0}")]
    StateConflict(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Math(#[from] MathError),
}

impl GameError {
    pub fn code(&self) -> &'static str {
        match self {
            GameError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            GameError::TeamNotFound(_) => "TEAM_NOT_FOUND",
            GameError::MissionNotFound(_) => "MISSION_NOT_FOUND",
            GameError::SessionAlreadyStarted(_) => "SESSION_ALREADY_STARTED",
            GameError::StateConflict(_) => "STATE_CONFLICT",
            GameError::Validation(_) => "VALIDATION_ERROR",
            GameError::Math(MathError::Parse(_)) => "PARSE_ERROR",
            GameError::Math(_) => "MATH_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GameError::SessionNotFound(_)
            | GameError::TeamNotFound(_)
            | GameError::MissionNotFound(_) => StatusCode::NOT_FOUND,
            GameError::SessionAlreadyStarted(_) | GameError::StateConflict(_) => {
                StatusCode::CONFLICT
            }
            GameError::Validation(_) | GameError::Math(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    pub request_id: String,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub request_id: String,
}

impl AppError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self { status, code, message: message.into(), request_id: request_id.into() }
    }

    pub fn from_game(err: GameError, request_id: impl Into<String>) -> Self {
        Self {
            status: err.status(),
            code: err.code(),
            message: err.to_string(),
            request_id: request_id.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let payload = ErrorBody {
            error: ErrorPayload {
                code: self.code,
                message: self.message,
                request_id: self.request_id,
            },
        };
        (self.status, Json(payload)).into_response()
    }
}
