use crate::handlers;
use crate::AppState;
use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/sessions", post(handlers::create_session))
        .route("/api/v1/sessions/equation-sets", get(handlers::equation_sets))
        .route("/api/v1/sessions/:code/state", get(handlers::session_state))
        .route("/api/v1/sessions/:code/start", post(handlers::start_session))
        .route("/api/v1/sessions/:code/finish", post(handlers::finish_session))
        .route("/api/v1/sessions/:code/timers", put(handlers::update_timers))
        .route("/api/v1/teams/:code/join", post(handlers::join_team))
        .route(
            "/api/v1/teams/:team_id/submit/:mission_key",
            post(handlers::submit_mission),
        )
        .route("/api/v1/teams/:team_id/hint/:mission_key", post(handlers::use_hint))
        .route("/api/v1/teams/:team_id/final", post(handlers::submit_final))
        .route("/ws/sessions/:code", get(handlers::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
