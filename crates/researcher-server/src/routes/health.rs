use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::{AppState, Capacity};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    engine: &'static str,
    capacity: Capacity,
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let capacity = state.capacity();
    let status = if capacity.available_permits == 0 {
        "busy"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status,
        engine: state.text_agent().engine_mode(),
        capacity,
    })
}
