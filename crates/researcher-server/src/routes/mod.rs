mod acp;
mod health;
mod text_agent;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use acp::{AGENT_NAME, AcpMessage, AcpPart, AcpRunRequest};
pub use text_agent::TextRunRequest;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::health_router())
        .merge(text_agent::text_agent_router())
        .nest("/acp", acp::acp_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
