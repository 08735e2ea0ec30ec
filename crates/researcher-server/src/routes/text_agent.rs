use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    response::sse::{KeepAlive, Sse},
    routing::post,
};
use researcher_core::{
    Document, HostingPort, LogRecord, ProgressUpdate, ResearchRequest, ResearchResult,
    ResearcherError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{Span, instrument, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::sse::{EventSender, SseStream, event_channel};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TextRunRequest {
    pub text: String,
    #[serde(default)]
    pub documents: Option<Vec<Document>>,
}

/// Payload of `progress` deltas and the terminal `completed` event.
#[derive(Serialize)]
struct TextOutput<'a> {
    text: &'a str,
    logs: &'a [LogRecord],
}

struct TextAgentPort {
    sender: EventSender,
}

#[async_trait]
impl HostingPort for TextAgentPort {
    async fn emit_progress(&mut self, update: ProgressUpdate) -> Result<(), ResearcherError> {
        let delta = match &update {
            ProgressUpdate::Log(record) => TextOutput {
                text: "",
                logs: std::slice::from_ref(record),
            },
            ProgressUpdate::ReportChunk { text } => TextOutput { text, logs: &[] },
        };
        self.sender.send("progress", &delta).await
    }

    async fn emit_final(&mut self, result: &ResearchResult) -> Result<(), ResearcherError> {
        let output = TextOutput {
            text: &result.text,
            logs: &result.logs,
        };
        self.sender.send("completed", &output).await
    }

    async fn emit_error(&mut self, error: &ResearcherError) -> Result<(), ResearcherError> {
        self.sender
            .send("error", &json!({ "error": error.to_string() }))
            .await
    }
}

pub fn text_agent_router() -> Router<AppState> {
    Router::new().route("/text/runs", post(start_text_run))
}

#[instrument(skip_all, fields(run_id = tracing::field::Empty))]
async fn start_text_run(
    State(state): State<AppState>,
    Json(payload): Json<TextRunRequest>,
) -> Result<Sse<SseStream>, AppError> {
    if payload.text.trim().is_empty() {
        return Err(AppError::bad_request("text must not be empty"));
    }

    let entry = state.text_agent();
    let request = ResearchRequest::new(payload.text).with_documents(payload.documents);
    let config = entry.resolve(&request)?;
    let permit = state.try_acquire_run()?;

    let run_id = Uuid::new_v4().to_string();
    Span::current().record("run_id", run_id.as_str());
    let (sender, stream) = event_channel();

    tokio::spawn(async move {
        let _permit = permit;
        let port = TextAgentPort { sender };
        if let Err(err) = entry.run_resolved(&run_id, config, request, port).await {
            warn!(run_id = %run_id, error = %err, "text-agent run ended early");
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}
