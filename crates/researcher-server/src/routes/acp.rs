use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    response::sse::{KeepAlive, Sse},
    routing::{get, post},
};
use researcher_core::{
    DOC_PATH_ENV, Document, EMBEDDING_MODEL_ENV, HYBRID_ENV, HostingPort, LLM_API_BASE_ENV,
    LLM_API_KEY_ENV, LLM_MODEL_ENV, LLM_MODEL_FAST_ENV, LLM_MODEL_SMART_ENV,
    LLM_MODEL_STRATEGIC_ENV, ProgressUpdate, REPORT_TYPE_ENV, ReportType, ResearchRequest,
    ResearchResult, ResearcherError, TONE_ENV, Tone,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{instrument, warn};

use crate::error::AppError;
use crate::sse::{EventSender, SseStream, event_channel};
use crate::state::{AppState, RunRegistry, RunStatus};

pub const AGENT_NAME: &str = "granite_researcher";
const TEXT_PLAIN: &str = "text/plain";

fn default_role() -> String {
    "user".to_string()
}

fn default_content_type() -> String {
    TEXT_PLAIN.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcpPart {
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub content: String,
}

impl AcpPart {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content_type: default_content_type(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcpMessage {
    #[serde(default = "default_role")]
    pub role: String,
    pub parts: Vec<AcpPart>,
}

impl AcpMessage {
    /// Concatenated content of every part.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|part| part.content.as_str())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct AcpRunRequest {
    #[serde(default)]
    pub agent_name: Option<String>,
    pub input: Vec<AcpMessage>,
    #[serde(default)]
    pub documents: Option<Vec<Document>>,
    #[serde(default)]
    pub report_type: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub report_source: Option<String>,
}

struct AcpPort {
    run_id: String,
    sender: EventSender,
    runs: RunRegistry,
}

#[async_trait]
impl HostingPort for AcpPort {
    async fn emit_progress(&mut self, update: ProgressUpdate) -> Result<(), ResearcherError> {
        match update {
            ProgressUpdate::Log(record) => {
                self.sender
                    .send("generic", &json!({ "message": format!("{}\n", record.message) }))
                    .await
            }
            ProgressUpdate::ReportChunk { text } => {
                self.sender.send("message.part", &AcpPart::text(text)).await
            }
        }
    }

    async fn emit_final(&mut self, result: &ResearchResult) -> Result<(), ResearcherError> {
        self.runs.complete(&self.run_id, &result.text);
        let message = AcpMessage {
            role: format!("agent/{AGENT_NAME}"),
            parts: vec![AcpPart::text(result.text.clone())],
        };
        self.sender
            .send(
                "run.completed",
                &json!({
                    "run_id": self.run_id,
                    "status": "completed",
                    "output": [message],
                }),
            )
            .await
    }

    async fn emit_error(&mut self, error: &ResearcherError) -> Result<(), ResearcherError> {
        let message = error.to_string();
        self.runs.fail(&self.run_id, &message);
        self.sender
            .send(
                "run.failed",
                &json!({
                    "run_id": self.run_id,
                    "status": "failed",
                    "error": message,
                }),
            )
            .await
    }
}

pub fn acp_router() -> Router<AppState> {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/runs", post(start_run))
        .route("/runs/:id", get(get_run))
}

#[instrument(skip_all)]
async fn start_run(
    State(state): State<AppState>,
    Json(payload): Json<AcpRunRequest>,
) -> Result<Sse<SseStream>, AppError> {
    if let Some(name) = payload.agent_name.as_deref()
        && name != AGENT_NAME
    {
        return Err(AppError::not_found(format!("agent `{name}` not found")));
    }

    let query = payload
        .input
        .last()
        .map(AcpMessage::text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("input must end with a message carrying content"))?;

    let entry = state.acp();
    let request = ResearchRequest::new(query)
        .with_documents(payload.documents)
        .with_report_type(payload.report_type)
        .with_tone(payload.tone)
        .with_report_source(payload.report_source);
    let config = entry.resolve(&request)?;
    let permit = state.try_acquire_run()?;

    let runs = state.runs();
    let created = runs.create(AGENT_NAME);
    let run_id = created.run_id.clone();
    let (sender, stream) = event_channel();
    sender.send("run.created", &created).await?;

    tokio::spawn(async move {
        let _permit = permit;
        runs.start(&run_id);
        let port = AcpPort {
            run_id: run_id.clone(),
            sender,
            runs: runs.clone(),
        };
        if let Err(err) = entry.run_resolved(&run_id, config, request, port).await {
            runs.fail(&run_id, &err.to_string());
            warn!(run_id = %run_id, error = %err, "acp run failed");
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatus>, AppError> {
    state
        .runs()
        .get(&run_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("run not found"))
}

#[derive(Serialize)]
struct EnvVarDoc {
    name: &'static str,
    description: String,
}

#[derive(Serialize)]
struct AgentManifest {
    name: &'static str,
    description: &'static str,
    ui: serde_json::Value,
    env: Vec<EnvVarDoc>,
}

fn env_doc(name: &'static str, description: impl Into<String>) -> EnvVarDoc {
    EnvVarDoc {
        name,
        description: description.into(),
    }
}

async fn list_agents() -> Json<serde_json::Value> {
    let report_types: Vec<_> = ReportType::ALL.iter().map(ReportType::as_str).collect();
    let tones: Vec<_> = Tone::ALL.iter().map(Tone::as_str).collect();
    let manifest = AgentManifest {
        name: AGENT_NAME,
        description: "Conducts in-depth local and web research with a language model and \
                      writes a cited report.",
        ui: json!({
            "type": "hands-off",
            "user_greeting": "What topic do you want to research?",
        }),
        env: vec![
            env_doc(LLM_MODEL_ENV, "Model to use from the OpenAI-compatible API"),
            env_doc(LLM_API_BASE_ENV, "Base URL for the OpenAI-compatible API endpoint"),
            env_doc(LLM_API_KEY_ENV, "API key for the OpenAI-compatible API endpoint"),
            env_doc(LLM_MODEL_FAST_ENV, "Fast model slot"),
            env_doc(LLM_MODEL_SMART_ENV, "Smart model slot"),
            env_doc(LLM_MODEL_STRATEGIC_ENV, "Strategic model slot"),
            env_doc(EMBEDDING_MODEL_ENV, "Embedding model identifier"),
            env_doc(
                REPORT_TYPE_ENV,
                format!("Type of report to generate: {}", report_types.join(", ")),
            ),
            env_doc(TONE_ENV, format!("Tone of the report: {}", tones.join(", "))),
            env_doc(DOC_PATH_ENV, "Path to local documents to use as context"),
            env_doc(HYBRID_ENV, "With local documents, also search the web"),
        ],
    };
    Json(json!({ "agents": [manifest] }))
}
