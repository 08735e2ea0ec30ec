//! Core of the researcher agent host.
//!
//! Resolves per-request configuration for an external research engine, bridges
//! the engine's progress callbacks into a hosting protocol, and drives the
//! research and report phases through [`AgentEntrypoint`].

mod config;
mod entrypoint;
mod error;
mod options;
mod progress;
mod request;
mod resolver;
mod security;

pub mod engine;
pub mod logging;
pub mod metrics;
pub mod telemetry;

pub use config::{
    DOC_PATH_ENV, EMBEDDING_ENV, EMBEDDING_MODEL_ENV, HYBRID_ENV, LLM_API_BASE_ENV,
    LLM_API_KEY_ENV, LLM_MODEL_ENV, LLM_MODEL_FAST_ENV, LLM_MODEL_SMART_ENV,
    LLM_MODEL_STRATEGIC_ENV, REPORT_TYPE_ENV, RETRIEVER_ENV, Settings, SettingsProfile, TONE_ENV,
};
pub use engine::{EngineChoice, EngineFactory, ResearchContext, ResearchEngine};
pub use entrypoint::{AgentEntrypoint, FailurePolicy, SettingsSource};
pub use error::{ResearchPhase, ResearcherError};
pub use logging::RunLogSettings;
pub use options::{PromptFamily, ReportSource, ReportType, Tone};
pub use progress::{
    HostingPort, ProgressBridge, ProgressEvent, ProgressSink, ProgressUpdate, RecordingPort,
};
pub use request::{Document, LogRecord, ResearchRequest, ResearchResult};
pub use resolver::{
    API_VERSION_SEGMENT, ConfigResolver, DEFAULT_PROVIDER, LOCAL_PROVIDER, ResolvedConfig,
    is_local_model, local_base_url, openai_base_url, qualify_model,
};
pub use security::SecretValue;
pub use telemetry::{TelemetryOptions, init_telemetry};
