//! Bridging engine progress callbacks into a hosting protocol's stream.
//!
//! The engine pushes loosely-typed JSON mappings into a [`ProgressSink`]. The
//! [`ProgressBridge`] filters and types them, accumulates the
//! [`ResearchResult`], and forwards each accepted event to a [`HostingPort`]
//! implemented once per protocol.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::{LogRecord, ResearchResult, ResearcherError};

/// Typed progress event emitted by the engine mid-run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Log {
        message: String,
        metadata: Option<Value>,
    },
    Report {
        text: String,
    },
}

impl ProgressEvent {
    /// Interpret an engine mapping. Unknown or missing `type`, or a missing
    /// `output`, yields `None`: such events are dropped, not errors.
    pub fn from_value(data: &Value) -> Option<Self> {
        let output = data.get("output")?;
        let output = match output {
            Value::String(text) => text.clone(),
            Value::Null => return None,
            other => other.to_string(),
        };

        match data.get("type").and_then(Value::as_str)? {
            "logs" => Some(ProgressEvent::Log {
                message: output,
                metadata: data.get("metadata").filter(|value| !value.is_null()).cloned(),
            }),
            "report" => Some(ProgressEvent::Report { text: output }),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Log { .. } => "logs",
            ProgressEvent::Report { .. } => "report",
        }
    }
}

/// Incremental notification handed to a hosting protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressUpdate {
    Log(LogRecord),
    ReportChunk { text: String },
}

/// Capability the engine calls with every progress mapping it produces.
#[async_trait]
pub trait ProgressSink: Send {
    async fn send_json(&mut self, data: Value) -> Result<(), ResearcherError>;
}

/// Outbound side of a hosting protocol.
#[async_trait]
pub trait HostingPort: Send {
    /// Stream one incremental notification to the caller.
    async fn emit_progress(&mut self, update: ProgressUpdate) -> Result<(), ResearcherError>;

    /// Deliver the terminal response.
    async fn emit_final(&mut self, result: &ResearchResult) -> Result<(), ResearcherError>;

    /// Report a failed run to the caller.
    async fn emit_error(&mut self, error: &ResearcherError) -> Result<(), ResearcherError>;
}

#[async_trait]
impl<P: HostingPort + ?Sized> HostingPort for &mut P {
    async fn emit_progress(&mut self, update: ProgressUpdate) -> Result<(), ResearcherError> {
        (**self).emit_progress(update).await
    }

    async fn emit_final(&mut self, result: &ResearchResult) -> Result<(), ResearcherError> {
        (**self).emit_final(result).await
    }

    async fn emit_error(&mut self, error: &ResearcherError) -> Result<(), ResearcherError> {
        (**self).emit_error(error).await
    }
}

/// Per-run bridge between the engine's sink contract and a hosting port.
pub struct ProgressBridge<P> {
    port: P,
    result: ResearchResult,
    forwarded: usize,
    filtered: usize,
}

impl<P: HostingPort> ProgressBridge<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            result: ResearchResult::default(),
            forwarded: 0,
            filtered: 0,
        }
    }

    pub fn result(&self) -> &ResearchResult {
        &self.result
    }

    /// Number of events forwarded to the port.
    pub fn forwarded(&self) -> usize {
        self.forwarded
    }

    /// Number of events dropped by the filter.
    pub fn filtered(&self) -> usize {
        self.filtered
    }

    pub fn into_parts(self) -> (P, ResearchResult) {
        (self.port, self.result)
    }

    /// Apply one typed event: accumulate, then forward.
    pub async fn accept(&mut self, event: ProgressEvent) -> Result<(), ResearcherError> {
        crate::metrics::record_progress_event(event.kind());
        let update = match event {
            ProgressEvent::Log { message, metadata } => {
                let record = LogRecord::new(message, metadata);
                self.result.logs.push(record.clone());
                ProgressUpdate::Log(record)
            }
            ProgressEvent::Report { text } => {
                self.result.text.push_str(&text);
                ProgressUpdate::ReportChunk { text }
            }
        };
        self.forwarded += 1;
        self.port.emit_progress(update).await
    }
}

#[async_trait]
impl<P: HostingPort> ProgressSink for ProgressBridge<P> {
    async fn send_json(&mut self, data: Value) -> Result<(), ResearcherError> {
        match ProgressEvent::from_value(&data) {
            Some(event) => self.accept(event).await,
            None => {
                crate::metrics::record_progress_event("filtered");
                self.filtered += 1;
                trace!(event = %data, "ignoring progress event");
                Ok(())
            }
        }
    }
}

/// Port that records every emission in memory; used by tests and by callers
/// that only need the final result.
#[derive(Debug, Default)]
pub struct RecordingPort {
    pub updates: Vec<ProgressUpdate>,
    pub finals: Vec<ResearchResult>,
    pub errors: Vec<String>,
}

#[async_trait]
impl HostingPort for RecordingPort {
    async fn emit_progress(&mut self, update: ProgressUpdate) -> Result<(), ResearcherError> {
        self.updates.push(update);
        Ok(())
    }

    async fn emit_final(&mut self, result: &ResearchResult) -> Result<(), ResearcherError> {
        self.finals.push(result.clone());
        Ok(())
    }

    async fn emit_error(&mut self, error: &ResearcherError) -> Result<(), ResearcherError> {
        self.errors.push(error.to_string());
        Ok(())
    }
}
