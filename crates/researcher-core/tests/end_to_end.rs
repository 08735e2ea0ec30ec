use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use researcher_core::engine::ScriptedEngineFactory;
use researcher_core::{
    AgentEntrypoint, Document, EngineFactory, FailurePolicy, ProgressSink, ProgressUpdate,
    RecordingPort, ReportSource, ResearchContext, ResearchEngine, ResearchRequest,
    ResearcherError, ResolvedConfig, Settings, SettingsProfile, SettingsSource,
};
use serde_json::json;

fn granite(hybrid: bool) -> SettingsSource {
    let mut settings = Settings::defaults(SettingsProfile::Granite);
    settings.hybrid = hybrid;
    SettingsSource::Fixed(settings)
}

fn scripted(settings: SettingsSource, policy: FailurePolicy) -> AgentEntrypoint {
    AgentEntrypoint::new(
        "test",
        settings,
        Arc::new(ScriptedEngineFactory::default()),
        policy,
    )
}

fn documents() -> Option<Vec<Document>> {
    Some(vec![Document::new("steel duties rose").with_source("duties.pdf")])
}

#[tokio::test]
async fn web_run_cites_only_the_retriever() {
    let entry = scripted(granite(false), FailurePolicy::Propagate);
    let mut port = RecordingPort::default();

    let result = entry
        .handle(ResearchRequest::new("impact of tariffs"), &mut port)
        .await
        .expect("run should succeed");

    assert!(result.text.contains("- duckduckgo:impact+of+tariffs"));
    assert!(!result.text.contains("duties.pdf"));
    assert_eq!(port.finals.len(), 1);
}

#[tokio::test]
async fn documents_switch_to_local_or_hybrid() {
    let local = scripted(granite(false), FailurePolicy::Propagate);
    let result = local
        .handle(
            ResearchRequest::new("impact of tariffs").with_documents(documents()),
            RecordingPort::default(),
        )
        .await
        .unwrap();
    assert!(result.text.contains("- duties.pdf"));
    assert!(!result.text.contains("duckduckgo"));

    let hybrid = scripted(granite(true), FailurePolicy::Propagate);
    let result = hybrid
        .handle(
            ResearchRequest::new("impact of tariffs").with_documents(documents()),
            RecordingPort::default(),
        )
        .await
        .unwrap();
    assert!(result.text.contains("- duties.pdf"));
    assert!(result.text.contains("- duckduckgo:impact+of+tariffs"));
}

#[tokio::test]
async fn streamed_chunks_concatenate_to_final_text() {
    let entry = scripted(granite(false), FailurePolicy::Swallow);
    let mut port = RecordingPort::default();

    let result = entry
        .handle(ResearchRequest::new("lithium supply"), &mut port)
        .await
        .unwrap();

    let streamed: String = port
        .updates
        .iter()
        .filter_map(|update| match update {
            ProgressUpdate::ReportChunk { text } => Some(text.as_str()),
            ProgressUpdate::Log(_) => None,
        })
        .collect();
    assert_eq!(streamed, result.text);
    let logs = port
        .updates
        .iter()
        .filter(|update| matches!(update, ProgressUpdate::Log(_)))
        .count();
    assert_eq!(logs, result.logs.len());
}

/// Factory that records the configuration each engine was built with.
#[derive(Default)]
struct CapturingFactory {
    seen: Mutex<Vec<ResolvedConfig>>,
}

struct SilentEngine;

#[async_trait]
impl ResearchEngine for SilentEngine {
    async fn conduct_research(&mut self, sink: &mut dyn ProgressSink) -> Result<ResearchContext> {
        sink.send_json(json!({"type": "logs", "output": "ok"})).await?;
        Ok(ResearchContext::default())
    }

    async fn write_report(&mut self, _sink: &mut dyn ProgressSink) -> Result<String> {
        Ok("done".to_string())
    }
}

impl EngineFactory for CapturingFactory {
    fn create(
        &self,
        config: &ResolvedConfig,
        _request: &ResearchRequest,
    ) -> Result<Box<dyn ResearchEngine>> {
        self.seen
            .lock()
            .expect("capture lock")
            .push(config.clone());
        Ok(Box::new(SilentEngine))
    }

    fn mode(&self) -> &'static str {
        "capturing"
    }
}

#[tokio::test]
async fn concurrent_runs_keep_their_own_overrides() {
    let factory = Arc::new(CapturingFactory::default());
    let entry = AgentEntrypoint::new(
        "test",
        granite(false),
        factory.clone(),
        FailurePolicy::Propagate,
    );

    let deep = ResearchRequest::new("a")
        .with_report_type(Some("deep".into()))
        .with_report_source(Some("local".into()));
    let outline = ResearchRequest::new("b").with_report_type(Some("outline_report".into()));

    let (first, second) = tokio::join!(
        entry.handle(deep, RecordingPort::default()),
        entry.handle(outline, RecordingPort::default()),
    );
    assert_eq!(first.unwrap().text, "done");
    assert_eq!(second.unwrap().text, "done");

    let seen = factory.seen.lock().unwrap();
    let mut types: Vec<_> = seen
        .iter()
        .map(|config| (config.report_type.as_str(), config.report_source))
        .collect();
    types.sort_by_key(|(report_type, _)| *report_type);
    assert_eq!(
        types,
        vec![
            ("deep", ReportSource::Local),
            ("outline_report", ReportSource::Web)
        ]
    );
}

#[tokio::test]
async fn invalid_report_source_is_rejected_before_the_engine() {
    let factory = Arc::new(CapturingFactory::default());
    let entry = AgentEntrypoint::new(
        "test",
        granite(false),
        factory.clone(),
        FailurePolicy::Swallow,
    );

    let err = entry
        .handle(
            ResearchRequest::new("q").with_report_source(Some("intranet".into())),
            RecordingPort::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResearcherError::InvalidConfigValue {
            field: "report_source",
            ..
        }
    ));
    assert!(factory.seen.lock().unwrap().is_empty());
}
