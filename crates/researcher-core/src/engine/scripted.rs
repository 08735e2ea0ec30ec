use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{EngineFactory, ResearchContext, ResearchEngine};
use crate::{ProgressSink, ReportSource, ResearchPhase, ResearchRequest, ResolvedConfig};

/// Factory for the deterministic in-process engine.
///
/// Without a custom script the engine narrates planning and gathering, then
/// streams a small markdown report assembled from the query and its sources.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngineFactory {
    script: Option<(Vec<Value>, Vec<Value>)>,
    returned_report: Option<String>,
    fail_on: Option<ResearchPhase>,
}

impl ScriptedEngineFactory {
    /// Replace the generated narration with fixed event mappings per phase.
    pub fn with_script(mut self, research: Vec<Value>, report: Vec<Value>) -> Self {
        self.script = Some((research, report));
        self
    }

    /// Text `write_report` returns when a custom script is used.
    pub fn with_returned_report(mut self, report: impl Into<String>) -> Self {
        self.returned_report = Some(report.into());
        self
    }

    /// Fail the given phase after its events have been emitted.
    pub fn failing_on(mut self, phase: ResearchPhase) -> Self {
        self.fail_on = Some(phase);
        self
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(
        &self,
        config: &ResolvedConfig,
        request: &ResearchRequest,
    ) -> Result<Box<dyn ResearchEngine>> {
        let engine = match &self.script {
            Some((research, report)) => ScriptedEngine {
                research_events: research.clone(),
                report_events: report.clone(),
                report_text: self.returned_report.clone().unwrap_or_default(),
                sources: Vec::new(),
                fail_on: self.fail_on,
            },
            None => ScriptedEngine::narrate(config, request, self.fail_on),
        };
        Ok(Box::new(engine))
    }

    fn mode(&self) -> &'static str {
        "scripted"
    }
}

/// Engine replaying prepared progress mappings.
#[derive(Debug)]
pub struct ScriptedEngine {
    research_events: Vec<Value>,
    report_events: Vec<Value>,
    report_text: String,
    sources: Vec<String>,
    fail_on: Option<ResearchPhase>,
}

impl ScriptedEngine {
    fn narrate(
        config: &ResolvedConfig,
        request: &ResearchRequest,
        fail_on: Option<ResearchPhase>,
    ) -> Self {
        let query = request.query.trim();
        let mut sources = Vec::new();
        if matches!(config.report_source, ReportSource::Web | ReportSource::Hybrid) {
            sources.push(format!(
                "{}:{}",
                config.retriever,
                query.split_whitespace().collect::<Vec<_>>().join("+")
            ));
        }
        if matches!(config.report_source, ReportSource::Local | ReportSource::Hybrid) {
            let documents = request.documents.as_deref().unwrap_or_default();
            sources.extend(documents.iter().enumerate().map(|(index, doc)| {
                doc.source
                    .clone()
                    .unwrap_or_else(|| format!("document-{}", index + 1))
            }));
            if let Some(path) = &config.doc_path {
                sources.push(path.display().to_string());
            }
        }

        let mut research_events = vec![
            json!({"type": "logs", "content": "starting_research", "output": format!("Starting the research task for '{query}'")}),
            json!({
                "type": "logs",
                "content": "planning_research",
                "output": format!("Planning research with {}", config.smart_llm),
                "metadata": {
                    "report_type": config.report_type.as_str(),
                    "report_source": config.report_source.as_str(),
                    "tone": config.tone.as_str(),
                },
            }),
        ];
        research_events.extend(sources.iter().map(|source| {
            json!({"type": "logs", "content": "source_gathered", "output": format!("Gathered context from {source}")})
        }));
        research_events.push(json!({
            "type": "logs",
            "content": "research_complete",
            "output": format!("Research complete with {} sources", sources.len()),
        }));

        let mut chunks = vec![
            format!("# {query}\n\n"),
            format!(
                "## Summary\n\nFindings on \"{query}\" from {} sources ({}, {} tone).\n\n",
                sources.len(),
                config.report_type.as_str().replace('_', " "),
                config.tone.as_str(),
            ),
        ];
        if !sources.is_empty() {
            chunks.push("## Sources\n\n".to_string());
            chunks.extend(sources.iter().map(|source| format!("- {source}\n")));
        }
        let report_text = chunks.concat();
        let report_events = chunks
            .into_iter()
            .map(|chunk| json!({"type": "report", "output": chunk}))
            .collect();

        Self {
            research_events,
            report_events,
            report_text,
            sources,
            fail_on,
        }
    }

    async fn replay(
        events: &[Value],
        sink: &mut dyn ProgressSink,
        phase: ResearchPhase,
        fail_on: Option<ResearchPhase>,
    ) -> Result<()> {
        for event in events {
            sink.send_json(event.clone()).await?;
        }
        if fail_on == Some(phase) {
            bail!("scripted failure in {phase}");
        }
        Ok(())
    }
}

#[async_trait]
impl ResearchEngine for ScriptedEngine {
    #[instrument(name = "engine.scripted.research", skip_all)]
    async fn conduct_research(&mut self, sink: &mut dyn ProgressSink) -> Result<ResearchContext> {
        Self::replay(
            &self.research_events,
            sink,
            ResearchPhase::ConductResearch,
            self.fail_on,
        )
        .await?;
        debug!(sources = self.sources.len(), "scripted research finished");
        Ok(ResearchContext {
            sources: self.sources.clone(),
        })
    }

    #[instrument(name = "engine.scripted.report", skip_all)]
    async fn write_report(&mut self, sink: &mut dyn ProgressSink) -> Result<String> {
        Self::replay(
            &self.report_events,
            sink,
            ResearchPhase::WriteReport,
            self.fail_on,
        )
        .await?;
        Ok(self.report_text.clone())
    }
}
