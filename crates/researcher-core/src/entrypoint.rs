//! Per-request orchestration shared by every hosting protocol.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::engine::EngineFactory;
use crate::logging::{RunLogInput, RunLogSettings, log_run_completion};
use crate::metrics::record_run_metrics;
use crate::{
    ConfigResolver, HostingPort, ProgressBridge, ResearchPhase, ResearchRequest, ResearchResult,
    ResearcherError, ResolvedConfig, Settings, SettingsProfile,
};

/// What a run does when the engine fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and answer with an empty result.
    Swallow,
    /// Report the failure to the caller and return it.
    Propagate,
}

/// Where settings come from for each request.
#[derive(Debug, Clone)]
pub enum SettingsSource {
    /// Loaded once, reused for every request.
    Fixed(Settings),
    /// Re-read from the process environment per request.
    Environment(SettingsProfile),
}

impl SettingsSource {
    pub fn load(&self) -> Settings {
        match self {
            SettingsSource::Fixed(settings) => settings.clone(),
            SettingsSource::Environment(profile) => Settings::from_env(*profile),
        }
    }
}

/// Drives one research run from request to terminal response.
#[derive(Clone)]
pub struct AgentEntrypoint {
    host: &'static str,
    settings: SettingsSource,
    factory: Arc<dyn EngineFactory>,
    policy: FailurePolicy,
    run_log: Option<RunLogSettings>,
}

impl AgentEntrypoint {
    pub fn new(
        host: &'static str,
        settings: SettingsSource,
        factory: Arc<dyn EngineFactory>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            host,
            settings,
            factory,
            policy,
            run_log: None,
        }
    }

    pub fn with_run_log(mut self, run_log: Option<RunLogSettings>) -> Self {
        self.run_log = run_log;
        self
    }

    pub fn engine_mode(&self) -> &'static str {
        self.factory.mode()
    }

    /// Resolve the request against the current settings. Fails on invalid
    /// option values regardless of the failure policy.
    pub fn resolve(&self, request: &ResearchRequest) -> Result<ResolvedConfig, ResearcherError> {
        ConfigResolver::resolve(&self.settings.load(), request)
    }

    /// Resolve and run under a fresh run id.
    pub async fn handle<P: HostingPort>(
        &self,
        request: ResearchRequest,
        port: P,
    ) -> Result<ResearchResult, ResearcherError> {
        let config = self.resolve(&request)?;
        let run_id = Uuid::new_v4().to_string();
        self.run_resolved(&run_id, config, request, port).await
    }

    /// Run with an already resolved configuration. Hosts that must reject bad
    /// input before opening a stream resolve first, then call this.
    #[instrument(
        name = "research.run",
        skip_all,
        fields(host = self.host, run_id = %run_id, engine = self.factory.mode())
    )]
    pub async fn run_resolved<P: HostingPort>(
        &self,
        run_id: &str,
        config: ResolvedConfig,
        request: ResearchRequest,
        port: P,
    ) -> Result<ResearchResult, ResearcherError> {
        let started = Instant::now();
        info!(
            report_type = config.report_type.as_str(),
            report_source = config.report_source.as_str(),
            "research run started"
        );

        let mut bridge = ProgressBridge::new(port);
        let outcome = self.drive(&config, &request, &mut bridge).await;
        let (forwarded, filtered) = (bridge.forwarded(), bridge.filtered());
        let (mut port, mut result) = bridge.into_parts();
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(report) => {
                if result.text.is_empty() && !report.is_empty() {
                    result.text = report;
                }
                self.finish(run_id, &request, &result, "completed", elapsed, None);
                info!(
                    report_chars = result.text.len(),
                    logs = result.logs.len(),
                    forwarded,
                    filtered,
                    duration_ms = elapsed,
                    "research run completed"
                );
                port.emit_final(&result).await?;
                Ok(result)
            }
            Err(err) if matches!(err, ResearcherError::HostDisconnected(_)) => {
                warn!(error = %err, "caller went away; abandoning run");
                self.finish(run_id, &request, &result, "disconnected", elapsed, Some(&err));
                Err(err)
            }
            Err(err) => match self.policy {
                FailurePolicy::Swallow => {
                    error!(error = %err, "research run failed; answering with an empty result");
                    self.finish(run_id, &request, &result, "swallowed", elapsed, Some(&err));
                    let empty = ResearchResult::default();
                    port.emit_final(&empty).await?;
                    Ok(empty)
                }
                FailurePolicy::Propagate => {
                    error!(error = %err, "research run failed");
                    self.finish(run_id, &request, &result, "failed", elapsed, Some(&err));
                    if let Err(emit_err) = port.emit_error(&err).await {
                        warn!(error = %emit_err, "failed to report run failure to caller");
                    }
                    Err(err)
                }
            },
        }
    }

    async fn drive<P: HostingPort>(
        &self,
        config: &ResolvedConfig,
        request: &ResearchRequest,
        bridge: &mut ProgressBridge<P>,
    ) -> Result<String, ResearcherError> {
        let mut engine = self
            .factory
            .create(config, request)
            .map_err(|err| ResearcherError::engine(ResearchPhase::ConductResearch, err))?;

        let context = engine
            .conduct_research(bridge)
            .await
            .map_err(|err| classify(ResearchPhase::ConductResearch, err))?;
        info!(sources = context.sources.len(), "research phase finished");

        engine
            .write_report(bridge)
            .await
            .map_err(|err| classify(ResearchPhase::WriteReport, err))
    }

    /// Record metrics and the run log line; called before any terminal emit.
    fn finish(
        &self,
        run_id: &str,
        request: &ResearchRequest,
        result: &ResearchResult,
        status: &'static str,
        elapsed_ms: u64,
        error: Option<&ResearcherError>,
    ) {
        record_run_metrics(self.host, status, elapsed_ms);
        let Some(settings) = &self.run_log else {
            return;
        };
        let input = RunLogInput {
            run_id: run_id.to_string(),
            host: self.host.to_string(),
            status,
            query: request.query.clone(),
            report_chars: result.text.len(),
            log_count: result.logs.len(),
            error: error.map(ToString::to_string),
        };
        if let Err(err) = log_run_completion(settings, input) {
            warn!(error = %err, "failed to write run log");
        }
    }
}

/// Errors raised by the sink surface unchanged; everything else is an engine failure.
fn classify(phase: ResearchPhase, err: anyhow::Error) -> ResearcherError {
    match err.downcast::<ResearcherError>() {
        Ok(err) => err,
        Err(err) => ResearcherError::engine(phase, err),
    }
}
