use crate::config::AppConfig;
use crate::error::AppError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use researcher_core::{AgentEntrypoint, FailurePolicy, Settings, SettingsSource};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    text_agent: Arc<AgentEntrypoint>,
    acp: Arc<AgentEntrypoint>,
    permits: Arc<Semaphore>,
    max_runs: usize,
    runs: RunRegistry,
}

impl AppState {
    /// Text-agent settings are loaded once here; ACP settings are re-read per request.
    pub fn try_new(config: &AppConfig) -> Result<Self> {
        let factory = config.engine.clone().into_factory();
        info!(
            engine = factory.mode(),
            max_runs = config.max_concurrent_runs,
            "initialising agent entrypoints"
        );

        let text_agent = AgentEntrypoint::new(
            "text-agent",
            SettingsSource::Fixed(Settings::from_env(config.text_agent_profile)),
            factory.clone(),
            FailurePolicy::Swallow,
        )
        .with_run_log(config.run_log.clone());
        let acp = AgentEntrypoint::new(
            "acp",
            SettingsSource::Environment(config.acp_profile),
            factory,
            FailurePolicy::Propagate,
        )
        .with_run_log(config.run_log.clone());

        Ok(Self::from_entrypoints(
            text_agent,
            acp,
            config.max_concurrent_runs,
        ))
    }

    pub fn from_entrypoints(
        text_agent: AgentEntrypoint,
        acp: AgentEntrypoint,
        max_runs: usize,
    ) -> Self {
        let max_runs = max_runs.max(1);
        Self {
            text_agent: Arc::new(text_agent),
            acp: Arc::new(acp),
            permits: Arc::new(Semaphore::new(max_runs)),
            max_runs,
            runs: RunRegistry::default(),
        }
    }

    pub fn text_agent(&self) -> Arc<AgentEntrypoint> {
        self.text_agent.clone()
    }

    pub fn acp(&self) -> Arc<AgentEntrypoint> {
        self.acp.clone()
    }

    pub fn runs(&self) -> RunRegistry {
        self.runs.clone()
    }

    /// Claim a run slot without waiting.
    pub fn try_acquire_run(&self) -> Result<OwnedSemaphorePermit, AppError> {
        self.permits
            .clone()
            .try_acquire_owned()
            .map_err(|err| match err {
                TryAcquireError::NoPermits => AppError::too_many_runs(self.max_runs),
                TryAcquireError::Closed => AppError::internal("run slots closed"),
            })
    }

    pub fn capacity(&self) -> Capacity {
        let available_permits = self.permits.available_permits();
        Capacity {
            max_concurrent_runs: self.max_runs,
            available_permits,
            active_runs: self.max_runs.saturating_sub(available_permits),
            recorded_acp_runs: self.runs.len(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Capacity {
    pub max_concurrent_runs: usize,
    pub available_permits: usize,
    pub active_runs: usize,
    pub recorded_acp_runs: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Created,
    InProgress,
    Completed,
    Failed,
}

impl RunState {
    fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunStatus {
    pub run_id: String,
    pub agent_name: String,
    pub status: RunState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Finished runs kept for status queries before the oldest are evicted.
pub const DEFAULT_RETAINED_RUNS: usize = 1024;

/// Status of the ACP runs started by this process. Active runs are always
/// kept; finished ones are evicted oldest first beyond the retention limit.
#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<DashMap<String, RunStatus>>,
    retained: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_RUNS)
    }
}

impl RunRegistry {
    pub fn with_retention(retained: usize) -> Self {
        Self {
            runs: Arc::new(DashMap::new()),
            retained,
        }
    }

    pub fn create(&self, agent_name: &str) -> RunStatus {
        self.evict_finished();
        let status = RunStatus {
            run_id: Uuid::new_v4().to_string(),
            agent_name: agent_name.to_string(),
            status: RunState::Created,
            created_at: Utc::now(),
            finished_at: None,
            output: None,
            error: None,
        };
        self.runs.insert(status.run_id.clone(), status.clone());
        status
    }

    fn evict_finished(&self) {
        let mut finished: Vec<(DateTime<Utc>, String)> = self
            .runs
            .iter()
            .filter_map(|entry| {
                entry
                    .finished_at
                    .filter(|_| entry.status.is_terminal())
                    .map(|at| (at, entry.run_id.clone()))
            })
            .collect();
        if finished.len() < self.retained.max(1) {
            return;
        }
        finished.sort();
        let excess = finished.len() + 1 - self.retained.max(1);
        for (_, run_id) in finished.into_iter().take(excess) {
            self.runs.remove(&run_id);
        }
        debug!(evicted = excess, "evicted finished runs from registry");
    }

    pub fn get(&self, run_id: &str) -> Option<RunStatus> {
        self.runs.get(run_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn start(&self, run_id: &str) {
        if let Some(mut entry) = self.runs.get_mut(run_id) {
            entry.status = RunState::InProgress;
        }
    }

    pub fn complete(&self, run_id: &str, output: &str) {
        if let Some(mut entry) = self.runs.get_mut(run_id) {
            entry.status = RunState::Completed;
            entry.finished_at = Some(Utc::now());
            entry.output = Some(output.to_string());
        }
    }

    /// Mark a run failed unless it already reached a terminal state.
    pub fn fail(&self, run_id: &str, error: &str) {
        if let Some(mut entry) = self.runs.get_mut(run_id)
            && !entry.status.is_terminal()
        {
            entry.status = RunState::Failed;
            entry.finished_at = Some(Utc::now());
            entry.error = Some(error.to_string());
        }
    }
}
