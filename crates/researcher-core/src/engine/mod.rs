//! Contracts for the external research engine and the engines shipped here.

mod command;
mod scripted;

pub use command::{CommandEngine, CommandEngineConfig, CommandEngineFactory};
pub use scripted::{ScriptedEngine, ScriptedEngineFactory};

use std::env;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ProgressSink, ResearchRequest, ResolvedConfig};

pub const ENGINE_PROGRAM_ENV: &str = "RESEARCHER_ENGINE_PROGRAM";
pub const ENGINE_ARGS_ENV: &str = "RESEARCHER_ENGINE_ARGS";

/// State gathered by the research phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    #[serde(default)]
    pub sources: Vec<String>,
}

/// One engine instance, bound to a single request.
///
/// Both phases push progress mappings into the sink they are given; the sink
/// may fail (for instance when the caller went away) and that failure must be
/// returned unchanged.
#[async_trait]
pub trait ResearchEngine: Send {
    async fn conduct_research(&mut self, sink: &mut dyn ProgressSink) -> Result<ResearchContext>;

    async fn write_report(&mut self, sink: &mut dyn ProgressSink) -> Result<String>;
}

/// Builds engine instances from an explicit configuration.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        config: &ResolvedConfig,
        request: &ResearchRequest,
    ) -> Result<Box<dyn ResearchEngine>>;

    /// Short label for health reporting.
    fn mode(&self) -> &'static str;
}

/// Engine selection, defaulting to the in-process scripted engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EngineChoice {
    #[default]
    Scripted,
    Command(CommandEngineConfig),
}

impl EngineChoice {
    /// `RESEARCHER_ENGINE_PROGRAM` selects the command engine; its arguments
    /// come whitespace-separated from `RESEARCHER_ENGINE_ARGS`.
    pub fn from_env() -> Self {
        env::var(ENGINE_PROGRAM_ENV)
            .ok()
            .map(|program| program.trim().to_string())
            .filter(|program| !program.is_empty())
            .map(|program| {
                let args = env::var(ENGINE_ARGS_ENV)
                    .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                EngineChoice::Command(CommandEngineConfig::new(program).with_args(args))
            })
            .unwrap_or_default()
    }

    pub fn into_factory(self) -> Arc<dyn EngineFactory> {
        match self {
            EngineChoice::Scripted => Arc::new(ScriptedEngineFactory::default()),
            EngineChoice::Command(config) => Arc::new(CommandEngineFactory::new(config)),
        }
    }
}
