use std::fmt;

use thiserror::Error;

/// Core error type for the researcher agent host.
#[derive(Debug, Error)]
pub enum ResearcherError {
    #[error("invalid {field} `{value}`; expected one of: {}", .allowed.join(", "))]
    InvalidConfigValue {
        field: &'static str,
        value: String,
        allowed: Vec<&'static str>,
    },
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("research engine failed during {phase}: {source:#}")]
    EngineFailure {
        phase: ResearchPhase,
        #[source]
        source: anyhow::Error,
    },
    #[error("caller disconnected: {0}")]
    HostDisconnected(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResearcherError {
    pub fn invalid_value(
        field: &'static str,
        value: impl Into<String>,
        allowed: Vec<&'static str>,
    ) -> Self {
        Self::InvalidConfigValue {
            field,
            value: value.into(),
            allowed,
        }
    }

    pub fn engine(phase: ResearchPhase, source: anyhow::Error) -> Self {
        Self::EngineFailure { phase, source }
    }

    /// Whether the error stems from caller input rather than from the run itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidConfigValue { .. })
    }
}

/// The two engine phases driven by the entrypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchPhase {
    ConductResearch,
    WriteReport,
}

impl ResearchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchPhase::ConductResearch => "conduct_research",
            ResearchPhase::WriteReport => "write_report",
        }
    }
}

impl fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
