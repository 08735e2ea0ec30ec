use anyhow::{Context, Result};
use researcher_core::{EngineChoice, RunLogSettings, SettingsProfile};
use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub max_concurrent_runs: usize,
    pub engine: EngineChoice,
    pub text_agent_profile: SettingsProfile,
    pub acp_profile: SettingsProfile,
    pub run_log: Option<RunLogSettings>,
    pub otel_endpoint: Option<String>,
}

impl AppConfig {
    const DEFAULT_HOST: &'static str = "127.0.0.1";
    const DEFAULT_PORT: u16 = 8000;
    const DEFAULT_MAX_RUNS: usize = 4;

    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_HOST.to_string());

        let port = env::var("PORT")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("PORT must be a valid port number, got `{value}`"))
            })
            .transpose()?
            .unwrap_or(Self::DEFAULT_PORT);

        let max_concurrent_runs = env::var("RESEARCHER_MAX_CONCURRENT_RUNS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(Self::DEFAULT_MAX_RUNS);

        let otel_endpoint = env::var("RESEARCHER_OTEL_METRICS_ENDPOINT")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            host,
            port,
            max_concurrent_runs,
            engine: EngineChoice::from_env(),
            text_agent_profile: SettingsProfile::TextAgent,
            acp_profile: SettingsProfile::Granite,
            run_log: RunLogSettings::from_env(),
            otel_endpoint,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
            max_concurrent_runs: Self::DEFAULT_MAX_RUNS,
            engine: EngineChoice::default(),
            text_agent_profile: SettingsProfile::TextAgent,
            acp_profile: SettingsProfile::Granite,
            run_log: None,
            otel_endpoint: None,
        }
    }
}
