use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{ResearcherError, SecretValue};

pub const RETRIEVER_ENV: &str = "RETRIEVER";
pub const LLM_API_BASE_ENV: &str = "LLM_API_BASE";
pub const LLM_API_KEY_ENV: &str = "LLM_API_KEY";
pub const LLM_MODEL_ENV: &str = "LLM_MODEL";
pub const LLM_MODEL_FAST_ENV: &str = "LLM_MODEL_FAST";
pub const LLM_MODEL_SMART_ENV: &str = "LLM_MODEL_SMART";
pub const LLM_MODEL_STRATEGIC_ENV: &str = "LLM_MODEL_STRATEGIC";
pub const EMBEDDING_MODEL_ENV: &str = "EMBEDDING_MODEL";
pub const EMBEDDING_ENV: &str = "EMBEDDING";
pub const REPORT_TYPE_ENV: &str = "REPORT_TYPE";
pub const TONE_ENV: &str = "TONE";
pub const DOC_PATH_ENV: &str = "DOC_PATH";
pub const HYBRID_ENV: &str = "HYBRID";

/// Which adapter's defaults and environment keys apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettingsProfile {
    /// Typed-settings adapter: Ollama-hosted Granite everywhere, hybrid search
    /// whenever documents are attached, never reads documents from disk.
    TextAgent,
    /// Raw-environment adapter: OpenAI-compatible endpoint, report options and
    /// local document path taken from the environment.
    #[default]
    Granite,
}

impl SettingsProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsProfile::TextAgent => "text-agent",
            SettingsProfile::Granite => "granite",
        }
    }

    fn reads_report_options(&self) -> bool {
        matches!(self, SettingsProfile::Granite)
    }
}

impl FromStr for SettingsProfile {
    type Err = ResearcherError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text-agent" => Ok(SettingsProfile::TextAgent),
            "granite" => Ok(SettingsProfile::Granite),
            other => Err(ResearcherError::invalid_value(
                "profile",
                other,
                vec!["text-agent", "granite"],
            )),
        }
    }
}

impl fmt::Display for SettingsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layered inputs to the config resolver: compiled-in profile defaults with
/// environment overrides applied. Request overrides are applied at resolve time.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub profile: SettingsProfile,
    pub retriever: String,
    pub llm_api_base: String,
    pub llm_api_key: SecretValue,
    pub llm_model: String,
    pub llm_model_fast: Option<String>,
    pub llm_model_smart: Option<String>,
    pub llm_model_strategic: Option<String>,
    pub embedding: Option<String>,
    pub report_type: Option<String>,
    pub tone: Option<String>,
    pub doc_path: Option<PathBuf>,
    pub hybrid: bool,
}

impl Settings {
    /// Compiled-in defaults for a profile.
    pub fn defaults(profile: SettingsProfile) -> Self {
        match profile {
            SettingsProfile::TextAgent => {
                let model = "ollama:granite3.3:8b".to_string();
                Self {
                    profile,
                    retriever: "duckduckgo".into(),
                    llm_api_base: "http://localhost:11434".into(),
                    llm_api_key: SecretValue::new("ollama"),
                    llm_model: model.clone(),
                    llm_model_fast: Some(model.clone()),
                    llm_model_smart: Some(model.clone()),
                    llm_model_strategic: Some(model.clone()),
                    embedding: Some(model),
                    report_type: None,
                    tone: None,
                    doc_path: None,
                    hybrid: true,
                }
            }
            SettingsProfile::Granite => Self {
                profile,
                retriever: "duckduckgo".into(),
                llm_api_base: "http://localhost:11434/v1".into(),
                llm_api_key: SecretValue::new("dummy"),
                llm_model: "granite3.3:8b-beeai".into(),
                llm_model_fast: None,
                llm_model_smart: None,
                llm_model_strategic: None,
                embedding: Some("ollama:nomic-embed-text".into()),
                report_type: None,
                tone: None,
                doc_path: None,
                hybrid: false,
            },
        }
    }

    /// Load settings for a profile from the process environment.
    pub fn from_env(profile: SettingsProfile) -> Self {
        Self::from_lookup(profile, |key| env::var(key).ok())
    }

    /// Load settings for a profile from an arbitrary key lookup.
    ///
    /// Resolution order per key: lookup value, then the profile default. An
    /// empty embedding value disables embeddings; other empty values are ignored.
    pub fn from_lookup<F>(profile: SettingsProfile, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut settings = Self::defaults(profile);

        if let Some(retriever) = non_empty(RETRIEVER_ENV) {
            settings.retriever = retriever;
        }
        if let Some(base) = non_empty(LLM_API_BASE_ENV) {
            settings.llm_api_base = base;
        }
        if let Some(key) = non_empty(LLM_API_KEY_ENV) {
            settings.llm_api_key = SecretValue::new(key);
        }
        if let Some(model) = non_empty(LLM_MODEL_ENV) {
            settings.llm_model = model;
        }
        if let Some(model) = non_empty(LLM_MODEL_FAST_ENV) {
            settings.llm_model_fast = Some(model);
        }
        if let Some(model) = non_empty(LLM_MODEL_SMART_ENV) {
            settings.llm_model_smart = Some(model);
        }
        if let Some(model) = non_empty(LLM_MODEL_STRATEGIC_ENV) {
            settings.llm_model_strategic = Some(model);
        }

        let embedding = lookup(EMBEDDING_MODEL_ENV).or_else(|| lookup(EMBEDDING_ENV));
        if let Some(embedding) = embedding {
            let embedding = embedding.trim();
            settings.embedding = (!embedding.is_empty()).then(|| embedding.to_string());
        }

        if profile.reads_report_options() {
            settings.report_type = non_empty(REPORT_TYPE_ENV);
            settings.tone = non_empty(TONE_ENV);
            settings.doc_path = non_empty(DOC_PATH_ENV).map(PathBuf::from);
            settings.hybrid = lookup(HYBRID_ENV)
                .map(|value| value.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(settings.hybrid);
        }

        settings
    }
}
