//! Resolution of layered settings into the configuration handed to the engine.
//!
//! Layers, lowest first: compiled-in profile defaults, environment overrides
//! (both captured in [`Settings`]), then per-request overrides carried by the
//! [`ResearchRequest`]. The result is passed explicitly to the engine factory;
//! nothing here touches the process environment.

use std::path::PathBuf;

use tracing::debug;

use crate::{
    PromptFamily, ReportSource, ReportType, ResearchRequest, ResearcherError, SecretValue,
    Settings, Tone,
};

/// Provider prefix of models served by a locally hosted inference runtime.
pub const LOCAL_PROVIDER: &str = "ollama";
/// Provider assumed for bare model names: the OpenAI-compatible endpoint.
pub const DEFAULT_PROVIDER: &str = "openai";
/// Versioned path segment of the OpenAI-compatible API.
pub const API_VERSION_SEGMENT: &str = "/v1";

const KNOWN_PROVIDERS: &[&str] = &[
    "openai",
    "ollama",
    "anthropic",
    "azure_openai",
    "google_genai",
    "google_vertexai",
    "huggingface",
    "groq",
    "mistralai",
    "together",
    "fireworks",
    "bedrock",
    "cohere",
    "deepseek",
    "litellm",
    "openrouter",
    "xai",
    "vllm",
    "dashscope",
    "gigachat",
    "netmind",
    "aimlapi",
];

/// Fully qualify a model identifier with a provider prefix.
///
/// Identifiers whose text before the first `:` names a known provider are kept
/// as-is; anything else (including tags such as `granite3.3:8b`) gets the
/// default provider prepended.
pub fn qualify_model(model: &str) -> String {
    let model = model.trim();
    match model.split_once(':') {
        Some((provider, _)) if KNOWN_PROVIDERS.contains(&provider) => model.to_string(),
        _ => format!("{DEFAULT_PROVIDER}:{model}"),
    }
}

pub fn is_local_model(model: &str) -> bool {
    model
        .split_once(':')
        .is_some_and(|(provider, _)| provider == LOCAL_PROVIDER)
}

/// API base with the versioned segment appended exactly once.
pub fn openai_base_url(api_base: &str) -> String {
    let trimmed = api_base.trim().trim_end_matches('/');
    if trimmed.ends_with(API_VERSION_SEGMENT) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{API_VERSION_SEGMENT}")
    }
}

/// API base without the versioned segment, as the local runtime expects it.
pub fn local_base_url(api_base: &str) -> String {
    let trimmed = api_base.trim().trim_end_matches('/');
    trimmed
        .strip_suffix(API_VERSION_SEGMENT)
        .unwrap_or(trimmed)
        .to_string()
}

/// Configuration for one run, ready to be handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub retriever: String,
    pub llm_model: String,
    pub fast_llm: String,
    pub smart_llm: String,
    pub strategic_llm: String,
    pub embedding: Option<String>,
    pub openai_base_url: String,
    pub ollama_base_url: Option<String>,
    pub api_key: SecretValue,
    pub prompt_family: Option<PromptFamily>,
    pub report_type: ReportType,
    pub tone: Tone,
    pub report_source: ReportSource,
    pub hybrid: bool,
    pub doc_path: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Every environment key the engine reads from this configuration.
    pub const MANAGED_KEYS: [&'static str; 15] = [
        "RETRIEVER",
        "LLM_MODEL",
        "FAST_LLM",
        "SMART_LLM",
        "STRATEGIC_LLM",
        "EMBEDDING",
        "OPENAI_BASE_URL",
        "OLLAMA_BASE_URL",
        "OPENAI_API_KEY",
        "PROMPT_FAMILY",
        "REPORT_TYPE",
        "TONE",
        "REPORT_SOURCE",
        "HYBRID",
        "DOC_PATH",
    ];

    /// Engine environment. Absent optional slots are omitted, never set empty.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("RETRIEVER", self.retriever.clone()),
            ("LLM_MODEL", self.llm_model.clone()),
            ("FAST_LLM", self.fast_llm.clone()),
            ("SMART_LLM", self.smart_llm.clone()),
            ("STRATEGIC_LLM", self.strategic_llm.clone()),
        ];
        if let Some(embedding) = &self.embedding {
            vars.push(("EMBEDDING", embedding.clone()));
        }
        vars.push(("OPENAI_BASE_URL", self.openai_base_url.clone()));
        if let Some(base) = &self.ollama_base_url {
            vars.push(("OLLAMA_BASE_URL", base.clone()));
        }
        vars.push(("OPENAI_API_KEY", self.api_key.expose().to_string()));
        if let Some(family) = self.prompt_family {
            vars.push(("PROMPT_FAMILY", family.as_str().to_string()));
        }
        vars.push(("REPORT_TYPE", self.report_type.as_str().to_string()));
        vars.push(("TONE", self.tone.description().to_string()));
        vars.push(("REPORT_SOURCE", self.report_source.as_str().to_string()));
        vars.push(("HYBRID", self.hybrid.to_string()));
        if let Some(path) = &self.doc_path {
            vars.push(("DOC_PATH", path.display().to_string()));
        }
        vars
    }

    /// Same as [`env_vars`](Self::env_vars) with the API key masked, for display.
    pub fn redacted_env_vars(&self) -> Vec<(&'static str, String)> {
        self.env_vars()
            .into_iter()
            .map(|(key, value)| {
                if key == "OPENAI_API_KEY" {
                    (key, "[REDACTED]".to_string())
                } else {
                    (key, value)
                }
            })
            .collect()
    }

    /// All model identifiers in use, embedding included.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.llm_model.as_str()),
            Some(self.fast_llm.as_str()),
            Some(self.smart_llm.as_str()),
            Some(self.strategic_llm.as_str()),
            self.embedding.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Derives a [`ResolvedConfig`] from settings and a request.
pub struct ConfigResolver;

impl ConfigResolver {
    pub fn resolve(
        settings: &Settings,
        request: &ResearchRequest,
    ) -> Result<ResolvedConfig, ResearcherError> {
        let llm_model = qualify_model(&settings.llm_model);
        let slot = |value: &Option<String>| {
            value
                .as_deref()
                .map(qualify_model)
                .unwrap_or_else(|| llm_model.clone())
        };
        let fast_llm = slot(&settings.llm_model_fast);
        let smart_llm = slot(&settings.llm_model_smart);
        let strategic_llm = slot(&settings.llm_model_strategic);
        let embedding = settings.embedding.as_deref().map(qualify_model);

        let prompt_family = PromptFamily::detect(&smart_llm);

        let report_type = request
            .report_type
            .as_deref()
            .or(settings.report_type.as_deref())
            .map(str::parse::<ReportType>)
            .transpose()?
            .unwrap_or_default();
        let tone = request
            .tone
            .as_deref()
            .or(settings.tone.as_deref())
            .map(str::parse::<Tone>)
            .transpose()?
            .unwrap_or_default();

        let report_source = match request.report_source.as_deref() {
            Some(explicit) => explicit.parse::<ReportSource>()?,
            None => {
                let has_corpus = request.has_documents() || settings.doc_path.is_some();
                match (has_corpus, settings.hybrid) {
                    (false, _) => ReportSource::Web,
                    (true, false) => ReportSource::Local,
                    (true, true) => ReportSource::Hybrid,
                }
            }
        };

        let mut resolved = ResolvedConfig {
            retriever: settings.retriever.clone(),
            llm_model,
            fast_llm,
            smart_llm,
            strategic_llm,
            embedding,
            openai_base_url: openai_base_url(&settings.llm_api_base),
            ollama_base_url: None,
            api_key: settings.llm_api_key.clone(),
            prompt_family,
            report_type,
            tone,
            report_source,
            hybrid: settings.hybrid,
            doc_path: settings.doc_path.clone(),
        };
        if resolved.models().any(is_local_model) {
            resolved.ollama_base_url = Some(local_base_url(&settings.llm_api_base));
        }

        debug!(
            profile = %settings.profile,
            smart_llm = %resolved.smart_llm,
            report_type = %resolved.report_type,
            report_source = %resolved.report_source,
            local_inference = resolved.ollama_base_url.is_some(),
            "resolved research configuration"
        );

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Document, SettingsProfile};

    fn granite() -> Settings {
        Settings::defaults(SettingsProfile::Granite)
    }

    fn env_value<'a>(vars: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        vars.iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn qualify_keeps_known_providers_and_prefixes_bare_names() {
        assert_eq!(qualify_model("ollama:granite3.3:8b"), "ollama:granite3.3:8b");
        assert_eq!(qualify_model("openai:gpt-4"), "openai:gpt-4");
        assert_eq!(qualify_model("granite3.3:8b-beeai"), "openai:granite3.3:8b-beeai");
        assert_eq!(qualify_model("gpt-4o"), "openai:gpt-4o");
    }

    #[test]
    fn unset_slots_fall_back_to_primary_model() {
        let mut settings = granite();
        settings.llm_model = "openai:gpt-4o".into();
        let config = ConfigResolver::resolve(&settings, &ResearchRequest::new("q")).unwrap();
        assert_eq!(config.fast_llm, "openai:gpt-4o");
        assert_eq!(config.smart_llm, "openai:gpt-4o");
        assert_eq!(config.strategic_llm, "openai:gpt-4o");
    }

    #[test]
    fn local_models_set_both_base_urls() {
        let mut settings = granite();
        settings.llm_api_base = "http://localhost:11434".into();
        settings.llm_model = "ollama:granite3.3:8b".into();
        let config = ConfigResolver::resolve(&settings, &ResearchRequest::new("q")).unwrap();
        assert_eq!(
            config.ollama_base_url.as_deref(),
            Some("http://localhost:11434")
        );
        assert_eq!(config.openai_base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn versioned_base_is_not_suffixed_twice() {
        let mut settings = granite();
        settings.llm_api_base = "http://localhost:11434/v1/".into();
        settings.llm_model = "ollama:granite3.3:8b".into();
        let config = ConfigResolver::resolve(&settings, &ResearchRequest::new("q")).unwrap();
        assert_eq!(config.openai_base_url, "http://localhost:11434/v1");
        assert_eq!(
            config.ollama_base_url.as_deref(),
            Some("http://localhost:11434")
        );
        assert_eq!(openai_base_url(&config.openai_base_url), config.openai_base_url);
    }

    #[test]
    fn local_embedding_alone_enables_local_base() {
        let mut settings = granite();
        settings.llm_model = "openai:gpt-4o".into();
        settings.embedding = Some("ollama:nomic-embed-text".into());
        let config = ConfigResolver::resolve(&settings, &ResearchRequest::new("q")).unwrap();
        assert!(config.ollama_base_url.is_some());

        settings.embedding = None;
        let config = ConfigResolver::resolve(&settings, &ResearchRequest::new("q")).unwrap();
        assert!(config.ollama_base_url.is_none());
        let vars = config.env_vars();
        assert!(env_value(&vars, "OLLAMA_BASE_URL").is_none());
        assert!(env_value(&vars, "EMBEDDING").is_none());
        assert_eq!(env_value(&vars, "OPENAI_BASE_URL"), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn prompt_family_follows_smart_model() {
        let mut settings = granite();
        settings.llm_model_smart = Some("ollama:granite3.3:8b".into());
        let config = ConfigResolver::resolve(&settings, &ResearchRequest::new("q")).unwrap();
        assert_eq!(config.prompt_family, Some(PromptFamily::Granite));

        settings.llm_model = "openai:gpt-4".into();
        settings.llm_model_smart = Some("openai:gpt-4".into());
        let config = ConfigResolver::resolve(&settings, &ResearchRequest::new("q")).unwrap();
        assert_eq!(config.prompt_family, None);
        assert!(env_value(&config.env_vars(), "PROMPT_FAMILY").is_none());
    }

    #[test]
    fn bogus_report_type_is_rejected() {
        let request = ResearchRequest::new("q").with_report_type(Some("bogus-value".into()));
        let err = ConfigResolver::resolve(&granite(), &request).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bogus-value"), "{message}");
        for legal in ReportType::legal_values() {
            assert!(message.contains(legal), "{message} should list {legal}");
        }
    }

    #[test]
    fn bogus_tone_from_settings_is_rejected() {
        let mut settings = granite();
        settings.tone = Some("sarcastic".into());
        let err = ConfigResolver::resolve(&settings, &ResearchRequest::new("q")).unwrap_err();
        assert!(matches!(
            err,
            ResearcherError::InvalidConfigValue { field: "tone", .. }
        ));
    }

    #[test]
    fn request_overrides_take_precedence() {
        let mut settings = granite();
        settings.report_type = Some("deep".into());
        let request = ResearchRequest::new("q")
            .with_report_type(Some("outline_report".into()))
            .with_tone(Some("formal".into()));
        let config = ConfigResolver::resolve(&settings, &request).unwrap();
        assert_eq!(config.report_type, ReportType::OutlineReport);
        assert_eq!(config.tone, Tone::Formal);
    }

    #[test]
    fn report_source_follows_documents_and_hybrid_flag() {
        let mut settings = granite();
        let web = ResearchRequest::new("impact of tariffs");
        let with_docs = web
            .clone()
            .with_documents(Some(vec![Document::new("tariff schedule 2024")]));

        let config = ConfigResolver::resolve(&settings, &web).unwrap();
        assert_eq!(config.report_source, ReportSource::Web);

        let config = ConfigResolver::resolve(&settings, &with_docs).unwrap();
        assert_eq!(config.report_source, ReportSource::Local);

        settings.hybrid = true;
        let config = ConfigResolver::resolve(&settings, &with_docs).unwrap();
        assert_eq!(config.report_source, ReportSource::Hybrid);

        let config = ConfigResolver::resolve(&settings, &web).unwrap();
        assert_eq!(config.report_source, ReportSource::Web);
    }

    #[test]
    fn doc_path_counts_as_local_corpus() {
        let mut settings = granite();
        settings.doc_path = Some(PathBuf::from("/srv/docs"));
        let config = ConfigResolver::resolve(&settings, &ResearchRequest::new("q")).unwrap();
        assert_eq!(config.report_source, ReportSource::Local);
        assert_eq!(env_value(&config.env_vars(), "DOC_PATH"), Some("/srv/docs"));
    }

    #[test]
    fn explicit_report_source_is_validated() {
        let request = ResearchRequest::new("q").with_report_source(Some("hybrid".into()));
        let config = ConfigResolver::resolve(&granite(), &request).unwrap();
        assert_eq!(config.report_source, ReportSource::Hybrid);

        let request = ResearchRequest::new("q").with_report_source(Some("intranet".into()));
        assert!(ConfigResolver::resolve(&granite(), &request).is_err());
    }

    #[test]
    fn redacted_env_masks_api_key() {
        let config = ConfigResolver::resolve(&granite(), &ResearchRequest::new("q")).unwrap();
        let vars = config.redacted_env_vars();
        assert_eq!(env_value(&vars, "OPENAI_API_KEY"), Some("[REDACTED]"));
        assert_eq!(env_value(&config.env_vars(), "OPENAI_API_KEY"), Some("dummy"));
    }
}
