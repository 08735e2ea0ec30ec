//! Enumerated report options understood by the research engine.
//!
//! Values coming from the environment or from a request are parsed here and
//! rejected with [`ResearcherError::InvalidConfigValue`] when they are not one
//! of the legal values; nothing is coerced to a default behind the caller's back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ResearcherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    ResearchReport,
    ResourceReport,
    OutlineReport,
    CustomReport,
    DetailedReport,
    SubtopicReport,
    Deep,
}

impl ReportType {
    pub const ALL: [ReportType; 7] = [
        ReportType::ResearchReport,
        ReportType::ResourceReport,
        ReportType::OutlineReport,
        ReportType::CustomReport,
        ReportType::DetailedReport,
        ReportType::SubtopicReport,
        ReportType::Deep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::ResearchReport => "research_report",
            ReportType::ResourceReport => "resource_report",
            ReportType::OutlineReport => "outline_report",
            ReportType::CustomReport => "custom_report",
            ReportType::DetailedReport => "detailed_report",
            ReportType::SubtopicReport => "subtopic_report",
            ReportType::Deep => "deep",
        }
    }

    pub fn legal_values() -> Vec<&'static str> {
        Self::ALL.iter().map(ReportType::as_str).collect()
    }
}

impl FromStr for ReportType {
    type Err = ResearcherError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| ResearcherError::invalid_value("report_type", value, Self::legal_values()))
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Objective,
    Formal,
    Analytical,
    Persuasive,
    Informative,
    Explanatory,
    Descriptive,
    Critical,
    Comparative,
    Speculative,
    Reflective,
    Narrative,
    Humorous,
    Optimistic,
    Pessimistic,
}

impl Tone {
    pub const ALL: [Tone; 15] = [
        Tone::Objective,
        Tone::Formal,
        Tone::Analytical,
        Tone::Persuasive,
        Tone::Informative,
        Tone::Explanatory,
        Tone::Descriptive,
        Tone::Critical,
        Tone::Comparative,
        Tone::Speculative,
        Tone::Reflective,
        Tone::Narrative,
        Tone::Humorous,
        Tone::Optimistic,
        Tone::Pessimistic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Objective => "objective",
            Tone::Formal => "formal",
            Tone::Analytical => "analytical",
            Tone::Persuasive => "persuasive",
            Tone::Informative => "informative",
            Tone::Explanatory => "explanatory",
            Tone::Descriptive => "descriptive",
            Tone::Critical => "critical",
            Tone::Comparative => "comparative",
            Tone::Speculative => "speculative",
            Tone::Reflective => "reflective",
            Tone::Narrative => "narrative",
            Tone::Humorous => "humorous",
            Tone::Optimistic => "optimistic",
            Tone::Pessimistic => "pessimistic",
        }
    }

    /// The descriptive value the engine uses for this tone in its prompts.
    pub fn description(&self) -> &'static str {
        match self {
            Tone::Objective => "Objective (impartial and unbiased presentation of facts and findings)",
            Tone::Formal => "Formal (adheres to academic standards with sophisticated language and structure)",
            Tone::Analytical => "Analytical (critical evaluation and detailed examination of data and theories)",
            Tone::Persuasive => "Persuasive (convincing the audience of a particular viewpoint or argument)",
            Tone::Informative => "Informative (providing clear and comprehensive information on a topic)",
            Tone::Explanatory => "Explanatory (clarifying complex concepts and processes)",
            Tone::Descriptive => "Descriptive (detailed depiction of phenomena, experiments, or case studies)",
            Tone::Critical => "Critical (judging the validity and relevance of the research and its conclusions)",
            Tone::Comparative => "Comparative (juxtaposing different theories, data, or methods to highlight differences and similarities)",
            Tone::Speculative => "Speculative (exploring hypotheses and potential implications or future research directions)",
            Tone::Reflective => "Reflective (considering the research process and personal insights or experiences)",
            Tone::Narrative => "Narrative (telling a story to illustrate research findings or methodologies)",
            Tone::Humorous => "Humorous (light-hearted and engaging, usually to make the content more relatable)",
            Tone::Optimistic => "Optimistic (highlighting positive findings and potential benefits)",
            Tone::Pessimistic => "Pessimistic (focusing on limitations, challenges, or negative outcomes)",
        }
    }

    pub fn legal_values() -> Vec<&'static str> {
        Self::ALL.iter().map(Tone::as_str).collect()
    }
}

impl FromStr for Tone {
    type Err = ResearcherError;

    /// Accepts the tone name (any case) or the engine's full descriptive value.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| {
                candidate.as_str().eq_ignore_ascii_case(value) || candidate.description() == value
            })
            .ok_or_else(|| ResearcherError::invalid_value("tone", value, Self::legal_values()))
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the engine gathers its evidence from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    #[default]
    Web,
    Local,
    Hybrid,
}

impl ReportSource {
    pub const ALL: [ReportSource; 3] = [ReportSource::Web, ReportSource::Local, ReportSource::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportSource::Web => "web",
            ReportSource::Local => "local",
            ReportSource::Hybrid => "hybrid",
        }
    }

    pub fn legal_values() -> Vec<&'static str> {
        Self::ALL.iter().map(ReportSource::as_str).collect()
    }
}

impl FromStr for ReportSource {
    type Err = ResearcherError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| {
                ResearcherError::invalid_value("report_source", value, Self::legal_values())
            })
    }
}

impl fmt::Display for ReportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named set of prompt templates selected from the smart model in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptFamily {
    Default,
    Granite,
}

impl PromptFamily {
    /// Families recognised by a marker inside a model identifier.
    const MARKED: [PromptFamily; 1] = [PromptFamily::Granite];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptFamily::Default => "default",
            PromptFamily::Granite => "granite",
        }
    }

    /// Case-insensitive substring match of a family marker in `model`.
    pub fn detect(model: &str) -> Option<Self> {
        let lowered = model.to_ascii_lowercase();
        Self::MARKED
            .into_iter()
            .find(|family| lowered.contains(family.as_str()))
    }
}

impl fmt::Display for PromptFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
