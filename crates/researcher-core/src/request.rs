use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw document content supplied with a request as the evidence corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(alias = "raw_content")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "url")]
    pub source: Option<String>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// One research invocation as received from a hosting protocol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchRequest {
    pub query: String,
    pub documents: Option<Vec<Document>>,
    pub report_type: Option<String>,
    pub tone: Option<String>,
    pub report_source: Option<String>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_documents(mut self, documents: Option<Vec<Document>>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_report_type(mut self, report_type: Option<String>) -> Self {
        self.report_type = report_type;
        self
    }

    pub fn with_tone(mut self, tone: Option<String>) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_report_source(mut self, report_source: Option<String>) -> Self {
        self.report_source = report_source;
        self
    }

    /// True when at least one document was attached.
    pub fn has_documents(&self) -> bool {
        self.documents
            .as_ref()
            .is_some_and(|documents| !documents.is_empty())
    }
}

/// Trace line forwarded by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl LogRecord {
    pub fn new(message: impl Into<String>, metadata: Option<Value>) -> Self {
        Self {
            message: message.into(),
            metadata,
        }
    }
}

/// Accumulated outcome of one run: report text plus the ordered trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub text: String,
    pub logs: Vec<LogRecord>,
}

impl ResearchResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.logs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_accept_engine_field_names() {
        let doc: Document =
            serde_json::from_str(r#"{"raw_content": "tariff data", "url": "file://t.csv"}"#)
                .unwrap();
        assert_eq!(doc.content, "tariff data");
        assert_eq!(doc.source.as_deref(), Some("file://t.csv"));
    }

    #[test]
    fn empty_document_list_counts_as_absent() {
        let request = ResearchRequest::new("impact of tariffs").with_documents(Some(Vec::new()));
        assert!(!request.has_documents());
        let request = request.with_documents(Some(vec![Document::new("notes")]));
        assert!(request.has_documents());
    }
}
