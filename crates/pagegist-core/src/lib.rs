//! Backend-agnostic types and traits for `pagegist`.
//!
//! This crate contains no IO. It defines the request/outcome types that flow through the
//! retrieve-and-summarize pipeline, the traits the local implementations plug into, and the
//! fixed text template handed back to the agent loop.

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("tokenizer failed: {0}")]
    Tokenizer(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returned verbatim when a `visit` call is missing `url` or `goal`.
pub const INVALID_VISIT_REQUEST: &str = "[Visit] Invalid request format: Input must be a JSON object containing 'url' and 'goal' fields";

/// Stand-in text summarized when a page rendered but yielded no text.
pub const EMPTY_CONTENT_MARKER: &str = "[visit] Empty content.";

const FAILURE_EVIDENCE: &str =
    "The provided webpage content could not be accessed or processed. Please check the URL.";
const FAILURE_SUMMARY: &str =
    "The webpage content could not be processed, and therefore, no information is available.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub url: String,
    /// Conditions the summarization prompt only; rendering never sees it.
    pub goal: String,
}

impl RetrievalRequest {
    pub fn new(url: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            goal: goal.into(),
        }
    }

    /// Parse loosely-typed tool arguments.
    ///
    /// Agents sometimes emit `url` as a list; only the first element is used.
    pub fn from_params(params: &serde_json::Value) -> Result<Self> {
        let obj = params
            .as_object()
            .ok_or_else(|| Error::InvalidParams("params must be a JSON object".to_string()))?;
        let url = match obj.get("url") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(items)) => items
                .first()
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    Error::InvalidParams("url list must start with a string".to_string())
                })?,
            Some(_) => return Err(Error::InvalidParams("url must be a string".to_string())),
            None => return Err(Error::InvalidParams("missing url".to_string())),
        };
        let goal = match obj.get("goal") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(_) => return Err(Error::InvalidParams("goal must be a string".to_string())),
            None => return Err(Error::InvalidParams("missing goal".to_string())),
        };
        Ok(Self { url, goal })
    }
}

/// Result of one isolated page render. Produced once, consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Success { html: String },
    Failure { reason: String },
    Timeout,
}

#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Never fails: every error is folded into `RenderOutcome::Failure`/`Timeout`.
    async fn render(&self, url: &str) -> RenderOutcome;
}

/// A single-turn chat completion endpoint.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rational: Option<String>,
    pub evidence: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryAttempt {
    pub raw_reply: String,
    pub parsed: Option<SummaryFields>,
    /// Size of the content window this attempt was prompted with.
    pub content_chars: usize,
    pub content_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalResult {
    Success {
        url: String,
        goal: String,
        evidence: String,
        summary: String,
    },
    Failure {
        url: String,
        goal: String,
    },
}

impl FinalResult {
    pub fn success(req: &RetrievalRequest, fields: SummaryFields) -> Self {
        Self::Success {
            url: req.url.clone(),
            goal: req.goal.clone(),
            evidence: fields.evidence,
            summary: fields.summary,
        }
    }

    pub fn failure(req: &RetrievalRequest) -> Self {
        Self::Failure {
            url: req.url.clone(),
            goal: req.goal.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Render the fixed three-section text the agent loop consumes.
    pub fn format(&self) -> String {
        let (url, goal, evidence, summary) = match self {
            Self::Success {
                url,
                goal,
                evidence,
                summary,
            } => (url, goal, evidence.as_str(), summary.as_str()),
            Self::Failure { url, goal } => (url, goal, FAILURE_EVIDENCE, FAILURE_SUMMARY),
        };
        format!(
            "The useful information in {url} for user goal {goal} as follows:\n\n\
             Evidence in page:\n{evidence}\n\n\
             Summary:\n{summary}"
        )
    }
}

impl std::fmt::Display for FinalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

/// A named operation exposed to a reasoning loop.
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the accepted parameters.
    fn parameters(&self) -> serde_json::Value;
    /// Always returns text; argument errors are reported in-band.
    async fn invoke(&self, params: serde_json::Value) -> String;
}
