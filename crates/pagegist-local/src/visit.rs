use pagegist_core::{
    Capability, ChatBackend, FinalResult, RenderOutcome, Renderer, Result, RetrievalRequest,
    EMPTY_CONTENT_MARKER, INVALID_VISIT_REQUEST,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::VisitConfig;
use crate::controller::{Controller, Digest};
use crate::extract::html_to_text;
use crate::openai_compat::OpenAiCompatClient;
use crate::render_playwright::PlaywrightRenderer;
use crate::summarize::Summarizer;
use crate::truncate::TokenBudget;

/// Retrieve one page and summarize it for a goal.
///
/// render → extract → truncate → (summarize → evaluate)* → format, strictly in order. Each
/// call owns its renderer process, buffers and counters; nothing is shared across calls.
pub struct Visit {
    renderer: Arc<dyn Renderer>,
    controller: Controller,
    log_dir: PathBuf,
}

impl Visit {
    pub fn new(
        cfg: &VisitConfig,
        renderer: Arc<dyn Renderer>,
        backend: Arc<dyn ChatBackend>,
    ) -> Result<Self> {
        let summarizer = Summarizer::new(backend, cfg.llm_attempts);
        let controller = Controller::new(summarizer, TokenBudget::cl100k()?, cfg);
        Ok(Self {
            renderer,
            controller,
            log_dir: cfg.log_dir.clone(),
        })
    }

    /// Playwright child-process renderer plus an OpenAI-compatible endpoint.
    pub fn from_config(cfg: &VisitConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| pagegist_core::Error::NotConfigured(e.to_string()))?;
        Self::new(
            cfg,
            Arc::new(PlaywrightRenderer::from_config(cfg)),
            Arc::new(OpenAiCompatClient::from_config(client, cfg)),
        )
    }

    fn ensure_log_dir(&self) {
        if let Err(e) = std::fs::create_dir_all(&self.log_dir) {
            tracing::warn!(dir = %self.log_dir.display(), error = %e, "could not create log directory");
        }
    }

    /// Full pipeline; the digest is `None` when rendering failed before any summarization.
    pub async fn run(&self, req: &RetrievalRequest) -> (FinalResult, Option<Digest>) {
        self.ensure_log_dir();

        let html = match self.renderer.render(&req.url).await {
            RenderOutcome::Success { html } => html,
            RenderOutcome::Failure { reason } => {
                tracing::info!(url = %req.url, %reason, "page could not be rendered");
                return (FinalResult::failure(req), None);
            }
            RenderOutcome::Timeout => {
                tracing::info!(url = %req.url, "page render timed out");
                return (FinalResult::failure(req), None);
            }
        };

        let mut text = html_to_text(&html);
        if text.is_empty() {
            text = EMPTY_CONTENT_MARKER.to_string();
        }

        let digest = self.controller.summarize_with_goal(req, &text).await;
        tracing::info!(
            url = %req.url,
            success = digest.result.is_success(),
            calls = digest.attempts.len(),
            "visit finished"
        );
        (digest.result.clone(), Some(digest))
    }

    /// Always returns the formatted three-section text.
    pub async fn visit(&self, req: &RetrievalRequest) -> String {
        let (result, _) = self.run(req).await;
        result.format().trim().to_string()
    }
}

/// `visit` exposed as a capability with a JSON-schema parameter contract.
pub struct VisitCapability {
    visit: Visit,
}

impl VisitCapability {
    pub fn new(visit: Visit) -> Self {
        Self { visit }
    }
}

#[async_trait::async_trait]
impl Capability for VisitCapability {
    fn name(&self) -> &'static str {
        "visit"
    }

    fn description(&self) -> &'static str {
        "Visit a webpage and return a summary of its content."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL of the webpage to visit."
                },
                "goal": {
                    "type": "string",
                    "description": "The goal of the visit for the webpage."
                }
            },
            "required": ["url", "goal"]
        })
    }

    async fn invoke(&self, params: serde_json::Value) -> String {
        // Some agents send the arguments as a JSON-encoded string.
        let params = match params {
            serde_json::Value::String(s) => {
                serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))
            }
            other => other,
        };
        match RetrievalRequest::from_params(&params) {
            Ok(req) => self.visit.visit(&req).await,
            Err(e) => {
                tracing::debug!(error = %e, "rejected visit params");
                INVALID_VISIT_REQUEST.to_string()
            }
        }
    }
}

/// Explicit name → capability map, built once at startup.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: BTreeMap<&'static str, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every capability this crate provides.
    pub fn with_defaults(cfg: &VisitConfig) -> Result<Self> {
        let mut reg = Self::new();
        reg.register(Arc::new(VisitCapability::new(Visit::from_config(cfg)?)));
        Ok(reg)
    }

    /// Replaces any capability already registered under the same name.
    pub fn register(&mut self, tool: Arc<dyn Capability>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// `[{name, description, parameters}]`, sorted by name.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.tools
                .values()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters(),
                    })
                })
                .collect(),
        )
    }

    pub async fn invoke(&self, name: &str, params: serde_json::Value) -> String {
        match self.get(name) {
            Some(tool) => tool.invoke(params).await,
            None => format!("[pagegist] Unknown capability: {name}"),
        }
    }
}
