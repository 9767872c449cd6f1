use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:11434/v1";
/// Sent as the bearer token when no key is configured (local endpoints ignore it).
pub const PLACEHOLDER_API_KEY: &str = "ollama";
pub const DEFAULT_SUMMARY_MODEL: &str =
    "huggingface.co/gabriellarson/Tongyi-DeepResearch-30B-A3B-GGUF";

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Everything the `visit` pipeline needs, resolved once at construction.
#[derive(Debug, Clone, Serialize)]
pub struct VisitConfig {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    /// Total chat-completion attempts per summarize call.
    pub llm_attempts: usize,
    pub llm_timeout: Duration,

    /// Hard wall-clock budget for the renderer child (launch + navigation).
    pub render_deadline: Duration,
    pub navigation_timeout: Duration,
    pub node_bin: String,

    pub max_input_tokens: usize,
    /// Token window used on the final shrink-and-retry attempt.
    pub final_window_tokens: usize,
    pub shrink_factor: f64,
    pub summary_retries: usize,
    /// Replies shorter than this (in chars) count as model failure.
    pub min_reply_chars: usize,

    /// Carried for compatibility; the render path does not read it.
    pub visit_server_timeout: Duration,
    /// Legacy character cap; the token ceiling is what bounds prompts.
    pub webcontent_max_length: usize,

    pub log_dir: PathBuf,
}

impl Default for VisitConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_SUMMARY_MODEL.to_string(),
            temperature: 0.7,
            llm_attempts: 2,
            llm_timeout: Duration::from_secs(600),
            render_deadline: Duration::from_secs(120),
            navigation_timeout: Duration::from_secs(60),
            node_bin: "node".to_string(),
            max_input_tokens: 95_000,
            final_window_tokens: 25_000,
            shrink_factor: 0.7,
            summary_retries: 3,
            min_reply_chars: 10,
            visit_server_timeout: Duration::from_secs(200),
            webcontent_max_length: 150_000,
            log_dir: PathBuf::from("log"),
        }
    }
}

impl VisitConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_base: env("API_BASE").unwrap_or(d.api_base),
            api_key: env("API_KEY"),
            model: env("SUMMARY_MODEL_NAME").unwrap_or(d.model),
            llm_timeout: Duration::from_millis(env_u64(
                "PAGEGIST_LLM_TIMEOUT_MS",
                d.llm_timeout.as_millis() as u64,
            )),
            render_deadline: Duration::from_millis(env_u64(
                "PAGEGIST_RENDER_DEADLINE_MS",
                d.render_deadline.as_millis() as u64,
            )),
            node_bin: env("PAGEGIST_NODE").unwrap_or(d.node_bin),
            visit_server_timeout: Duration::from_secs(env_u64(
                "VISIT_SERVER_TIMEOUT",
                d.visit_server_timeout.as_secs(),
            )),
            webcontent_max_length: env_usize("WEBCONTENT_MAXLENGTH", d.webcontent_max_length),
            log_dir: env("PAGEGIST_LOG_DIR").map(PathBuf::from).unwrap_or(d.log_dir),
            ..d
        }
    }

    /// The bearer token actually sent.
    pub fn effective_api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or(PLACEHOLDER_API_KEY)
    }
}
