use pagegist_core::ChatBackend;
use std::sync::Arc;

/// Slice from the first `{` to the last `}` when `reply` is not valid JSON as-is.
///
/// This only handles replies wrapped in prose or code fences. Anything else is returned
/// untouched and left for the caller's parse to reject.
pub fn lenient_json_slice(reply: &str) -> &str {
    if serde_json::from_str::<serde_json::Value>(reply).is_ok() {
        return reply;
    }
    match (reply.find('{'), reply.rfind('}')) {
        (Some(left), Some(right)) if left <= right => &reply[left..=right],
        _ => reply,
    }
}

/// Single-turn summarization over a [`ChatBackend`] with a bounded number of attempts.
///
/// Never errors: once every attempt has failed (or come back empty) the reply is `""`.
/// Whether a reply is good enough is the caller's call.
#[derive(Clone)]
pub struct Summarizer {
    backend: Arc<dyn ChatBackend>,
    attempts: usize,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn ChatBackend>, attempts: usize) -> Self {
        Self {
            backend,
            attempts: attempts.max(1),
        }
    }

    pub async fn summarize(&self, prompt: &str) -> String {
        for attempt in 1..=self.attempts {
            match self.backend.complete(prompt).await {
                Ok(content) if !content.is_empty() => {
                    return lenient_json_slice(&content).to_string();
                }
                Ok(_) => {
                    tracing::debug!(attempt, "summarizer returned an empty reply");
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts = self.attempts, error = %e, "summarizer call failed");
                }
            }
        }
        String::new()
    }
}
