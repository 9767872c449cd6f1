//! Degrade-and-retry summarization policy.
//!
//! The model is asked once with the full (token-bounded) page. While the reply is too short
//! to be an answer, the content window shrinks to 70% of its characters and the model is
//! asked again; the last retry uses a fixed token window instead. The loop therefore makes at
//! most `1 + summary_retries` calls whatever the endpoint does.

use pagegist_core::{FinalResult, RetrievalRequest, SummaryAttempt, SummaryFields};

use crate::config::VisitConfig;
use crate::prompt::render_prompt;
use crate::summarize::Summarizer;
use crate::truncate::{shrink_chars, TokenBudget};

/// Final result plus the attempts that produced it.
#[derive(Debug, Clone)]
pub struct Digest {
    pub result: FinalResult,
    pub attempts: Vec<SummaryAttempt>,
}

fn field_text(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> String {
    match obj.get(key) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Strip code fences and parse the reply as an object; missing fields read as `""`.
pub fn parse_reply(reply: &str) -> Option<SummaryFields> {
    let cleaned = reply.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    let v: serde_json::Value = serde_json::from_str(cleaned).ok()?;
    let obj = v.as_object()?;
    Some(SummaryFields {
        rational: obj
            .get("rational")
            .map(|_| field_text(obj, "rational"))
            .filter(|s| !s.is_empty()),
        evidence: field_text(obj, "evidence"),
        summary: field_text(obj, "summary"),
    })
}

pub struct Controller {
    summarizer: Summarizer,
    tokens: TokenBudget,
    max_input_tokens: usize,
    final_window_tokens: usize,
    shrink_factor: f64,
    summary_retries: usize,
    min_reply_chars: usize,
}

impl Controller {
    pub fn new(summarizer: Summarizer, tokens: TokenBudget, cfg: &VisitConfig) -> Self {
        Self {
            summarizer,
            tokens,
            max_input_tokens: cfg.max_input_tokens,
            final_window_tokens: cfg.final_window_tokens,
            shrink_factor: cfg.shrink_factor,
            summary_retries: cfg.summary_retries,
            min_reply_chars: cfg.min_reply_chars,
        }
    }

    async fn attempt(
        &self,
        content: &str,
        goal: &str,
        attempts: &mut Vec<SummaryAttempt>,
    ) -> String {
        let reply = self
            .summarizer
            .summarize(&render_prompt(content, goal))
            .await;
        attempts.push(SummaryAttempt {
            parsed: parse_reply(&reply),
            raw_reply: reply.clone(),
            content_chars: content.chars().count(),
            content_tokens: self.tokens.count(content),
        });
        reply
    }

    fn too_short(&self, reply: &str) -> bool {
        reply.chars().count() < self.min_reply_chars
    }

    pub async fn summarize_with_goal(&self, req: &RetrievalRequest, extracted: &str) -> Digest {
        let mut attempts = Vec::new();
        let mut content = self.tokens.truncate(extracted, self.max_input_tokens);
        let mut reply = self.attempt(&content, &req.goal, &mut attempts).await;

        let mut retries_left = self.summary_retries;
        while self.too_short(&reply) && retries_left > 0 {
            retries_left -= 1;
            content = if retries_left > 0 {
                shrink_chars(&content, self.shrink_factor)
            } else {
                self.tokens.truncate(&content, self.final_window_tokens)
            };
            tracing::info!(
                url = %req.url,
                reply_chars = reply.chars().count(),
                retries_left,
                content_chars = content.chars().count(),
                "summary reply too short; retrying with a smaller window"
            );
            reply = self.attempt(&content, &req.goal, &mut attempts).await;
        }

        let parsed = attempts.last().and_then(|a| a.parsed.clone());
        let result = match parsed {
            Some(fields) => FinalResult::success(req, fields),
            None => {
                tracing::warn!(
                    url = %req.url,
                    calls = attempts.len(),
                    reply_chars = reply.chars().count(),
                    "no usable summary from the model"
                );
                FinalResult::failure(req)
            }
        };
        Digest { result, attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::testing::*;
    use std::sync::Arc;

    fn controller(backend: Arc<ScriptedBackend>, cfg: &VisitConfig) -> Controller {
        Controller::new(
            Summarizer::new(backend, cfg.llm_attempts),
            TokenBudget::cl100k().unwrap(),
            cfg,
        )
    }

    fn req() -> RetrievalRequest {
        RetrievalRequest::new("https://www.alibaba.com", "company description")
    }

    #[test]
    fn parse_reply_strips_fences_and_defaults_missing_fields() {
        let f = parse_reply("```json\n{\"evidence\":\"x\",\"summary\":\"y\"}\n```").unwrap();
        assert_eq!(f.evidence, "x");
        assert_eq!(f.summary, "y");
        assert_eq!(f.rational, None);

        let f = parse_reply(r#"{"summary":"only"}"#).unwrap();
        assert_eq!(f.evidence, "");
        assert_eq!(f.summary, "only");

        let f = parse_reply(r#"{"rational":"r","evidence":["a","b"],"summary":null}"#).unwrap();
        assert_eq!(f.rational.as_deref(), Some("r"));
        assert_eq!(f.evidence, r#"["a","b"]"#);
        assert_eq!(f.summary, "");
    }

    #[test]
    fn parse_reply_rejects_non_objects_and_prose() {
        assert_eq!(parse_reply(""), None);
        assert_eq!(parse_reply("I could not find anything."), None);
        assert_eq!(parse_reply("[1, 2, 3]"), None);
    }

    #[tokio::test]
    async fn happy_path_uses_one_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            r#"{"evidence":"Alibaba is a technology company.","summary":"Alibaba: a technology company."}"#
                .to_string(),
        )]));
        let cfg = VisitConfig::default();
        let d = controller(backend.clone(), &cfg)
            .summarize_with_goal(&req(), "Alibaba is a technology company.")
            .await;
        assert_eq!(backend.calls(), 1);
        let text = d.result.format();
        assert!(text.contains("Evidence in page:\nAlibaba is a technology company."));
        assert!(text.contains("Summary:\nAlibaba: a technology company."));
    }

    #[tokio::test]
    async fn fenced_reply_is_parsed_after_fence_stripping() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            "```json\n{\"evidence\":\"x\",\"summary\":\"y\"}\n```".to_string(),
        )]));
        let d = controller(backend.clone(), &VisitConfig::default())
            .summarize_with_goal(&req(), "page text")
            .await;
        assert_eq!(
            d.result,
            FinalResult::Success {
                url: "https://www.alibaba.com".to_string(),
                goal: "company description".to_string(),
                evidence: "x".to_string(),
                summary: "y".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn persistent_short_replies_stop_after_four_calls_with_final_window() {
        let backend = Arc::new(ScriptedBackend::always("ok"));
        let cfg = VisitConfig::default();
        // Comfortably above the 95k ceiling so every window is exercised.
        let page = "word ".repeat(120_000);
        let d = controller(backend.clone(), &cfg)
            .summarize_with_goal(&req(), &page)
            .await;

        assert_eq!(backend.calls(), 4);
        assert_eq!(d.attempts.len(), 4);
        assert!(!d.result.is_success());
        assert_eq!(d.result, FinalResult::failure(&req()));

        let tokens: Vec<usize> = d.attempts.iter().map(|a| a.content_tokens).collect();
        assert!(tokens[0] <= 95_000 && tokens[0] > 94_000, "{tokens:?}");
        let chars: Vec<usize> = d.attempts.iter().map(|a| a.content_chars).collect();
        assert_eq!(chars[1], (chars[0] as f64 * 0.7).floor() as usize);
        assert_eq!(chars[2], (chars[1] as f64 * 0.7).floor() as usize);
        assert!(tokens[3] <= 25_000 && tokens[3] > 24_000, "{tokens:?}");
    }

    #[tokio::test]
    async fn endpoint_that_never_answers_still_terminates() {
        let backend = Arc::new(ScriptedBackend::with_fallback(Vec::new(), ""));
        let cfg = VisitConfig {
            max_input_tokens: 200,
            final_window_tokens: 50,
            ..VisitConfig::default()
        };
        let d = controller(backend.clone(), &cfg)
            .summarize_with_goal(&req(), &"token ".repeat(1_000))
            .await;
        // Two summarizer attempts per controller call.
        assert_eq!(d.attempts.len(), 4);
        assert_eq!(backend.calls(), 8);
        assert!(!d.result.is_success());
    }

    #[tokio::test]
    async fn short_reply_recovers_once_the_window_shrinks() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("{}".to_string()),
            Ok(r#"{"evidence":"found it","summary":"short page"}"#.to_string()),
        ]));
        let d = controller(backend.clone(), &VisitConfig::default())
            .summarize_with_goal(&req(), "some page text that is long enough to shrink")
            .await;
        assert_eq!(backend.calls(), 2);
        assert!(d.attempts[1].content_chars < d.attempts[0].content_chars);
        assert!(d.result.format().contains("Evidence in page:\nfound it"));
    }

    #[tokio::test]
    async fn long_unparsable_reply_is_a_failure_without_retry() {
        let backend = Arc::new(ScriptedBackend::always("I am unable to read this page."));
        let d = controller(backend.clone(), &VisitConfig::default())
            .summarize_with_goal(&req(), "text")
            .await;
        assert_eq!(backend.calls(), 1);
        assert_eq!(d.result, FinalResult::failure(&req()));
    }
}
