use pagegist_core::{ChatBackend, Error, Result};
use serde::{Deserialize, Serialize};

use crate::config::VisitConfig;

/// Minimal OpenAI-compatible `chat/completions` client (Ollama, vLLM, llama.cpp, ...).
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    timeout: std::time::Duration,
}

impl OpenAiCompatClient {
    pub fn from_config(client: reqwest::Client, cfg: &VisitConfig) -> Self {
        Self {
            client,
            base_url: cfg.api_base.clone(),
            api_key: cfg.effective_api_key().to_string(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            timeout: cfg.llm_timeout,
        }
    }

    /// `base_url` already carries the version segment (e.g. `.../v1`).
    fn endpoint_chat_completions(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub async fn chat(&self, messages: Vec<Message>) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            stream: Some(false),
        };

        let resp = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!(
                "openai_compat chat.completions HTTP {status}"
            )));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl ChatBackend for OpenAiCompatClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }])
        .await
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    // Some servers send `null` content (e.g. tool-call-only replies).
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr, api_key: Option<&str>) -> OpenAiCompatClient {
        let cfg = VisitConfig {
            api_base: format!("http://{addr}/v1/"),
            api_key: api_key.map(|s| s.to_string()),
            model: "stub-model".to_string(),
            ..VisitConfig::default()
        };
        OpenAiCompatClient::from_config(reqwest::Client::new(), &cfg)
    }

    #[tokio::test]
    async fn sends_single_turn_request_and_reads_first_choice() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let echo = format!(
                    "model={} temp={} n={} role={} auth={auth}",
                    body["model"].as_str().unwrap_or(""),
                    body["temperature"],
                    body["messages"].as_array().map(|m| m.len()).unwrap_or(0),
                    body["messages"][0]["role"].as_str().unwrap_or(""),
                );
                Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": echo}}]
                }))
            }),
        );
        let addr = serve(app).await;

        let out = client_for(addr, None).complete("hello").await.unwrap();
        assert_eq!(
            out,
            "model=stub-model temp=0.7 n=1 role=user auth=Bearer ollama"
        );

        let out = client_for(addr, Some("sk-test")).complete("hello").await.unwrap();
        assert!(out.ends_with("auth=Bearer sk-test"), "{out}");
    }

    #[tokio::test]
    async fn http_error_status_is_an_llm_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "loading model") }),
        );
        let addr = serve(app).await;
        let err = client_for(addr, None).complete("hello").await.unwrap_err();
        assert!(matches!(err, Error::Llm(ref m) if m.contains("503")), "{err}");
    }

    #[tokio::test]
    async fn null_content_reads_as_empty() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(serde_json::json!({"choices": [{"message": {"content": null}}]}))
            }),
        );
        let addr = serve(app).await;
        assert_eq!(client_for(addr, None).complete("hi").await.unwrap(), "");
    }
}
