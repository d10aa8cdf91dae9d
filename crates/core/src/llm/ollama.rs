use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{ChatMessage, LlmClient, Provider, Role};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1:8b-instruct";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Local model served by Ollama. No credentials required.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings
            .ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let model = settings
            .ollama_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout_secs = std::env::var("OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    // Ollama gets the system prompt as a leading user turn.
    fn to_messages<'a>(system: &'a str, messages: &'a [ChatMessage]) -> Vec<Message<'a>> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if !system.trim().is_empty() {
            out.push(Message {
                role: "user",
                content: system,
            });
        }
        out.extend(messages.iter().map(|m| Message {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        }));
        out
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn chat(&self, system: &str, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let req = ChatRequest {
            model: &self.model,
            messages: Self::to_messages(system, messages),
            stream: false,
        };

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .context("Ollama request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Ollama response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError::http(Provider::Ollama, status, text).into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Ollama response JSON: {text}"))?;
        let parsed = serde_json::from_value::<ChatResponse>(raw_json.clone())
            .context("failed to decode Ollama response into ChatResponse")?;

        match parsed.message.map(|m| m.content) {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(LlmDiagnosticsError::empty_reply(Provider::Ollama, raw_json).into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn folds_system_prompt_into_leading_user_turn() {
        let msgs = vec![ChatMessage::user("what about chips?")];
        let req = ChatRequest {
            model: DEFAULT_MODEL,
            messages: OllamaClient::to_messages("persona", &msgs),
            stream: false,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v["messages"],
            json!([
                {"role": "user", "content": "persona"},
                {"role": "user", "content": "what about chips?"}
            ])
        );
        assert_eq!(v["stream"], json!(false));
    }

    #[test]
    fn parses_non_streaming_reply() {
        let res: ChatResponse = serde_json::from_value(json!({
            "model": "llama3.1:8b-instruct",
            "message": {"role": "assistant", "content": "hello"},
            "done": true
        }))
        .unwrap();
        assert_eq!(res.message.unwrap().content, "hello");
    }
}
