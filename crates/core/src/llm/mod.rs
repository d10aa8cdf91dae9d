pub mod anthropic;
pub mod error;
pub mod json;
pub mod ollama;
pub mod openai;
pub mod prompt;

use crate::config::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAI,
    Ollama,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
            Provider::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAI),
            "ollama" => Ok(Provider::Ollama),
            other => anyhow::bail!("unknown LLM provider {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Sends one conversation turn and returns the full reply text.
    async fn chat(&self, system: &str, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

/// Picks the backend once at startup. An explicit `LLM_PROVIDER` wins;
/// otherwise the first provider with credentials configured is used.
pub fn select_provider(settings: &Settings) -> Provider {
    if let Some(raw) = settings.llm_provider.as_deref() {
        match raw.parse::<Provider>() {
            Ok(p) => return p,
            Err(err) => tracing::warn!(error = %err, "ignoring LLM_PROVIDER"),
        }
    }

    if settings.anthropic_api_key.is_some() {
        return Provider::Anthropic;
    }
    if settings.openai_api_key.is_some() {
        return Provider::OpenAI;
    }
    if settings.ollama_model.is_some() || settings.ollama_url.is_some() {
        return Provider::Ollama;
    }

    Provider::Anthropic
}

pub fn build_client(settings: &Settings) -> anyhow::Result<Box<dyn LlmClient>> {
    let provider = select_provider(settings);
    tracing::info!(%provider, "selected LLM provider");
    Ok(match provider {
        Provider::Anthropic => Box::new(anthropic::AnthropicClient::from_settings(settings)?),
        Provider::OpenAI => Box::new(openai::OpenAiClient::from_settings(settings)?),
        Provider::Ollama => Box::new(ollama::OllamaClient::from_settings(settings)?),
    })
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Returns a canned reply and records the prompts it was given.
    #[derive(Debug, Default)]
    pub struct CannedLlm {
        pub reply: String,
        pub seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl CannedLlm {
        pub fn new(reply: impl Into<String>) -> Self {
            Self {
                reply: reply.into(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for CannedLlm {
        fn provider(&self) -> Provider {
            Provider::Ollama
        }

        async fn chat(&self, system: &str, messages: &[ChatMessage]) -> anyhow::Result<String> {
            self.seen
                .lock()
                .map_err(|_| anyhow::anyhow!("mock lock poisoned"))?
                .push((system.to_string(), messages.to_vec()));
            Ok(self.reply.clone())
        }
    }
}
