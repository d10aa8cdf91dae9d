pub mod domain;
pub mod llm;
pub mod market;
pub mod reco;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub llm_provider: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub openai_api_key: Option<String>,
        pub ollama_url: Option<String>,
        pub ollama_model: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                llm_provider: non_empty_var("LLM_PROVIDER"),
                anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
                openai_api_key: non_empty_var("OPENAI_API_KEY"),
                ollama_url: non_empty_var("OLLAMA_URL"),
                ollama_model: non_empty_var("OLLAMA_MODEL"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                market_data_base_url: non_empty_var("MARKET_DATA_BASE_URL"),
            })
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is not set")
        }

        pub fn require_openai_api_key(&self) -> anyhow::Result<&str> {
            self.openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is not set")
        }
    }

    // Empty values in .env files count as unset.
    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
