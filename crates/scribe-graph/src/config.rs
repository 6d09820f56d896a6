use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Which OpenAI-compatible service the chat model talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// api.openai.com.
    OpenAi,
    /// OpenRouter's OpenAI-compatible gateway.
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible API with rate-limited free tier.
    Groq,
}

/// The `[model]` table: which chat model runs the planner and reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Service hosting the model.
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    /// Provider's model name.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Empty means "read `OPENAI_API_KEY` at startup".
    #[serde(default)]
    pub api_key: String,
    /// Overrides the provider's default endpoint.
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Reporter turns allowed before a run gives up on tool use.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Retries for requests that fail before streaming; none when unset.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_provider() -> LlmProvider {
    LlmProvider::OpenAi
}

fn default_model_id() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_turns() -> u32 {
    8
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: String::new(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_turns: default_max_turns(),
            retry_policy: None,
        }
    }
}

impl ModelConfig {
    /// The endpoint requests go to.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
            }
        }
    }
}

/// The `[search]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Overrides the DuckDuckGo endpoint.
    pub api_base_url: Option<String>,
    /// Hits kept per subject.
    #[serde(default = "default_num_results")]
    pub num_results: usize,
}

fn default_num_results() -> usize {
    3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            num_results: default_num_results(),
        }
    }
}

impl SearchConfig {
    /// The endpoint searches go to.
    pub fn base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or("https://api.duckduckgo.com")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_model_defaults_from_empty_table() {
        let config: ModelConfig = from_json("{}");
        assert_eq!(config.provider, LlmProvider::OpenAi);
        assert_eq!(config.model_id, "gpt-4o-mini");
        assert!(config.api_key.is_empty());
        assert_eq!(config.base_url(), "https://api.openai.com");
    }

    #[test]
    fn test_provider_base_urls() {
        let mut config = ModelConfig {
            provider: LlmProvider::Groq,
            ..ModelConfig::default()
        };
        assert_eq!(config.base_url(), "https://api.groq.com/openai");
        config.provider = LlmProvider::OpenRouter;
        assert_eq!(config.base_url(), "https://openrouter.ai/api");
        config.api_base_url = Some("http://localhost:9999".into());
        assert_eq!(config.base_url(), "http://localhost:9999");
    }

    #[test]
    fn test_search_defaults() {
        let config: SearchConfig = from_json("{}");
        assert_eq!(config.num_results, 3);
        assert_eq!(config.base_url(), "https://api.duckduckgo.com");
    }

    fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> T {
        serde_json::from_str(json).unwrap()
    }
}
