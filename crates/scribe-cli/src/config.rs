use scribe_gateway::GatewayConfig;
use scribe_graph::{
    GraphSettings, ModelConfig, SearchConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_TOPIC_CHARS,
};
use scribe_protocol::TranslatorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct ScribeConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    /// Directory holding `planner.md` / `reporter.md` overrides.
    pub prompts_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_topic_chars")]
    pub max_topic_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            max_topic_chars: default_max_topic_chars(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamConfig {
    #[serde(flatten)]
    pub translator: TranslatorConfig,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            translator: TranslatorConfig::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}
fn default_max_topic_chars() -> usize {
    DEFAULT_MAX_TOPIC_CHARS
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl ScribeConfig {
    /// Reads `path`, or falls back to defaults when it does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Fills settings the environment provides: `OPENAI_API_KEY` when no key
    /// is configured, and `ORIGIN_FRONT` replacing the allowed origins.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.model.api_key.is_empty() {
            if let Some(key) = var("OPENAI_API_KEY") {
                self.model.api_key = key;
            }
        }
        if let Some(origin) = var("ORIGIN_FRONT").filter(|o| !o.trim().is_empty()) {
            self.server.allowed_origins = vec![origin.trim().to_string()];
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            allowed_origins: self.server.allowed_origins.clone(),
            max_topic_chars: self.server.max_topic_chars,
            translator: self.stream.translator.clone(),
        }
    }

    pub fn graph_settings(&self) -> GraphSettings {
        GraphSettings {
            max_turns: self.model.max_turns,
            channel_capacity: self.stream.channel_capacity,
            retry: self.model.retry_policy.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use scribe_graph::LlmProvider;
    use scribe_protocol::UsageSource;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: ScribeConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.max_topic_chars, 50);
        assert_eq!(config.stream.channel_capacity, 64);
        assert_eq!(config.stream.translator.stream_nodes, vec!["reporter"]);
        assert_eq!(config.search.num_results, 3);
        assert!(config.prompts_dir.is_none());
    }

    #[test]
    fn test_full_file() {
        let config: ScribeConfig = toml::from_str(
            r#"
            prompts_dir = "prompts"

            [model]
            provider = "groq"
            model_id = "llama-3.1-8b-instant"
            max_turns = 4

            [model.retry_policy]
            max_retries = 1
            backoff_base_ms = 10
            backoff_max_ms = 100

            [server]
            port = 9000
            allowed_origins = ["https://app.example"]

            [stream]
            stream_nodes = ["planner", "reporter"]
            emit_steps = true
            usage = "reported"
            channel_capacity = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.model.provider, LlmProvider::Groq);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.stream.translator.stream_nodes.len(), 2);
        assert!(config.stream.translator.emit_steps);
        assert_eq!(config.stream.translator.usage, UsageSource::Reported);
        assert_eq!(config.prompts_dir, Some(PathBuf::from("prompts")));

        let settings = config.graph_settings();
        assert_eq!(settings.max_turns, 4);
        assert_eq!(settings.channel_capacity, 8);
        assert_eq!(settings.retry.max_retries, 1);

        let gateway = config.gateway();
        assert_eq!(gateway.allowed_origins, vec!["https://app.example"]);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ScribeConfig::default();
        config.apply_env(|name| match name {
            "OPENAI_API_KEY" => Some("sk-env".to_string()),
            "ORIGIN_FRONT" => Some("https://front.example".to_string()),
            _ => None,
        });
        assert_eq!(config.model.api_key, "sk-env");
        assert_eq!(config.server.allowed_origins, vec!["https://front.example"]);

        let mut keyed: ScribeConfig = toml::from_str("[model]\napi_key = \"sk-file\"").unwrap();
        keyed.apply_env(|_| Some("sk-env".to_string()));
        assert_eq!(keyed.model.api_key, "sk-file");
    }
}
