use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub backtrace: bool,
}

/// LLM provider credentials. Each key is optional; the first configured
/// provider in the priority order OpenAI > Gemini > Groq > Anthropic is
/// selected once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_groq_model() -> String {
    "llama-3.1-70b-versatile".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

/// Hosted vector index (document RAG) connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    10
}

/// Hosted web search connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_web_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
}

fn default_web_endpoint() -> String {
    "https://api.tavily.com".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_search_depth() -> String {
    "basic".to_string()
}

/// Hosted long-term memory connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_memory_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_memory_limit")]
    pub max_snippets: usize,
}

fn default_memory_endpoint() -> String {
    "https://api.mem0.ai".to_string()
}

fn default_memory_limit() -> usize {
    5
}

/// Hosted document store used for durable chat history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_database_id")]
    pub database_id: String,
    #[serde(default = "default_messages_collection")]
    pub messages_collection: String,
}

fn default_database_id() -> String {
    "main".to_string()
}

fn default_messages_collection() -> String {
    "messages".to_string()
}

/// Redis-backed fixed-window rate limiting. Absent URL disables limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_rate_namespace")]
    pub namespace: String,
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_rate_namespace() -> String {
    "repchat:rl:".to_string()
}

fn default_max_requests() -> u64 {
    30
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            namespace: default_rate_namespace(),
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

/// Tunables for the answer-synthesis pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_entries")]
    pub cache_max_entries: usize,
}

fn default_adapter_timeout() -> u64 {
    10
}

fn default_stream_timeout() -> u64 {
    120
}

fn default_history_window() -> usize {
    5
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> usize {
    2000
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_entries() -> usize {
    2000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: default_adapter_timeout(),
            stream_timeout_secs: default_stream_timeout(),
            history_window: default_history_window(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            cache_ttl_secs: default_cache_ttl(),
            cache_max_entries: default_cache_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(crate::RepChatError::Io)?;
        let config: AppConfig = toml::from_str(&content).map_err(crate::RepChatError::TomlParsing)?;
        Ok(config)
    }

    /// Load configuration from default config file path
    pub fn load() -> crate::Result<Self> {
        // Try to load from config.toml first, then fall back to config.example.toml
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            println!(
                "Warning: Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            Err(crate::RepChatError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config file found. Please create config.toml or config.example.toml",
            )))
        }
    }

    /// Per-adapter fan-out timeout
    pub fn adapter_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.chat.adapter_timeout_secs)
    }

    /// Overall deadline for one LLM completion stream
    pub fn stream_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.chat.stream_timeout_secs)
    }

    /// Web-search cache TTL
    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.chat.cache_ttl_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                enable_cors: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                backtrace: true,
            },
            providers: ProvidersConfig {
                openai_api_key: None,
                openai_model: default_openai_model(),
                gemini_api_key: None,
                gemini_model: default_gemini_model(),
                groq_api_key: None,
                groq_model: default_groq_model(),
                anthropic_api_key: None,
                anthropic_model: default_anthropic_model(),
            },
            vector: VectorConfig::default(),
            web_search: WebSearchConfig::default(),
            memory: MemoryConfig::default(),
            history: HistoryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.chat.history_window, 5);
        assert_eq!(config.chat.cache_ttl_secs, 300);
        assert!(config.providers.openai_api_key.is_none());
        assert_eq!(config.vector.top_k, 10);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            enable_cors = false

            [logging]
            level = "debug"
            backtrace = false

            [providers]
            openai_api_key = "sk-test"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.providers.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.providers.openai_model, "gpt-4o-mini");
        assert_eq!(config.chat.adapter_timeout_secs, 10);
        assert!(config.rate_limit.redis_url.is_none());
    }
}
