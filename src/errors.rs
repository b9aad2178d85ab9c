use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("No LLM provider configured")]
    NoProviderConfigured,

    #[error("Completion stream timed out after {0}s")]
    StreamTimeout(u64),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepChatError {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RepChatError>;
