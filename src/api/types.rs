//! API request and response types

use serde::Deserialize;
use serde::Serialize;

use crate::adapters::CacheStats;
use crate::models::ChatMessage;
use crate::models::Source;

/// Standard API response wrapper for non-streaming endpoints
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub provider: Option<&'static str>,
    pub search_cache: CacheStats,
}

/// Chat request. The last user message in `messages` is the active query;
/// earlier messages are conversation history.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub chatbot_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_true")]
    pub use_web_search: bool,
}

fn default_true() -> bool {
    true
}

/// Per-source toggles on the company-aware endpoint
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CapabilityFlags {
    #[serde(default = "default_true")]
    pub documents: bool,
    #[serde(default = "default_true")]
    pub web: bool,
    #[serde(default = "default_true")]
    pub memory: bool,
}

impl Default for CapabilityFlags {
    fn default() -> Self {
        Self {
            documents: true,
            web: true,
            memory: true,
        }
    }
}

/// Company-aware chat request. `company_data` may be a JSON object or free
/// prose; structured fields are lifted out when parseable.
#[derive(Debug, Deserialize)]
pub struct CompanyAwareChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_data: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub chatbot_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub capabilities: CapabilityFlags,
}

/// Body of a 429 response
#[derive(Debug, Serialize)]
pub struct RateLimitBody {
    pub error: String,
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the current window resets
    pub reset: u64,
}

/// Non-streaming completion response
#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}
