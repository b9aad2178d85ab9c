//! LLM provider abstraction
//!
//! One `LlmProvider` capability interface with a closed set of implementors.
//! The active provider is chosen once at startup by static priority
//! OpenAI > Gemini > Groq > Anthropic: the first configured credential wins
//! and there is no runtime fallback mid-request.

pub mod anthropic;
pub mod extract;
pub mod gemini;
pub mod openai;
pub mod streaming;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use streaming::StreamingResponse;
pub use streaming::TokenStream;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::ProvidersConfig;
use crate::errors::Result;
use crate::models::ChatMessage;

/// Completion sampling options
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Streaming completion capability
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Dispatch the message list and return a stream of text deltas.
    /// Exactly one system message, first in the list, is expected.
    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<StreamingResponse>;
}

/// Select the provider once from configured credentials. `None` when no
/// credential is present; every chat request then fails fast with a clear
/// configuration error.
pub fn select_provider(config: &ProvidersConfig) -> Option<Arc<dyn LlmProvider>> {
    if let Some(key) = config.openai_api_key.clone() {
        info!("LLM provider selected: openai ({})", config.openai_model);
        return Some(Arc::new(OpenAiProvider::openai(
            key,
            config.openai_model.clone(),
        )));
    }
    if let Some(key) = config.gemini_api_key.clone() {
        info!("LLM provider selected: gemini ({})", config.gemini_model);
        return Some(Arc::new(GeminiProvider::new(key, config.gemini_model.clone())));
    }
    if let Some(key) = config.groq_api_key.clone() {
        info!("LLM provider selected: groq ({})", config.groq_model);
        return Some(Arc::new(OpenAiProvider::groq(key, config.groq_model.clone())));
    }
    if let Some(key) = config.anthropic_api_key.clone() {
        info!("LLM provider selected: anthropic ({})", config.anthropic_model);
        return Some(Arc::new(AnthropicProvider::new(
            key,
            config.anthropic_model.clone(),
        )));
    }
    None
}
