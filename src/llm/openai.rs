//! OpenAI-compatible streaming chat client
//!
//! Also serves Groq, whose API is OpenAI-compatible behind a different base
//! URL and model name.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::streaming::LineBuffer;
use super::CompletionOptions;
use super::LlmProvider;
use super::StreamingResponse;
use crate::errors::RepChatError;
use crate::errors::Result;
use crate::models::ChatMessage;

pub struct OpenAiProvider {
    name: &'static str,
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn openai(api_key: String, model: String) -> Self {
        Self::with_base_url("openai", "https://api.openai.com/v1".to_string(), api_key, model)
    }

    pub fn groq(api_key: String, model: String) -> Self {
        Self::with_base_url(
            "groq",
            "https://api.groq.com/openai/v1".to_string(),
            api_key,
            model,
        )
    }

    pub fn with_base_url(
        name: &'static str,
        base_url: String,
        api_key: String,
        model: String,
    ) -> Self {
        Self {
            name,
            base_url,
            api_key,
            model,
            client: Client::new(),
        }
    }

    /// Extract the text delta from one SSE `data:` payload
    fn delta_from_data(data: &str) -> Option<String> {
        let chunk: StreamChunk = serde_json::from_str(data).ok()?;
        chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|text| !text.is_empty())
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<StreamingResponse> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!("Dispatching streaming completion to {url}");

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RepChatError::provider(self.name, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RepChatError::provider(
                self.name,
                format!("API error ({status}): {error_text}"),
            ));
        }

        let name = self.name;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = LineBuffer::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(RepChatError::provider(name, e.to_string()));
                        return;
                    }
                };
                lines.push(&chunk);

                while let Some(line) = lines.next_line() {
                    if let Some(data) = line.strip_prefix("data: ") {
                        if data == "[DONE]" {
                            return;
                        }
                        if let Some(text) = OpenAiProvider::delta_from_data(data) {
                            yield Ok(text);
                        }
                    }
                }
            }
        };

        Ok(StreamingResponse::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_parsing_extracts_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(OpenAiProvider::delta_from_data(data).as_deref(), Some("Hi"));
    }

    #[test]
    fn empty_and_malformed_deltas_are_skipped() {
        assert!(OpenAiProvider::delta_from_data(r#"{"choices":[{"delta":{}}]}"#).is_none());
        assert!(OpenAiProvider::delta_from_data(r#"{"choices":[]}"#).is_none());
        assert!(OpenAiProvider::delta_from_data("not json").is_none());
        assert!(
            OpenAiProvider::delta_from_data(r#"{"choices":[{"delta":{"content":""}}]}"#).is_none()
        );
    }

    #[tokio::test]
    #[ignore = "Requires API key"]
    async fn live_stream_completes() {
        let provider = OpenAiProvider::openai(
            std::env::var("OPENAI_API_KEY").unwrap(),
            "gpt-4o-mini".to_string(),
        );
        let messages = vec![ChatMessage::user("Say hello in one word.")];
        let response = provider
            .stream_complete(&messages, &CompletionOptions::default())
            .await
            .unwrap();
        let text = response.collect_all().await.unwrap();
        assert!(!text.is_empty());
    }
}
