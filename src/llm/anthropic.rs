//! Anthropic streaming messages client

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
use crate::models::Role;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<EventDelta>,
}

#[derive(Deserialize)]
struct EventDelta {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            endpoint: "https://api.anthropic.com/v1".to_string(),
            client: Client::new(),
        }
    }

    fn delta_from_data(data: &str) -> Option<String> {
        let event: StreamEvent = serde_json::from_str(data).ok()?;
        if event.event_type != "content_block_delta" {
            return None;
        }
        event.delta?.text.filter(|t| !t.is_empty())
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<StreamingResponse> {
        let url = format!("{}/messages", self.endpoint);
        debug!("Dispatching streaming completion to anthropic model {}", self.model);

        // The messages API takes the system prompt as a top-level field
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str());
        let turns: Vec<ApiMessage> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: &m.content,
            })
            .collect();

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system,
            messages: turns,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| RepChatError::provider("anthropic", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RepChatError::provider(
                "anthropic",
                format!("API error ({status}): {error_text}"),
            ));
        }

        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = LineBuffer::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(RepChatError::provider("anthropic", e.to_string()));
                        return;
                    }
                };
                lines.push(&chunk);

                while let Some(line) = lines.next_line() {
                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Some(text) = AnthropicProvider::delta_from_data(data) {
                            yield Ok(text);
                        }
                    }
                }
            }
        };

        Ok(StreamingResponse::new(Box::pin(stream)))
    }
}
