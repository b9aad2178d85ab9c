//! Gemini streaming chat client

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

pub struct GeminiProvider {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: usize,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            client: Client::new(),
        }
    }

    /// Gemini separates the system instruction from the turn contents and
    /// names the assistant role "model"
    fn build_request(messages: &[ChatMessage], options: &CompletionOptions) -> GenerateRequest {
        let system_instruction = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| Content {
                role: None,
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            });

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GenerateRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            },
        }
    }

    fn delta_from_data(data: &str) -> Option<String> {
        let chunk: StreamChunk = serde_json::from_str(data).ok()?;
        let text = chunk
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<String>();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<StreamingResponse> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.endpoint, self.model, self.api_key
        );
        debug!("Dispatching streaming completion to gemini model {}", self.model);

        let request = Self::build_request(messages, options);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RepChatError::provider("gemini", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RepChatError::provider(
                "gemini",
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
                        yield Err(RepChatError::provider("gemini", e.to_string()));
                        return;
                    }
                };
                lines.push(&chunk);

                while let Some(line) = lines.next_line() {
                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Some(text) = GeminiProvider::delta_from_data(data) {
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
    fn system_message_becomes_instruction() {
        let messages = vec![
            ChatMessage::system("You are helpful."),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let request = GeminiProvider::build_request(&messages, &CompletionOptions::default());
        assert!(request.system_instruction.is_some());
        assert_eq!(request.contents.len(), 2);
        assert_eq!(request.contents[0].role.as_deref(), Some("user"));
        assert_eq!(request.contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn delta_parsing_joins_parts() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        assert_eq!(GeminiProvider::delta_from_data(data).as_deref(), Some("Hello"));
        assert!(GeminiProvider::delta_from_data(r#"{"candidates":[]}"#).is_none());
    }
}
