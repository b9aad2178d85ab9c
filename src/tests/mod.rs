
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::adapters::FetchScope;
use crate::adapters::SourceAdapter;
use crate::errors::Result;
use crate::llm::CompletionOptions;
use crate::llm::LlmProvider;
use crate::llm::StreamingResponse;
use crate::models::ChatMessage;
use crate::models::Source;
use crate::models::Turn;
use crate::persistence::TurnSink;

/// Test adapter returning a fixed payload
pub struct FixedAdapter {
    pub name: &'static str,
    pub sources: Vec<Source>,
}

#[async_trait]
impl SourceAdapter for FixedAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _scope: &FetchScope) -> Vec<Source> {
        self.sources.clone()
    }
}

/// Test provider that replays scripted deltas and records the prompt
pub struct ScriptedProvider {
    pub tokens: Vec<String>,
    pub seen_messages: Mutex<Vec<ChatMessage>>,
}

impl ScriptedProvider {
    pub fn new(parts: &[&str]) -> Self {
        Self {
            tokens: parts.iter().map(ToString::to_string).collect(),
            seen_messages: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<StreamingResponse> {
        *self.seen_messages.lock().await = messages.to_vec();
        let tokens: Vec<Result<String>> = self.tokens.iter().cloned().map(Ok).collect();
        Ok(StreamingResponse::new(Box::pin(futures::stream::iter(
            tokens,
        ))))
    }
}

/// Test sink recording every persisted turn
#[derive(Default)]
pub struct CapturingSink {
    pub turns: Mutex<Vec<Turn>>,
}

impl CapturingSink {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TurnSink for CapturingSink {
    async fn persist(&self, turn: Turn) {
        self.turns.lock().await.push(turn);
    }
}
