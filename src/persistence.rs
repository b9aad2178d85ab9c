//! Turn persistence
//!
//! After a turn completes, the exchange is written to long-term memory under
//! the active user and appended to durable chat history. Both writes are
//! independent and best-effort: failure of one never rolls back the other or
//! the already-delivered answer, and no failure is surfaced to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::adapters::MemoryClient;
use crate::errors::RepChatError;
use crate::errors::Result;
use crate::models::Turn;

/// Where finished turns go. Trait seam so the pipeline and the guard can be
/// tested against a recording sink.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn persist(&self, turn: Turn);
}

/// REST client for the hosted chat-history document store
pub struct HistoryClient {
    endpoint: String,
    project_id: String,
    api_key: String,
    database_id: String,
    collection: String,
    client: Client,
}

#[derive(Serialize)]
struct CreateDocumentRequest<'a> {
    #[serde(rename = "documentId")]
    document_id: &'a str,
    data: DocumentData<'a>,
}

#[derive(Serialize)]
struct DocumentData<'a> {
    query: &'a str,
    answer: &'a str,
    /// Sources serialized as JSON text, one row per turn
    sources: String,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chatbot_id: Option<&'a str>,
    incomplete: bool,
}

impl HistoryClient {
    pub fn new(
        endpoint: String,
        project_id: String,
        api_key: String,
        database_id: String,
        collection: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RepChatError::Http(e.to_string()))?;

        Ok(Self {
            endpoint,
            project_id,
            api_key,
            database_id,
            collection,
            client,
        })
    }

    pub async fn append_turn(&self, turn: &Turn) -> Result<()> {
        let url = format!(
            "{}/databases/{}/collections/{}/documents",
            self.endpoint.trim_end_matches('/'),
            self.database_id,
            self.collection
        );

        let sources_json = serde_json::to_string(&turn.sources)?;
        let request = CreateDocumentRequest {
            document_id: "unique()",
            data: DocumentData {
                query: &turn.query,
                answer: &turn.answer,
                sources: sources_json,
                timestamp: turn.timestamp.to_rfc3339(),
                user_id: turn.user_id.as_deref(),
                chatbot_id: turn.chatbot_id.as_deref(),
                incomplete: turn.incomplete,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RepChatError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(RepChatError::Persistence(format!(
                "History write failed ({status})"
            )));
        }

        Ok(())
    }
}

/// Production sink: memory write-back plus chat-history append
pub struct TurnStore {
    memory: Option<MemoryClient>,
    history: Option<HistoryClient>,
}

impl TurnStore {
    pub fn new(memory: Option<MemoryClient>, history: Option<HistoryClient>) -> Self {
        Self { memory, history }
    }
}

#[async_trait]
impl TurnSink for TurnStore {
    async fn persist(&self, turn: Turn) {
        // Memory write-back needs an owning user; anonymous turns skip it
        if let (Some(memory), Some(user_id)) = (&self.memory, turn.user_id.as_deref()) {
            if let Err(e) = memory.add_turn(&turn, user_id).await {
                warn!("Memory write-back failed (answer already delivered): {e}");
            }
        }

        if let Some(history) = &self.history {
            if let Err(e) = history.append_turn(&turn).await {
                warn!("Chat-history write failed (answer already delivered): {e}");
            }
        }

        debug!(
            "Persisted turn ({} chars, {} sources, incomplete={})",
            turn.answer.len(),
            turn.sources.len(),
            turn.incomplete
        );
    }
}

/// Accumulates the in-flight turn and applies the cancellation policy.
///
/// On normal completion `complete()` persists the turn as-is. If the guard
/// is dropped mid-stream (client cancelled, stream failed) the partial
/// answer is persisted with `incomplete: true`; an empty answer skips
/// persistence entirely.
pub struct TurnGuard {
    sink: Arc<dyn TurnSink>,
    turn: Option<Turn>,
}

impl TurnGuard {
    pub fn new(sink: Arc<dyn TurnSink>, turn: Turn) -> Self {
        Self {
            sink,
            turn: Some(turn),
        }
    }

    pub fn push_token(&mut self, token: &str) {
        if let Some(turn) = self.turn.as_mut() {
            turn.answer.push_str(token);
        }
    }

    pub fn set_sources(&mut self, sources: Vec<crate::models::Source>) {
        if let Some(turn) = self.turn.as_mut() {
            turn.sources = sources;
        }
    }

    pub fn answer(&self) -> &str {
        self.turn.as_ref().map_or("", |t| t.answer.as_str())
    }

    pub fn answer_len(&self) -> usize {
        self.turn.as_ref().map_or(0, |t| t.answer.len())
    }

    /// Persist the finished turn asynchronously; does not block the caller
    pub fn complete(mut self) {
        if let Some(turn) = self.turn.take() {
            let sink = self.sink.clone();
            tokio::spawn(async move {
                sink.persist(turn).await;
            });
        }
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let Some(mut turn) = self.turn.take() else {
            return;
        };
        // Nothing was generated; never persist a null answer
        if turn.answer.is_empty() {
            return;
        }
        turn.incomplete = true;
        let sink = self.sink.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                sink.persist(turn).await;
            });
        }
    }
}
