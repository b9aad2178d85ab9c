//! Long-term conversational memory adapter
//!
//! Wraps a Mem0-style memory API. Reads return at most a handful of
//! snippets merged into one contextual paragraph; writes are fire-and-forget
//! from the caller's point of view.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::FetchScope;
use super::SourceAdapter;
use crate::errors::RepChatError;
use crate::errors::Result;
use crate::models::Source;
use crate::models::SourceKind;
use crate::models::Turn;

/// REST client for the hosted memory service
#[derive(Clone)]
pub struct MemoryClient {
    endpoint: String,
    api_key: String,
    client: Client,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    user_id: &'a str,
    limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryHit {
    pub memory: String,
    #[serde(default)]
    pub score: Option<f32>,
}

#[derive(Serialize)]
struct AddRequest<'a> {
    messages: Vec<AddMessage<'a>>,
    user_id: &'a str,
}

#[derive(Serialize)]
struct AddMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl MemoryClient {
    pub fn new(endpoint: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RepChatError::Http(e.to_string()))?;

        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }

    pub async fn search(&self, query: &str, user_id: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        let url = format!("{}/v1/memories/search/", self.endpoint.trim_end_matches('/'));
        debug!("Memory search for user {user_id}");

        let request = SearchRequest {
            query,
            user_id,
            limit,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RepChatError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RepChatError::Http(format!(
                "Memory search error ({status}): {error_text}"
            )));
        }

        let hits: Vec<MemoryHit> = response
            .json()
            .await
            .map_err(|e| RepChatError::Http(format!("Failed to parse memory response: {e}")))?;

        Ok(hits)
    }

    /// Record one finished exchange under the given user
    pub async fn add_turn(&self, turn: &Turn, user_id: &str) -> Result<()> {
        let url = format!("{}/v1/memories/", self.endpoint.trim_end_matches('/'));

        let request = AddRequest {
            messages: vec![
                AddMessage {
                    role: "user",
                    content: &turn.query,
                },
                AddMessage {
                    role: "assistant",
                    content: &turn.answer,
                },
            ],
            user_id,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RepChatError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(RepChatError::Http(format!("Memory add error ({status})")));
        }

        Ok(())
    }
}

/// Conversational memory as a source adapter
pub struct MemoryAdapter {
    client: MemoryClient,
    max_snippets: usize,
}

impl MemoryAdapter {
    pub fn new(client: MemoryClient, max_snippets: usize) -> Self {
        Self {
            client,
            max_snippets: max_snippets.min(5),
        }
    }

    /// Merge snippets into one contextual paragraph carried by a single source
    fn hits_to_source(hits: Vec<MemoryHit>) -> Option<Source> {
        if hits.is_empty() {
            return None;
        }
        let paragraph = hits
            .iter()
            .map(|h| h.memory.trim())
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if paragraph.is_empty() {
            return None;
        }
        Some(Source::new(
            "Conversation memory",
            "#memory",
            paragraph,
            SourceKind::Memory,
        ))
    }
}

#[async_trait]
impl SourceAdapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, scope: &FetchScope) -> Vec<Source> {
        // Memory is per-user; anonymous turns skip the call entirely
        let Some(user_id) = scope.user_id.as_deref().filter(|u| !u.is_empty()) else {
            return Vec::new();
        };

        match self
            .client
            .search(&scope.query, user_id, self.max_snippets)
            .await
        {
            Ok(hits) => Self::hits_to_source(hits).into_iter().collect(),
            Err(e) => {
                warn!("Memory search failed, continuing without memory: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippets_merge_into_one_paragraph() {
        let hits = vec![
            MemoryHit {
                memory: "User prefers concise answers.".to_string(),
                score: Some(0.9),
            },
            MemoryHit {
                memory: "User asked about refunds last week.".to_string(),
                score: Some(0.7),
            },
        ];
        let source = MemoryAdapter::hits_to_source(hits).unwrap();
        assert_eq!(source.kind, SourceKind::Memory);
        assert_eq!(source.url, "#memory");
        assert!(source.snippet.contains("concise answers"));
        assert!(source.snippet.contains("refunds last week"));
    }

    #[test]
    fn empty_hits_produce_no_source() {
        assert!(MemoryAdapter::hits_to_source(Vec::new()).is_none());
        let blank = vec![MemoryHit {
            memory: "   ".to_string(),
            score: None,
        }];
        assert!(MemoryAdapter::hits_to_source(blank).is_none());
    }

    #[tokio::test]
    async fn anonymous_user_skips_call() {
        let client =
            MemoryClient::new("https://memory.invalid".to_string(), "key".to_string()).unwrap();
        let adapter = MemoryAdapter::new(client, 5);
        let scope = FetchScope {
            query: "q".to_string(),
            namespace: None,
            user_id: None,
            company_name: None,
            intent: crate::intent::classify("q", None, None, None),
        };
        assert!(adapter.fetch(&scope).await.is_empty());
    }
}
