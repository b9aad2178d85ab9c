//! Document search adapter over a hosted vector index
//!
//! Consumes an Upstash-Vector-style REST API: `POST {endpoint}/query` with a
//! bearer token, optionally namespaced. Results come back ranked by
//! descending similarity score.

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

/// REST client for the hosted vector index
pub struct VectorIndexClient {
    endpoint: String,
    token: String,
    client: Client,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    data: &'a str,
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: Vec<VectorHit>,
}

/// One ranked hit from the vector index
#[derive(Debug, Clone, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl VectorIndexClient {
    pub fn new(endpoint: String, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RepChatError::Http(e.to_string()))?;

        Ok(Self {
            endpoint,
            token,
            client,
        })
    }

    /// Query the index restricted to a namespace
    pub async fn query(&self, text: &str, namespace: &str, top_k: usize) -> Result<Vec<VectorHit>> {
        let url = format!("{}/query/{namespace}", self.endpoint.trim_end_matches('/'));
        debug!("Querying vector index: {url} (top_k={top_k})");

        let request = QueryRequest {
            data: text,
            top_k,
            include_metadata: true,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
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
                "Vector index error ({status}): {error_text}"
            )));
        }

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| RepChatError::Http(format!("Failed to parse vector response: {e}")))?;

        Ok(result.result)
    }
}

/// Vector RAG over the tenant's own documents
pub struct DocumentSearchAdapter {
    client: VectorIndexClient,
    top_k: usize,
}

impl DocumentSearchAdapter {
    pub fn new(client: VectorIndexClient, top_k: usize) -> Self {
        Self {
            client,
            top_k: top_k.min(10),
        }
    }

    fn hit_to_source(hit: VectorHit) -> Source {
        let metadata = hit.metadata.unwrap_or_default();
        let title = metadata
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Document")
            .to_string();
        let url = metadata
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or("#document")
            .to_string();
        let content = metadata
            .get("content")
            .or_else(|| metadata.get("text"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Source {
            id: hit.id,
            title,
            url,
            snippet: content,
            kind: SourceKind::Document,
            relevance_score: Some(hit.score),
        }
    }
}

#[async_trait]
impl SourceAdapter for DocumentSearchAdapter {
    fn name(&self) -> &'static str {
        "documents"
    }

    async fn fetch(&self, scope: &FetchScope) -> Vec<Source> {
        // No namespace means no tenant documents to search; skip the call
        let Some(namespace) = scope.namespace.as_deref().filter(|n| !n.is_empty()) else {
            return Vec::new();
        };

        match self.client.query(&scope.query, namespace, self.top_k).await {
            Ok(hits) => hits.into_iter().map(Self::hit_to_source).collect(),
            Err(e) => {
                warn!("Document search failed, continuing without documents: {e}");
                Vec::new()
            }
        }
    }
}
