//! Web search adapter with result caching
//!
//! Wraps a Tavily-style search API. Company-scoped queries are templated
//! with the intent's platform hints so that, for example, a people question
//! about Acme issues a query containing both "Acme" and "linkedin". Results
//! are cached by normalized `(query, options)` key for a fixed TTL to absorb
//! rapid duplicate requests.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::cache::SearchCache;
use super::FetchScope;
use super::SourceAdapter;
use crate::errors::RepChatError;
use crate::errors::Result;
use crate::intent::Platform;
use crate::models::Source;
use crate::models::SourceKind;

/// REST client for the hosted web search provider
pub struct WebSearchClient {
    endpoint: String,
    api_key: String,
    client: Client,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: Option<f32>,
}

impl WebSearchClient {
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

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        search_depth: &str,
    ) -> Result<Vec<WebResult>> {
        let url = format!("{}/search", self.endpoint.trim_end_matches('/'));
        debug!("Web search: {query}");

        let request = SearchRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth,
        };

        let response = self
            .client
            .post(&url)
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
                "Web search error ({status}): {error_text}"
            )));
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| RepChatError::Http(format!("Failed to parse search response: {e}")))?;

        Ok(result.results)
    }
}

/// Live web search with per-intent query templating and TTL caching
pub struct WebSearchAdapter {
    client: WebSearchClient,
    cache: Arc<SearchCache>,
    max_results: usize,
    search_depth: String,
}

impl WebSearchAdapter {
    pub fn new(
        client: WebSearchClient,
        cache: Arc<SearchCache>,
        max_results: usize,
        search_depth: String,
    ) -> Self {
        Self {
            client,
            cache,
            max_results,
            search_depth,
        }
    }

    /// Build the provider queries for one scope: the raw question plus one
    /// platform-hinted variant per targeted platform (capped at two so a
    /// single turn stays cheap).
    fn build_queries(scope: &FetchScope) -> Vec<(String, SourceKind)> {
        let mut queries = Vec::new();

        match scope.company_name.as_deref() {
            Some(company) if scope.intent.company_specific => {
                queries.push((format!("{company} {}", scope.query), SourceKind::Web));
                for platform in scope.intent.target_platforms.iter().take(2) {
                    queries.push((
                        format!("{company} {} {}", platform.hint(), scope.query),
                        Self::platform_kind(*platform),
                    ));
                }
            }
            _ => queries.push((scope.query.clone(), SourceKind::Web)),
        }

        queries
    }

    const fn platform_kind(platform: Platform) -> SourceKind {
        match platform {
            Platform::Linkedin => SourceKind::Linkedin,
            Platform::Github => SourceKind::Github,
            Platform::Reddit => SourceKind::Reddit,
            Platform::Glassdoor => SourceKind::Glassdoor,
            Platform::News => SourceKind::News,
            _ => SourceKind::Web,
        }
    }

    async fn search_cached(&self, query: &str, kind: SourceKind) -> Vec<Source> {
        let key = SearchCache::key(query, self.max_results, &self.search_depth);

        if let Some(cached) = self.cache.get(&key).await {
            return cached;
        }

        match self
            .client
            .search(query, self.max_results, &self.search_depth)
            .await
        {
            Ok(results) => {
                let sources: Vec<Source> = results
                    .into_iter()
                    .map(|r| {
                        let source = Source::new(r.title, r.url, r.content, kind);
                        match r.score {
                            Some(score) => source.with_score(score),
                            None => source,
                        }
                    })
                    .collect();
                self.cache.insert(key, sources.clone()).await;
                sources
            }
            Err(e) => {
                warn!("Web search failed, continuing without web results: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for WebSearchAdapter {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn fetch(&self, scope: &FetchScope) -> Vec<Source> {
        let mut merged: Vec<Source> = Vec::new();
        for (query, kind) in Self::build_queries(scope) {
            for source in self.search_cached(&query, kind).await {
                // De-duplicate across templated queries by URL
                if !merged.iter().any(|s| s.url == source.url) {
                    merged.push(source);
                }
            }
        }
        merged
    }
}
