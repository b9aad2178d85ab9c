/// API request handlers
use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::adapters::SearchCache;
use crate::api::rate_limit::RateLimiter;
use crate::api::types::ApiResponse;
use crate::api::types::HealthResponse;
use crate::pipeline::ChatPipeline;

pub mod chat;

pub use chat::*;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
    pub limiter: RateLimiter,
    pub search_cache: Arc<SearchCache>,
    /// Name of the selected LLM provider, absent when none is configured
    pub provider_name: Option<&'static str>,
}

/// Health check handler
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: state.provider_name,
        search_cache: state.search_cache.stats().await,
    }))
}
