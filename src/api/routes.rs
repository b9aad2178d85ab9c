//! API route definitions

use axum::routing::get;
use axum::routing::post;
use axum::Router;

use super::handlers::AppState;
use super::handlers::{
    self,
};

/// Create RESTful API router
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Chat endpoints
        .route("/chat", post(handlers::chat))
        .route("/chat/company-aware", post(handlers::company_aware_chat))
        .route("/chat/complete", post(handlers::chat_complete))
        .with_state(state)
}
