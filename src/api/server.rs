//! HTTP server implementation

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing::warn;

use crate::adapters::DocumentSearchAdapter;
use crate::adapters::MemoryAdapter;
use crate::adapters::MemoryClient;
use crate::adapters::SearchCache;
use crate::adapters::SourceAdapter;
use crate::adapters::VectorIndexClient;
use crate::adapters::WebSearchAdapter;
use crate::adapters::WebSearchClient;
use crate::api::handlers::AppState;
use crate::api::rate_limit::RateLimiter;
use crate::api::routes;
use crate::config::AppConfig;
use crate::llm;
use crate::llm::CompletionOptions;
use crate::persistence::HistoryClient;
use crate::persistence::TurnStore;
use crate::pipeline::ChatPipeline;
use crate::Result;

/// Start the API server
pub async fn serve_api(
    config: &AppConfig,
    host: String,
    port: u16,
    enable_cors: bool,
) -> Result<()> {
    info!("Starting repchat API server...");

    let search_cache = Arc::new(SearchCache::new(
        config.cache_ttl(),
        config.chat.cache_max_entries,
    ));
    let state = build_state(config, search_cache.clone())?;

    // Sweep expired cache entries so idle deployments don't hold stale
    // results until the next lookup touches them
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            search_cache.cleanup_expired().await;
        }
    });

    let mut app = Router::new().nest("/api", routes::api_routes(state));

    app = app
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        info!("CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /api/health             - Health check");
    info!("  POST /api/chat               - Streaming chat (SSE)");
    info!("  POST /api/chat/company-aware - Streaming company-aware chat (SSE)");
    info!("  POST /api/chat/complete      - Non-streaming chat");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire every configured capability into shared application state. Absent
/// credentials disable the matching adapter rather than failing startup.
pub fn build_state(config: &AppConfig, search_cache: Arc<SearchCache>) -> Result<AppState> {
    let documents: Option<Arc<dyn SourceAdapter>> =
        match (&config.vector.endpoint, &config.vector.token) {
            (Some(endpoint), Some(token)) => {
                let client =
                    VectorIndexClient::new(endpoint.clone(), token.clone())?;
                Some(Arc::new(DocumentSearchAdapter::new(
                    client,
                    config.vector.top_k,
                )))
            }
            _ => {
                info!("Vector index not configured, document search disabled");
                None
            }
        };

    let web: Option<Arc<dyn SourceAdapter>> = match &config.web_search.api_key {
        Some(api_key) => {
            let client = WebSearchClient::new(
                config.web_search.endpoint.clone(),
                api_key.clone(),
            )?;
            Some(Arc::new(WebSearchAdapter::new(
                client,
                search_cache.clone(),
                config.web_search.max_results,
                config.web_search.search_depth.clone(),
            )))
        }
        None => {
            info!("Web search not configured, disabled");
            None
        }
    };

    let memory_client = match &config.memory.api_key {
        Some(api_key) => Some(MemoryClient::new(
            config.memory.endpoint.clone(),
            api_key.clone(),
        )?),
        None => {
            info!("Memory service not configured, disabled");
            None
        }
    };
    let memory: Option<Arc<dyn SourceAdapter>> = memory_client.clone().map(|client| {
        Arc::new(MemoryAdapter::new(client, config.memory.max_snippets))
            as Arc<dyn SourceAdapter>
    });

    let history = match (
        &config.history.endpoint,
        &config.history.project_id,
        &config.history.api_key,
    ) {
        (Some(endpoint), Some(project_id), Some(api_key)) => Some(HistoryClient::new(
            endpoint.clone(),
            project_id.clone(),
            api_key.clone(),
            config.history.database_id.clone(),
            config.history.messages_collection.clone(),
        )?),
        _ => {
            info!("Chat history store not configured, disabled");
            None
        }
    };

    let provider = llm::select_provider(&config.providers);
    let provider_name = provider.as_ref().map(|p| p.name());
    if provider.is_none() {
        warn!("No LLM provider configured; chat requests will fail until one is set");
    }

    let sink = Arc::new(TurnStore::new(memory_client, history));

    let pipeline = Arc::new(ChatPipeline::new(
        documents,
        web,
        memory,
        provider,
        sink,
        CompletionOptions {
            temperature: config.chat.temperature,
            max_tokens: config.chat.max_tokens,
        },
        config.chat.history_window,
        config.adapter_timeout(),
        config.stream_timeout(),
    ));

    let limiter = RateLimiter::from_config(&config.rate_limit)?;

    Ok(AppState {
        pipeline,
        limiter,
        search_cache,
        provider_name,
    })
}
