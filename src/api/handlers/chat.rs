//! Chat handlers
//!
//! The streaming endpoints answer over SSE with named events (`status`,
//! `sources`, `content`, `done`, `error`); the non-streaming variant returns
//! the full answer as JSON plus a base64 `X-Sources` header. Rate limiting
//! is checked before any pipeline work starts.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;
use tracing::info;

use super::AppState;
use crate::api::types::ApiResponse;
use crate::api::types::ChatRequest;
use crate::api::types::CompanyAwareChatRequest;
use crate::api::types::CompleteResponse;
use crate::api::types::RateLimitBody;
use crate::errors::RepChatError;
use crate::llm::extract;
use crate::models::ChatMessage;
use crate::models::Role;
use crate::pipeline::Capabilities;
use crate::pipeline::ChatEvent;
use crate::pipeline::ChatRequestCtx;

/// Streaming chat (POST /api/chat)
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    info!("POST /api/chat ({} message(s))", req.messages.len());

    if let Some(rejection) = rate_limit(&state, &headers, req.user_id.as_deref()).await {
        return rejection;
    }

    let (query, history) = match split_messages(req.messages) {
        Ok(parts) => parts,
        Err(message) => return bad_request(message),
    };

    let ctx = ChatRequestCtx {
        query,
        history,
        namespace: req.namespace,
        user_id: req.user_id,
        chatbot_id: req.chatbot_id,
        company: None,
        capabilities: Capabilities {
            web: req.use_web_search,
            ..Capabilities::default()
        },
    };

    sse_turn(&state, ctx).into_response()
}

/// Streaming company-aware chat (POST /api/chat/company-aware)
pub async fn company_aware_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompanyAwareChatRequest>,
) -> Response {
    info!(
        "POST /api/chat/company-aware ({})",
        req.company_name.as_deref().unwrap_or("-")
    );

    if let Some(rejection) = rate_limit(&state, &headers, req.user_id.as_deref()).await {
        return rejection;
    }

    let (query, history) = match split_messages(req.messages) {
        Ok(parts) => parts,
        Err(message) => return bad_request(message),
    };

    // Without a company name the endpoint degrades to the plain chat flow
    let company = req.company_name.as_deref().map(|name| {
        extract::company_from_text(name, req.company_data.as_deref().unwrap_or(""))
    });

    let ctx = ChatRequestCtx {
        query,
        history,
        namespace: req.namespace,
        user_id: req.user_id,
        chatbot_id: req.chatbot_id,
        company,
        capabilities: Capabilities {
            documents: req.capabilities.documents,
            web: req.capabilities.web,
            memory: req.capabilities.memory,
        },
    };

    sse_turn(&state, ctx).into_response()
}

/// Non-streaming chat (POST /api/chat/complete). Sources are duplicated into
/// a base64 `X-Sources` header for clients that only read headers.
pub async fn chat_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    info!("POST /api/chat/complete ({} message(s))", req.messages.len());

    if let Some(rejection) = rate_limit(&state, &headers, req.user_id.as_deref()).await {
        return rejection;
    }

    let (query, history) = match split_messages(req.messages) {
        Ok(parts) => parts,
        Err(message) => return bad_request(message),
    };

    let ctx = ChatRequestCtx {
        query,
        history,
        namespace: req.namespace,
        user_id: req.user_id,
        chatbot_id: req.chatbot_id,
        company: None,
        capabilities: Capabilities {
            web: req.use_web_search,
            ..Capabilities::default()
        },
    };

    match state.pipeline.run_collect(ctx).await {
        Ok(collected) => {
            let sources_header = serde_json::to_string(&collected.sources)
                .map(|json| STANDARD.encode(json))
                .ok()
                .and_then(|encoded| HeaderValue::from_str(&encoded).ok());

            let mut response = Json(ApiResponse::success(CompleteResponse {
                answer: collected.answer,
                sources: collected.sources,
            }))
            .into_response();
            if let Some(value) = sources_header {
                response.headers_mut().insert("x-sources", value);
            }
            response
        }
        Err(RepChatError::NoProviderConfigured) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<CompleteResponse>::error(
                RepChatError::NoProviderConfigured.to_string(),
            )),
        )
            .into_response(),
        Err(e) => {
            error!("Completion failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<CompleteResponse>::error(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Spawn the pipeline and bridge its event channel onto SSE
fn sse_turn(
    state: &AppState,
    ctx: ChatRequestCtx,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::channel(64);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        pipeline.run(ctx, tx).await;
    });

    let stream = ReceiverStream::new(rx)
        .map(|event: ChatEvent| Event::default().event(event.event_name()).json_data(&event));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Run the rate-limit check; `Some` is the finished 429 response
async fn rate_limit(
    state: &AppState,
    headers: &HeaderMap,
    user_id: Option<&str>,
) -> Option<Response> {
    let identity = client_identity(headers, user_id);
    let decision = state.limiter.check(&identity).await;
    if decision.allowed {
        return None;
    }

    info!("Rate limited: {identity}");
    Some(
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(RateLimitBody {
                error: "Rate limit exceeded".to_string(),
                limit: decision.limit,
                remaining: decision.remaining,
                reset: decision.reset,
            }),
        )
            .into_response(),
    )
}

/// Client identity for rate limiting: authenticated user first, then the
/// forwarded client address, then a shared anonymous bucket.
fn client_identity(headers: &HeaderMap, user_id: Option<&str>) -> String {
    if let Some(user_id) = user_id {
        return format!("user:{user_id}");
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Split the message list into the active query (last message, must be from
/// the user) and the preceding history.
fn split_messages(mut messages: Vec<ChatMessage>) -> Result<(String, Vec<ChatMessage>), String> {
    match messages.pop() {
        Some(last) if last.role == Role::User && !last.content.trim().is_empty() => {
            Ok((last.content, messages))
        }
        Some(_) => Err("The last message must be a non-empty user message".to_string()),
        None => Err("At least one message is required".to_string()),
    }
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(message)),
    )
        .into_response()
}
