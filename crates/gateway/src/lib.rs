//! HTTP boundary for chatrelay.
//!
//! - `POST /api/chat` runs the agent loop and streams every chunk back as
//!   server-sent events, ending with one `data: [DONE]` frame
//! - `GET /health` is a static liveness probe
//!
//! Built on Axum. Dropping the response body cancels the chat.

pub mod tools;

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::{
    Router,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chatrelay_adapters::AdapterRouter;
use chatrelay_core::sse::{format_sse_chunk, format_sse_done, format_sse_error};
use chatrelay_core::strategy::max_iterations;
use chatrelay_core::{ChatOptions, GenerationOptions, ModelMessage, Tool};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub adapters: AdapterRouter,
    pub tools: Vec<Tool>,
    pub default_model: String,
    pub system_prompts: Vec<String>,
    pub max_iterations: u32,
    pub generation: GenerationOptions,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Defaults for model, prompts, loop bound and sampling come from `config`.
    pub fn from_config(
        config: &chatrelay_config::AppConfig,
        adapters: AdapterRouter,
        tools: Vec<Tool>,
    ) -> Self {
        Self {
            adapters,
            tools,
            default_model: config.default_model.clone(),
            system_prompts: config.agent.system_prompts.clone(),
            max_iterations: config.agent.max_iterations,
            generation: GenerationOptions {
                temperature: Some(config.default_temperature),
                max_tokens: Some(config.default_max_tokens),
                ..Default::default()
            },
        }
    }
}

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - CORS open to any origin for GET and POST
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(
    config: chatrelay_config::AppConfig,
    tools: Vec<Tool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let adapters = chatrelay_adapters::build_from_config(&config);
    if adapters.default().is_none() {
        return Err(format!("default provider '{}' is not configured", config.default_provider).into());
    }
    info!(
        adapters = ?adapters.list(),
        default = %config.default_provider,
        tools = tools.len(),
        "Adapters ready"
    );

    let state = Arc::new(GatewayState::from_config(&config, adapters, tools));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "chatrelay",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// `POST /api/chat` body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ModelMessage>,
    #[serde(default)]
    pub data: Option<ChatRequestData>,
}

/// Optional per-request overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestData {
    pub model: Option<String>,

    /// Adapter name; the configured default when absent
    pub provider: Option<String>,

    #[serde(default)]
    pub approvals: HashMap<String, bool>,

    #[serde(default)]
    pub client_tool_results: HashMap<String, Value>,
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let data = payload.data.unwrap_or_default();

    let adapter = match data.provider.as_deref() {
        Some(name) => state.adapters.get(name),
        None => state.adapters.default(),
    }
    .ok_or_else(|| {
        let name = data.provider.as_deref().unwrap_or("default");
        warn!(provider = %name, "Chat request for unknown provider");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Unknown provider: {name}"),
            }),
        )
    })?;
    let model = data
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.default_model.clone());

    info!(
        adapter = %adapter.name(),
        model = %model,
        messages = payload.messages.len(),
        "POST /api/chat"
    );

    let cancel = CancellationToken::new();
    let mut options = ChatOptions::new(&model, payload.messages)
        .with_tools(state.tools.clone())
        .with_strategy(max_iterations(state.max_iterations))
        .with_generation(state.generation.clone())
        .with_cancellation(cancel.clone());
    options.system_prompts = state.system_prompts.clone();
    options.approvals = data.approvals;
    options.client_tool_results = data.client_tool_results;

    let rx = chatrelay_engine::chat(adapter, options);

    // Cancels the engine once the client disconnects and the body drops.
    let guard = cancel.drop_guard();
    let frames = ReceiverStream::new(rx)
        .map(move |chunk| {
            debug!(kind = chunk.kind_name(), "Sending chunk");
            format_sse_chunk(&chunk).unwrap_or_else(|e| format_sse_error(&e.to_string(), &model))
        })
        .chain(futures::stream::once(async { format_sse_done() }))
        .map(move |frame| {
            let _guard = &guard;
            Ok::<_, Infallible>(frame)
        });

    Ok((
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}
