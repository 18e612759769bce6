//! REST handlers for the Mnemon gateway.
//!
//! Error mapping follows the propagation policy: validation failures before
//! any model call are 4xx with nothing appended; a submitted turn always
//! yields HTTP 200 with any failure recorded on the assistant message.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use mnemon_agent::{AgentStreamEvent, AssemblyInput, ContextUsage, Summarizer};
use mnemon_core::agent::{Agent, AgentConfig, ConfigPatch, MemoryBlock};
use mnemon_core::error::{Error, ErrorKind, MemoryError, StorageError, ToolError};
use mnemon_core::memory::{MemoryCategory, MemoryItem};
use mnemon_core::message::{Message, SessionId};
use mnemon_core::provider::{ModelInfo, Usage};
use mnemon_memory::hierarchy::WorkingStats;
use mnemon_telemetry::{CostStatistics, RemoteBalance};

use crate::SharedState;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the API router.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/models", get(models_handler))
        .route("/agents", get(list_agents_handler))
        .route("/agents/{id}", get(get_agent_handler))
        .route("/agents/{id}/config", get(get_config_handler).put(update_config_handler))
        .route("/agents/{id}/versions", get(list_versions_handler))
        .route("/agents/{id}/versions/{vid}/rollback", post(rollback_handler))
        .route(
            "/agents/{id}/system-prompt",
            get(get_system_prompt_handler).put(put_system_prompt_handler),
        )
        .route("/agents/{id}/memory/blocks", get(list_blocks_handler))
        .route("/agents/{id}/memory/blocks/{label}", put(put_block_handler))
        .route("/agents/{id}/chat", post(chat_handler))
        .route("/agents/{id}/chat/stream", post(chat_stream_handler))
        .route("/agents/{id}/new-chat", post(new_chat_handler))
        .route("/conversation/{session}", get(conversation_handler))
        .route("/conversation/{session}/clear", post(clear_handler))
        .route("/conversation/{session}/summarize", post(summarize_handler))
        .route("/context/usage", get(context_usage_handler))
        .route("/costs/statistics", get(cost_statistics_handler))
        .route("/costs/openrouter", get(remote_costs_handler))
        .with_state(state)
}

// ── Error mapping ─────────────────────────────────────────────────────────

/// A wire-level API error: HTTP status plus the error-taxonomy kind.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, kind: ErrorKind::InvalidRequest, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: ErrorKind::StorageError,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "kind": self.kind, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        let status = match &err {
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            StorageError::ReadOnlyBlock { .. } | StorageError::BlockOverLimit { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, kind: err.kind(), message: err.to_string() }
    }
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        let status = match &err {
            MemoryError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, kind: ErrorKind::StorageError, message: err.to_string() }
    }
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Storage(s) => s.into(),
            Error::Memory(m) => m.into(),
            other => {
                let status = match other.kind() {
                    ErrorKind::InvalidRequest | ErrorKind::ContextOverflowFixed => {
                        StatusCode::BAD_REQUEST
                    }
                    ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                    ErrorKind::ProviderTransient | ErrorKind::ProviderPermanent => {
                        StatusCode::BAD_GATEWAY
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                Self { status, kind: other.kind(), message: other.to_string() }
            }
        }
    }
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TokenUsageDto {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reasoning_tokens: Option<u32>,
    total_tokens: u32,
    cost_usd: f64,
}

impl TokenUsageDto {
    fn from_usage(usage: &Usage, cost_usd: f64) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            reasoning_tokens: usage.reasoning_tokens,
            total_tokens: usage.total_tokens(),
            cost_usd,
        }
    }
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorKind>,
    tool_calls: u32,
    steps: u32,
    reasoning_time_ms: u64,
    usage: TokenUsageDto,
}

#[derive(Deserialize)]
struct UpdateConfigRequest {
    #[serde(flatten)]
    patch: ConfigPatch,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct VersionResponse {
    version_id: String,
}

#[derive(Deserialize)]
struct LimitQuery {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct SystemPromptDto {
    system_prompt: String,
}

#[derive(Deserialize)]
struct BlockValueRequest {
    value: String,
}

#[derive(Deserialize)]
struct ConversationQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    before: Option<i64>,
}

#[derive(Serialize)]
struct ConversationResponse {
    session_id: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_cursor: Option<i64>,
}

#[derive(Serialize)]
struct ClearResponse {
    deleted: usize,
}

#[derive(Deserialize, Default)]
struct SummarizeRequest {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    up_to_seq: Option<i64>,
}

#[derive(Serialize)]
struct SummarizeResponse {
    summary: String,
    up_to_seq: i64,
}

#[derive(Deserialize, Default)]
struct NewChatRequest {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct NewChatResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    cleared: usize,
}

#[derive(Deserialize)]
struct ContextUsageQuery {
    session_id: String,
    #[serde(default)]
    agent_id: Option<String>,
}

#[derive(Serialize)]
struct ContextUsageResponse {
    usage: ContextUsage,
    working_memory: WorkingStats,
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn default_session(agent_id: &str) -> String {
    format!("{agent_id}-main")
}

async fn require_agent(state: &SharedState, agent_id: &str) -> Result<Agent, ApiError> {
    state
        .versions
        .get_agent(agent_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("unknown agent {agent_id}")))
}

/// Resolve an optional agent id: explicit wins; otherwise the single
/// registered agent; ambiguous otherwise.
async fn resolve_agent(state: &SharedState, agent_id: Option<String>) -> Result<String, ApiError> {
    if let Some(id) = agent_id {
        require_agent(state, &id).await?;
        return Ok(id);
    }
    let agents = state.versions.list_agents().await?;
    match agents.len() {
        0 => Err(ApiError::not_found("no agents registered")),
        1 => Ok(agents[0].id.clone()),
        _ => Err(ApiError::bad_request("multiple agents registered; pass agent_id")),
    }
}

// ── Handlers: liveness & models ───────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn models_handler(State(state): State<SharedState>) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    let models = state.provider.list_models().await.map_err(|e| ApiError {
        status: StatusCode::BAD_GATEWAY,
        kind: e.kind(),
        message: e.to_string(),
    })?;
    Ok(Json(models))
}

// ── Handlers: agents & config ─────────────────────────────────────────────

async fn list_agents_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Agent>>, ApiError> {
    Ok(Json(state.versions.list_agents().await?))
}

async fn get_agent_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(require_agent(&state, &agent_id).await?))
}

async fn get_config_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentConfig>, ApiError> {
    require_agent(&state, &agent_id).await?;
    Ok(Json(state.versions.get_current(&agent_id).await?))
}

async fn update_config_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
    Json(body): Json<UpdateConfigRequest>,
) -> Result<Json<VersionResponse>, ApiError> {
    require_agent(&state, &agent_id).await?;
    if body.patch.is_empty() {
        return Err(ApiError::bad_request("empty config patch"));
    }
    let description = body.description.unwrap_or_else(|| "config update".into());
    let version = state.versions.update(&agent_id, &body.patch, description).await?;
    Ok(Json(VersionResponse { version_id: version.version_id }))
}

async fn list_versions_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AgentConfig>>, ApiError> {
    require_agent(&state, &agent_id).await?;
    let limit = query.limit.unwrap_or(20).min(200);
    Ok(Json(state.versions.list_versions(&agent_id, limit).await?))
}

async fn rollback_handler(
    State(state): State<SharedState>,
    Path((agent_id, version_id)): Path<(String, String)>,
) -> Result<Json<VersionResponse>, ApiError> {
    require_agent(&state, &agent_id).await?;
    let restored = state.versions.rollback(&agent_id, &version_id).await?;
    Ok(Json(VersionResponse { version_id: restored.version_id }))
}

async fn get_system_prompt_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
) -> Result<Json<SystemPromptDto>, ApiError> {
    require_agent(&state, &agent_id).await?;
    let config = state.versions.get_current(&agent_id).await?;
    Ok(Json(SystemPromptDto { system_prompt: config.system_prompt }))
}

async fn put_system_prompt_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
    Json(body): Json<SystemPromptDto>,
) -> Result<Json<VersionResponse>, ApiError> {
    require_agent(&state, &agent_id).await?;
    let patch = ConfigPatch { system_prompt: Some(body.system_prompt), ..Default::default() };
    let version = state.versions.update(&agent_id, &patch, "system prompt update").await?;
    Ok(Json(VersionResponse { version_id: version.version_id }))
}

// ── Handlers: memory blocks ───────────────────────────────────────────────

async fn list_blocks_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Vec<MemoryBlock>>, ApiError> {
    require_agent(&state, &agent_id).await?;
    Ok(Json(state.versions.list_blocks(&agent_id).await?))
}

async fn put_block_handler(
    State(state): State<SharedState>,
    Path((agent_id, label)): Path<(String, String)>,
    Json(body): Json<BlockValueRequest>,
) -> Result<Json<MemoryBlock>, ApiError> {
    require_agent(&state, &agent_id).await?;
    let block = state.versions.set_block_value(&agent_id, &label, &body.value).await?;
    Ok(Json(block))
}

// ── Handlers: chat ────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    require_agent(&state, &agent_id).await?;
    let session = SessionId::from(&body.session_id.unwrap_or_else(|| default_session(&agent_id)));

    let runner = state.runner_for(&agent_id).await?;
    let lock = state.session_lock(&session.0).await;

    // The turn runs on its own task: a client disconnect must not cancel it,
    // so the next fetch still sees the stored result.
    let task_session = session.clone();
    let task_agent = agent_id.clone();
    let handle = tokio::spawn(async move {
        let _guard = lock.lock().await;
        runner.run_turn(&task_agent, &task_session, &body.message, None).await
    });

    let outcome = handle
        .await
        .map_err(|e| ApiError::internal(format!("turn task failed: {e}")))??;

    Ok(Json(ChatResponse {
        session_id: session.0,
        content: outcome.message.content.clone(),
        thinking: outcome.message.thinking.clone(),
        error: outcome.message.error_kind,
        tool_calls: outcome.tool_calls_made,
        steps: outcome.steps,
        reasoning_time_ms: outcome.reasoning_time_ms,
        usage: TokenUsageDto::from_usage(&outcome.model_usage, outcome.cost_usd),
    }))
}

async fn chat_stream_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    require_agent(&state, &agent_id).await?;
    let session = SessionId::from(&body.session_id.unwrap_or_else(|| default_session(&agent_id)));

    let runner = state.runner_for(&agent_id).await?;
    let lock = state.session_lock(&session.0).await;

    let (tx, rx) = mpsc::channel::<AgentStreamEvent>(64);
    tokio::spawn(async move {
        let _guard = lock.lock().await;
        if let Err(e) = runner.run_turn(&agent_id, &session, &body.message, Some(tx.clone())).await
        {
            // Pre-turn failures never reach the loop's own frames.
            let _ = tx
                .send(AgentStreamEvent::Error { kind: e.kind(), message: e.to_string() })
                .await;
            let _ = tx
                .send(AgentStreamEvent::Done {
                    usage: None,
                    cost_usd: 0.0,
                    steps: 0,
                    tool_calls_made: 0,
                })
                .await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(SseEvent::default()
            .event(event.event_type())
            .data(serde_json::to_string(&event).unwrap_or_default()))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── Handlers: conversation ────────────────────────────────────────────────

async fn conversation_handler(
    State(state): State<SharedState>,
    Path(session): Path<String>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let session = SessionId::from(&session);
    let limit = query.limit.unwrap_or(50).min(500);
    let page = state.conversations.list(&session, limit, query.before).await?;
    Ok(Json(ConversationResponse {
        session_id: session.0,
        messages: page.messages,
        next_cursor: page.next_cursor,
    }))
}

async fn clear_handler(
    State(state): State<SharedState>,
    Path(session): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    let session = SessionId::from(&session);
    let deleted = state.conversations.clear(&session).await?;
    Ok(Json(ClearResponse { deleted }))
}

async fn summarize_handler(
    State(state): State<SharedState>,
    Path(session): Path<String>,
    body: Option<Json<SummarizeRequest>>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let session = SessionId::from(&session);
    let agent_id = resolve_agent(&state, body.agent_id).await?;
    let config = state.versions.get_current(&agent_id).await?;

    let up_to_seq = match body.up_to_seq {
        Some(seq) => seq,
        None => {
            let all = state.conversations.list_all(&session).await?;
            Summarizer::prefix_cutoff(&all, 10)
                .ok_or_else(|| ApiError::bad_request("nothing to summarize"))?
        }
    };

    let summary = state
        .summarizer()
        .summarize(&state.conversations, &session, up_to_seq, &config)
        .await?;
    Ok(Json(SummarizeResponse { summary, up_to_seq }))
}

/// Summarize the whole session into archival memory, then clear the log.
/// If summarization fails, nothing is cleared and the error surfaces.
async fn new_chat_handler(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
    body: Option<Json<NewChatRequest>>,
) -> Result<Json<NewChatResponse>, ApiError> {
    require_agent(&state, &agent_id).await?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let session =
        SessionId::from(&body.session_id.unwrap_or_else(|| default_session(&agent_id)));

    let messages = state.conversations.list_all(&session).await?;
    let Some(last) = messages.last() else {
        return Ok(Json(NewChatResponse { summary: None, cleared: 0 }));
    };

    let config = state.versions.get_current(&agent_id).await?;
    let summary = state
        .summarizer()
        .summarize(&state.conversations, &session, last.seq, &config)
        .await?;

    // Keep the gist of the old chat in archival memory before clearing.
    let memory = state.memory_for(&agent_id).await;
    let item = MemoryItem::new(
        &agent_id,
        format!("Previous conversation summary: {summary}"),
        6.0,
        MemoryCategory::Event,
    );
    memory.store(&session.0, item).await?;

    let cleared = state.conversations.clear(&session).await?;
    info!(agent = %agent_id, session = %session, cleared, "Started new chat");
    Ok(Json(NewChatResponse { summary: Some(summary), cleared }))
}

// ── Handlers: context usage & costs ───────────────────────────────────────

async fn context_usage_handler(
    State(state): State<SharedState>,
    Query(query): Query<ContextUsageQuery>,
) -> Result<Json<ContextUsageResponse>, ApiError> {
    let agent_id = resolve_agent(&state, query.agent_id).await?;
    let session = SessionId::from(&query.session_id);

    let config = state.versions.get_current(&agent_id).await?;
    let blocks = state.versions.list_blocks(&agent_id).await?;
    let registry = state.registry_for(&agent_id).await?;
    let history = state.conversations.list_all(&session).await?;

    let assembled = state.assembler().assemble(&AssemblyInput {
        config: &config,
        blocks: &blocks,
        tool_definitions: &registry.definitions(),
        recalled: &[],
        history: &history,
    })?;

    let memory = state.memory_for(&agent_id).await;
    Ok(Json(ContextUsageResponse {
        usage: assembled.usage,
        working_memory: memory.working_stats(),
    }))
}

async fn cost_statistics_handler(
    State(state): State<SharedState>,
) -> Json<CostStatistics> {
    Json(state.tracker.statistics(Utc::now()))
}

async fn remote_costs_handler(
    State(state): State<SharedState>,
) -> Result<Json<RemoteBalance>, ApiError> {
    match state.remote_balance.read().await.clone() {
        Some(balance) => Ok(Json(balance)),
        None => Err(ApiError::not_found("provider balance not available")),
    }
}
