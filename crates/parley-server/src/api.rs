use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use parley_engine::{Engine, SendMessage};
use parley_shared::protocol::MessagePayload;
use parley_shared::{Audience, MessageKind, UserId};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/messages", post(send_message))
        .route("/messages/:user_id", get(get_history))
        .route("/conversations", get(list_conversations))
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    receiver_id: UserId,
    #[serde(default = "default_kind")]
    kind: MessageKind,
    content: Option<String>,
    media_ref: Option<String>,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

#[derive(Deserialize)]
struct ListQuery {
    audience: String,
    #[serde(default)]
    skip: usize,
    limit: Option<usize>,
}

/// The authenticated identity, as injected by the upstream auth proxy.
/// Credential checking itself is a collaborator concern.
fn authenticated_user(headers: &HeaderMap) -> Result<UserId, ServerError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthorized("missing x-user-id header".into()))?;

    UserId::parse(raw)
        .map_err(|_| ServerError::Unauthorized(format!("invalid x-user-id: {raw}")))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let sender = authenticated_user(&headers)?;

    let payload = state
        .engine
        .send_message(SendMessage {
            sender,
            receiver: req.receiver_id,
            kind: req.kind,
            content: req.content,
            media_ref: req.media_ref,
        })
        .await?;

    info!(id = %payload.id, sender = %sender, "message committed");

    Ok((StatusCode::CREATED, Json(payload)))
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<MessagePayload>>, ServerError> {
    let me = authenticated_user(&headers)?;
    let history = state.engine.get_history(me, UserId(user_id)).await?;
    Ok(Json(history))
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let me = authenticated_user(&headers)?;

    let audience = Audience::parse(&query.audience).ok_or_else(|| {
        ServerError::BadRequest(format!(
            "audience must be 'friends' or 'strangers', got '{}'",
            query.audience
        ))
    })?;
    let limit = query.limit.unwrap_or(state.config.default_page_limit);

    let page = state
        .engine
        .list_conversations(me, audience, query.skip, limit)
        .await?;

    Ok(Json(page))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
