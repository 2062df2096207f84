//! HTTP façade over the chat registry and the favorites store.
//!
//! Routes mirror the backend surface the web client expects: create a chat,
//! query it, read its history and tool-call log, and list the caller's
//! favorites. User identity is an opaque cookie issued on first chat
//! creation; a chat's owner is fixed to whatever identity was current then.
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use poke_chat::{ChatError, ChatRegistry};
use poke_favorites::FavoritesStore;


/// Name of the long-lived identity cookie.
pub const USER_COOKIE: &str = "poke_user_id";

const USER_COOKIE_MAX_AGE_SECONDS: u64 = 60 * 60 * 24 * 365;

#[derive(Clone)]
/// Shared handler state.
pub struct AppState {
    pub registry: Arc<ChatRegistry>,
    pub favorites: Arc<FavoritesStore>,
}

/// Maps registry/validation failures onto the JSON error envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        let status = match error {
            ChatError::UnknownSession(_) => StatusCode::NOT_FOUND,
            ChatError::NotOwner(_) => StatusCode::FORBIDDEN,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Builds the application router with permissive CORS, mirroring the
/// original backend's blanket allowance for the browser client.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/create_chat", post(create_chat))
        .route("/query", post(query))
        .route("/chat_history/{chat_id}", get(chat_history))
        .route("/tool_calls/{chat_id}", get(tool_calls))
        .route("/favorites", get(favorites))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `bind` and serves the router until the process exits.
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let addr = listener.local_addr().context("failed to resolve bind address")?;
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, build_router(state))
        .await
        .context("gateway server terminated")
}

async fn index() -> &'static str {
    "PokeGPT backend is running..."
}

async fn create_chat(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (user_id, issued) = match cookie_user_id(&headers) {
        Some(existing) => (existing, false),
        None => (Uuid::new_v4().to_string(), true),
    };

    let chat_id = state.registry.create_chat(Some(&user_id));
    let mut response = Json(json!({ "chat_id": chat_id })).into_response();

    if issued {
        let cookie = format!(
            "{USER_COOKIE}={user_id}; Path=/; Max-Age={USER_COOKIE_MAX_AGE_SECONDS}; SameSite=Lax"
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(error) => {
                tracing::warn!(%error, "failed to render identity cookie");
            }
        }
    }

    response
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    chat_id: String,
}

async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("No query provided"));
    }
    if request.chat_id.trim().is_empty() {
        return Err(ApiError::bad_request("No chat_id provided"));
    }

    let user_id = cookie_user_id(&headers);
    let outcome = state
        .registry
        .run_turn(&request.chat_id, &request.query, user_id.as_deref())
        .await?;

    Ok(Json(json!({
        "response": outcome.response,
        "tool_calls": outcome.tool_calls,
    })))
}

async fn chat_history(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let history = state.registry.get_history(&chat_id).await?;
    Ok(Json(json!({ "history": history })))
}

async fn tool_calls(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let owner = state.registry.get_owner(&chat_id).await?;
    let user_id = cookie_user_id(&headers);
    if owner.as_deref() != user_id.as_deref() {
        return Err(ChatError::NotOwner(chat_id).into());
    }

    let log = state.registry.get_tool_calls(&chat_id).await?;
    Ok(Json(json!({ "tool_calls": log })))
}

async fn favorites(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let user_id = cookie_user_id(&headers).unwrap_or_default();
    let snapshot = state.favorites.get_user_favorites(&user_id);
    Json(json!(snapshot))
}

/// Reads the identity cookie from a `Cookie` header, if present.
fn cookie_user_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        let Some((name, value)) = pair.trim().split_once('=') else {
            continue;
        };
        if name.trim() == USER_COOKIE && !value.trim().is_empty() {
            return Some(value.trim().to_string());
        }
    }
    None
}
