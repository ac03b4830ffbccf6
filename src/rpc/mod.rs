//! Daemon RPC served over HTTP/JSON.

pub mod auth;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthLevel, AuthManager, SessionTokens};
use crate::common::get_version;
use crate::config::ConfigMap;
use crate::daemon::Core;
use crate::error::DelugeError;
pub use auth::{AuthContext, TOKEN_HEADER};

#[derive(Clone)]
pub struct RpcState {
    pub core: Arc<RwLock<Core>>,
    pub auth: Arc<AuthManager>,
    pub tokens: Arc<SessionTokens>,
    pub shutdown: CancellationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub auth_level: AuthLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonInfo {
    pub version: String,
}

pub fn router(state: RpcState) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/config", get(get_config).put(set_config))
        .route("/api/config/:key", get(get_config_value))
        .route("/api/torrents", get(get_torrents))
        .route("/api/daemon/shutdown", post(shutdown))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/api/daemon/info", get(daemon_info))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/daemon/info
async fn daemon_info() -> impl IntoResponse {
    Json(DaemonInfo {
        version: get_version().to_string(),
    })
}

/// POST /api/auth/login
async fn login(
    State(state): State<RpcState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, DelugeError> {
    let level = state.auth.authorize(&req.username, &req.password)?;
    let token = state.tokens.issue(&req.username, level);
    Ok(Json(LoginResponse {
        token,
        auth_level: level,
    }))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<RpcState>,
    Extension(ctx): Extension<AuthContext>,
) -> impl IntoResponse {
    state.tokens.revoke(&ctx.token);
    tracing::info!("{} logged out", ctx.username);
    Json(json!({ "success": true }))
}

/// GET /api/config
async fn get_config(
    State(state): State<RpcState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ConfigMap>, DelugeError> {
    ctx.require(AuthLevel::ReadOnly)?;
    let core = state.core.read().await;
    Ok(Json(core.get_config()))
}

/// GET /api/config/:key
async fn get_config_value(
    Path(key): Path<String>,
    State(state): State<RpcState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, DelugeError> {
    ctx.require(AuthLevel::ReadOnly)?;
    let core = state.core.read().await;
    let value = core.get_config_value(&key)?;
    Ok(Json(json!({ "key": key, "value": value })))
}

/// PUT /api/config
async fn set_config(
    State(state): State<RpcState>,
    Extension(ctx): Extension<AuthContext>,
    Json(values): Json<ConfigMap>,
) -> Result<impl IntoResponse, DelugeError> {
    ctx.require(AuthLevel::Normal)?;
    let mut core = state.core.write().await;
    let outcome = core.set_config(values)?;
    Ok((StatusCode::OK, Json(outcome)))
}

/// GET /api/torrents
async fn get_torrents(
    State(state): State<RpcState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, DelugeError> {
    ctx.require(AuthLevel::ReadOnly)?;
    let core = state.core.read().await;
    Ok(Json(core.torrents()))
}

/// POST /api/daemon/shutdown
async fn shutdown(
    State(state): State<RpcState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, DelugeError> {
    ctx.require(AuthLevel::Admin)?;
    tracing::info!("Shutdown requested over RPC by {}", ctx.username);
    state.shutdown.cancel();
    Ok(Json(json!({ "success": true })))
}
