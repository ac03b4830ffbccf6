//! Token check for RPC routes.
//!
//! `POST /api/auth/login` hands out a token; every protected request carries
//! it in the `X-Deluge-Token` header. The resolved login is stored as a
//! request extension for the handlers.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use super::RpcState;
use crate::auth::AuthLevel;
use crate::error::DelugeError;

pub const TOKEN_HEADER: &str = "X-Deluge-Token";

/// Who is calling, attached to each authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub token: String,
    pub username: String,
    pub level: AuthLevel,
}

impl AuthContext {
    pub fn require(&self, required: AuthLevel) -> Result<(), DelugeError> {
        if self.level < required {
            tracing::debug!(
                "{} (level {}) denied, needs level {}",
                self.username,
                self.level.as_u8(),
                required.as_u8()
            );
            return Err(DelugeError::NotAuthorized {
                current: self.level.as_u8(),
                required: required.as_u8(),
            });
        }
        Ok(())
    }
}

pub async fn auth_middleware(
    State(state): State<RpcState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, DelugeError> {
    let provided = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    match state.tokens.lookup(&provided) {
        Some(session) => {
            req.extensions_mut().insert(AuthContext {
                token: provided,
                username: session.username,
                level: session.level,
            });
            Ok(next.run(req).await)
        }
        None => {
            tracing::warn!("RPC auth failed for {}", req.uri());
            Err(DelugeError::AuthenticationRequired {
                username: String::new(),
            })
        }
    }
}
