//! Web login.
//!
//! The pages share one password, stored salted in `web.conf`. A successful
//! login sets a session cookie; sessions expire after `session_timeout`
//! seconds without a request.

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, Request, StatusCode,
    },
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Form as PostForm,
};
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Duration;

use super::blocks::check_password;
use super::pages::{escape, WebState};
use crate::auth::AuthLevel;
use crate::config::ConfigManager;

pub const SESSION_COOKIE: &str = "_session_id";
pub const LOGIN_PATH: &str = "/login";
pub const LOGIN_FAILED: &str = "Login failed";

const WEB_USER: &str = "web";
const DEFAULT_SESSION_TIMEOUT: u64 = 3600;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LoginForm {
    #[serde(default)]
    password: String,
}

fn session_timeout(config: &ConfigManager) -> Duration {
    Duration::from_secs(config.get_or("session_timeout", DEFAULT_SESSION_TIMEOUT))
}

/// Pick up a changed `session_timeout` without a restart.
async fn sync_timeout(state: &WebState) -> Duration {
    let timeout = session_timeout(&*state.ctx.config.lock().await);
    state.sessions.set_ttl(timeout);
    timeout
}

fn cookie_value(raw: &str, name: &str) -> Option<String> {
    raw.split(';').find_map(|entry| {
        let (key, value) = entry.split_once('=')?;
        let value = value.trim();
        (key.trim() == name && !value.is_empty()).then(|| value.to_string())
    })
}

pub(crate) fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|raw| cookie_value(raw, SESSION_COOKIE))
}

fn session_cookie(token: &str, timeout: Duration) -> Result<HeaderValue, StatusCode> {
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Strict",
        SESSION_COOKIE,
        token,
        timeout.as_secs()
    ))
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("_session_id=; HttpOnly; Path=/; Max-Age=0; SameSite=Strict")
}

/// GET /login
pub(crate) async fn login_page() -> Html<String> {
    render_login("")
}

/// POST /login
pub(crate) async fn login(
    State(state): State<WebState>,
    PostForm(form): PostForm<LoginForm>,
) -> Response {
    let accepted = check_password(&*state.ctx.config.lock().await, &form.password);
    if !accepted {
        tracing::warn!("Web login failed");
        return (StatusCode::FORBIDDEN, render_login(LOGIN_FAILED)).into_response();
    }

    let timeout = sync_timeout(&state).await;
    let token = state.sessions.issue(WEB_USER, AuthLevel::Admin);
    let cookie = match session_cookie(&token, timeout) {
        Ok(cookie) => cookie,
        Err(status) => return status.into_response(),
    };
    let mut resp = Redirect::to("/config/template").into_response();
    resp.headers_mut().insert(SET_COOKIE, cookie);
    resp
}

/// POST /logout
pub(crate) async fn logout(State(state): State<WebState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_from_headers(&headers) {
        state.sessions.revoke(&token);
    }
    let mut resp = Redirect::to(LOGIN_PATH).into_response();
    resp.headers_mut().insert(SET_COOKIE, clear_session_cookie());
    resp
}

/// Send requests without a live session to the login page.
pub(crate) async fn require_login(
    State(state): State<WebState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    sync_timeout(&state).await;
    let live = session_from_headers(req.headers())
        .is_some_and(|token| state.sessions.lookup(&token).is_some());
    if live {
        return next.run(req).await;
    }
    tracing::debug!("{} {} needs a login", req.method(), req.uri().path());
    Redirect::to(LOGIN_PATH).into_response()
}

fn render_login(error: &str) -> Html<String> {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Deluge: Login</title></head><body>\n\
         <div id=\"login\"><h2>Login</h2>\n",
    );
    if !error.is_empty() {
        let _ = writeln!(html, "<div class=\"error\">{}</div>", escape(error));
    }
    let _ = writeln!(
        html,
        "<form method=\"post\" action=\"{}\">\
         <label for=\"password\">Password</label> \
         <input type=\"password\" id=\"password\" name=\"password\" value=\"\">\
         <input type=\"submit\" value=\"Login\"></form></div>\n</body></html>",
        LOGIN_PATH
    );
    Html(html)
}
