//! Config pages over HTTP, with a live daemon behind the daemon blocks.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

use deluge_core::client::DaemonClient;
use deluge_core::config::ConfigManager;
use deluge_core::daemon::{Daemon, DaemonOptions};
use deluge_core::session::MemorySession;
use deluge_core::webui::pages::{INVALID, SAVED};
use deluge_core::webui::{
    router, web_defaults, ConfigRegistry, DaemonTarget, WebContext, WebState, LOGIN_FAILED,
    LOGIN_PATH, SESSION_COOKIE, WEB_CONFIG,
};

struct Reply {
    status: StatusCode,
    body: String,
    location: Option<String>,
    cookie: Option<String>,
}

fn context(dir: &Path, client: Arc<DaemonClient>) -> WebContext {
    let config = ConfigManager::load(dir.join(WEB_CONFIG), web_defaults()).unwrap();
    WebContext::new(config, client)
}

fn web_app(ctx: WebContext) -> axum::Router {
    router(WebState::new(ConfigRegistry::with_builtin_blocks(), ctx))
}

/// A local daemon reached with the localclient account from `dir`.
fn local_daemon(dir: &Path, port: u16) -> WebContext {
    let client = Arc::new(DaemonClient::new().with_config_dir(dir));
    context(dir, client).with_daemon(DaemonTarget {
        host: "127.0.0.1".into(),
        port,
        username: String::new(),
        password: String::new(),
    })
}

async fn fetch(app: &axum::Router, req: Request<Body>) -> Reply {
    let resp = app.clone().oneshot(req).await.unwrap();
    let read = |name: header::HeaderName| {
        resp.headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };
    let location = read(header::LOCATION);
    let cookie = read(header::SET_COOKIE);
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    Reply {
        status,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
        location,
        cookie,
    }
}

fn get(uri: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(session) = session {
        builder = builder.header(header::COOKIE, session);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(session) = session {
        builder = builder.header(header::COOKIE, session);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Log in with the default password and return the `Cookie` header value.
async fn login(app: &axum::Router) -> String {
    let reply = fetch(app, post_form(LOGIN_PATH, "password=deluge", None)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER, "{}", reply.body);
    assert_eq!(reply.location.as_deref(), Some("/config/template"));
    let cookie = reply.cookie.unwrap();
    let pair = cookie.split(';').next().unwrap().to_string();
    assert!(pair.starts_with(&format!("{}=", SESSION_COOKIE)));
    pair
}

#[tokio::test]
async fn test_pages_need_a_login() {
    let dir = tempfile::tempdir().unwrap();
    let app = web_app(context(dir.path(), Arc::new(DaemonClient::new())));

    let reply = fetch(&app, get("/config/template", None)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some(LOGIN_PATH));

    let reply = fetch(&app, get("/config/template", Some("_session_id=made-up"))).await;
    assert_eq!(reply.location.as_deref(), Some(LOGIN_PATH));

    let reply = fetch(&app, get(LOGIN_PATH, None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains(r#"name="password""#));

    let reply = fetch(&app, post_form(LOGIN_PATH, "password=guess", None)).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert!(reply.body.contains(LOGIN_FAILED));
    assert!(reply.cookie.is_none());

    let session = login(&app).await;
    let reply = fetch(&app, get("/config/template", Some(&session))).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = fetch(&app, post_form("/logout", "", Some(&session))).await;
    assert_eq!(reply.location.as_deref(), Some(LOGIN_PATH));
    assert!(reply.cookie.unwrap().contains("Max-Age=0"));
    let reply = fetch(&app, get("/config/template", Some(&session))).await;
    assert_eq!(reply.location.as_deref(), Some(LOGIN_PATH));
}

#[tokio::test]
async fn test_index_redirects_and_unknown_page() {
    let dir = tempfile::tempdir().unwrap();
    let app = web_app(context(dir.path(), Arc::new(DaemonClient::new())));
    let session = login(&app).await;

    let reply = fetch(&app, get("/config/", Some(&session))).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some("/config/template"));

    let reply = fetch(&app, get("/config/nope", Some(&session))).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body, "no config page named:\"nope\"");

    let reply = fetch(&app, get("/config/template", Some(&session))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("<h2>Template</h2>"));
    assert!(reply.body.contains(r#"<option value="deluge" selected>deluge</option>"#));
    assert!(reply.body.contains(r#"<li class="selected"><a href="/config/template">"#));
}

#[tokio::test]
async fn test_web_server_page_validates_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let app = web_app(context(dir.path(), Arc::new(DaemonClient::new())));
    let session = login(&app).await;

    let reply = fetch(
        &app,
        post_form("/config/server", "port=abc&interface=0.0.0.0&session_timeout=3600", Some(&session)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains(INVALID));
    assert!(!reply.body.contains(SAVED));
    assert!(!reply.body.contains(r#"name="https""#));

    let reply = fetch(
        &app,
        post_form("/config/server", "port=8200&interface=127.0.0.1&session_timeout=600", Some(&session)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains(SAVED), "{}", reply.body);

    let saved = ConfigManager::load(dir.path().join(WEB_CONFIG), web_defaults()).unwrap();
    assert_eq!(saved.get("port"), Some(&json!(8200)));
    assert_eq!(saved.get("interface"), Some(&json!("127.0.0.1")));
    assert_eq!(saved.get("session_timeout"), Some(&json!(600)));

    // New sessions pick up the shorter timeout.
    let reply = fetch(&app, post_form(LOGIN_PATH, "password=deluge", None)).await;
    assert!(reply.cookie.unwrap().contains("Max-Age=600"));
}

#[tokio::test]
async fn test_password_page_shows_form_error() {
    let dir = tempfile::tempdir().unwrap();
    let app = web_app(context(dir.path(), Arc::new(DaemonClient::new())));
    let session = login(&app).await;

    let reply = fetch(
        &app,
        post_form(
            "/config/password",
            "old_password=wrong&new_password=a&new_password_confirm=a",
            Some(&session),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains(r#"<div class="error">Old password is invalid</div>"#));
    assert!(!reply.body.contains("wrong"));
}

#[tokio::test]
async fn test_daemon_page_goes_through_rpc() {
    let dir = tempfile::tempdir().unwrap();
    let options = DaemonOptions {
        ui_interface: Some("127.0.0.1".into()),
        read_only_config_keys: vec!["daemon_port".into()],
        config_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let daemon = Daemon::new(options, Box::new(MemorySession::new())).unwrap();
    let shutdown = daemon.shutdown_token();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let served = tokio::spawn(daemon.serve(listener));

    let ctx = local_daemon(dir.path(), port);
    let client = ctx.client.clone();
    let app = web_app(ctx);

    // Without a session nothing reaches the daemon.
    let reply = fetch(&app, get("/config/daemon", None)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some(LOGIN_PATH));
    let reply = fetch(&app, post_form("/config/daemon", "daemon_port=60000&allow_remote=on", None)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some(LOGIN_PATH));
    assert!(!reply.body.contains(SAVED));
    assert!(!client.connected());

    let session = login(&app).await;
    let reply = fetch(&app, get("/config/daemon", Some(&session))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains(r#"name="daemon_port" value="58846""#));

    let reply = fetch(
        &app,
        post_form("/config/daemon", "daemon_port=60000&allow_remote=on", Some(&session)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains(SAVED), "{}", reply.body);

    let config = client.get_config().await.unwrap();
    assert_eq!(config["allow_remote"], json!(true));
    assert_eq!(config["daemon_port"], json!(58846));

    client.disconnect().await;
    shutdown.cancel();
    served.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_daemon_started_after_web_ui() {
    let dir = tempfile::tempdir().unwrap();
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = reserved.local_addr().unwrap().port();
    drop(reserved);

    let ctx = local_daemon(dir.path(), port);
    let client = ctx.client.clone();
    let app = web_app(ctx);
    let session = login(&app).await;

    let reply = fetch(&app, get("/config/daemon", Some(&session))).await;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);

    let options = DaemonOptions {
        ui_interface: Some("127.0.0.1".into()),
        config_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let daemon = Daemon::new(options, Box::new(MemorySession::new())).unwrap();
    let shutdown = daemon.shutdown_token();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let served = tokio::spawn(daemon.serve(listener));

    let reply = fetch(&app, get("/config/daemon", Some(&session))).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert!(reply.body.contains(r#"name="daemon_port" value="58846""#));
    assert!(client.connected());

    // A dropped connection is picked up again on the next page.
    client.disconnect().await;
    let reply = fetch(&app, get("/config/network", Some(&session))).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert!(client.connected());

    client.disconnect().await;
    shutdown.cancel();
    served.await.unwrap().unwrap();
}
