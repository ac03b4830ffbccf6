//! RPC client used by the UI shell and the web pages to talk to a daemon.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use crate::auth::{get_localhost_auth, AuthLevel};
use crate::config::ConfigMap;
use crate::daemon::SetConfigOutcome;
use crate::error::DelugeError;
use crate::rpc::{DaemonInfo, LoginResponse, TOKEN_HEADER};
use crate::session::TorrentStatus;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type DisconnectCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
struct Connection {
    base_url: String,
    host: String,
    port: u16,
    username: String,
    token: String,
    level: AuthLevel,
    daemon_version: String,
}

pub struct DaemonClient {
    http: reqwest::Client,
    config_dir: Option<PathBuf>,
    conn: RwLock<Option<Connection>>,
    bytes_sent: AtomicU64,
    bytes_recv: AtomicU64,
    on_disconnect: Mutex<Option<DisconnectCallback>>,
}

impl std::fmt::Debug for DaemonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonClient")
            .field("connected", &self.connected())
            .field("bytes_sent", &self.get_bytes_sent())
            .field("bytes_recv", &self.get_bytes_recv())
            .finish()
    }
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

fn is_localhost(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "::1")
}

impl DaemonClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            http,
            config_dir: None,
            conn: RwLock::new(None),
            bytes_sent: AtomicU64::new(0),
            bytes_recv: AtomicU64::new(0),
            on_disconnect: Mutex::new(None),
        }
    }

    /// Config directory used to find local daemon credentials.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    fn connection(&self) -> Result<Connection, DelugeError> {
        self.conn
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| DelugeError::Connection("Not connected to a daemon".to_string()))
    }

    pub fn connected(&self) -> bool {
        self.conn.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// `(host, port, username)` of the current connection.
    pub fn connection_info(&self) -> Option<(String, u16, String)> {
        self.conn
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| (c.host.clone(), c.port, c.username.clone()))
    }

    pub fn auth_level(&self) -> Option<AuthLevel> {
        self.conn
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.level)
    }

    pub fn daemon_version(&self) -> Option<String> {
        self.conn
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.daemon_version.clone())
    }

    pub fn get_bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn get_bytes_recv(&self) -> u64 {
        self.bytes_recv.load(Ordering::Relaxed)
    }

    pub fn set_disconnect_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_disconnect.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(callback));
    }

    fn fire_disconnect(&self) {
        let guard = self.on_disconnect.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cb) = guard.as_ref() {
            cb();
        }
    }

    fn drop_connection(&self) -> bool {
        let had = self
            .conn
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        if had {
            self.fire_disconnect();
        }
        had
    }

    // ── Transport ─────────────────────────────────────

    async fn send_raw(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Vec<u8>), reqwest::Error> {
        let mut req = self.http.request(method, url);
        if let Some(token) = token {
            req = req.header(TOKEN_HEADER, token);
        }
        if let Some(body) = body {
            let payload = body.to_string().into_bytes();
            self.bytes_sent.fetch_add(payload.len() as u64, Ordering::Relaxed);
            req = req.header(CONTENT_TYPE, "application/json").body(payload);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?.to_vec();
        self.bytes_recv.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok((status, bytes))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, DelugeError> {
        let conn = self.connection()?;
        let url = format!("{}{}", conn.base_url, path);
        let (status, bytes) = match self.send_raw(method, &url, Some(&conn.token), body).await {
            Ok(r) => r,
            Err(e) if e.is_connect() || e.is_timeout() => {
                tracing::warn!("Lost connection to daemon at {}:{}: {}", conn.host, conn.port, e);
                self.drop_connection();
                return Err(DelugeError::Connection(e.to_string()));
            }
            Err(e) => return Err(DelugeError::Rpc(e.to_string())),
        };
        if !status.is_success() {
            return Err(error_from_response(status, &bytes, &conn.username));
        }
        serde_json::from_slice(&bytes).map_err(|e| DelugeError::Rpc(e.to_string()))
    }

    // ── Session ─────────────────────────────────────

    /// Connect and log in. An empty username on localhost uses the local
    /// daemon's `localclient` credentials when they can be found.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<String, DelugeError> {
        if self.connected() {
            self.disconnect().await;
        }

        let (username, password) = match (&self.config_dir, username.is_empty() && is_localhost(host)) {
            (Some(dir), true) => get_localhost_auth(dir)
                .unwrap_or_else(|| (username.to_string(), password.to_string())),
            _ => (username.to_string(), password.to_string()),
        };

        let base_url = format!("http://{}:{}", url_host(host), port);
        tracing::info!("Connecting to daemon at {}:{}..", host, port);

        let (status, bytes) = self
            .send_raw(Method::GET, &format!("{}/api/daemon/info", base_url), None, None)
            .await
            .map_err(|e| DelugeError::Connection(e.to_string()))?;
        if !status.is_success() {
            return Err(DelugeError::Connection(format!("daemon info returned {}", status)));
        }
        let info: DaemonInfo =
            serde_json::from_slice(&bytes).map_err(|e| DelugeError::Rpc(e.to_string()))?;

        let body = json!({ "username": username, "password": password });
        let (status, bytes) = self
            .send_raw(Method::POST, &format!("{}/api/auth/login", base_url), None, Some(&body))
            .await
            .map_err(|e| DelugeError::Connection(e.to_string()))?;
        if status == StatusCode::UNAUTHORIZED {
            tracing::info!("Login rejected for {:?} at {}:{}", username, host, port);
            return Err(if username.is_empty() {
                DelugeError::AuthenticationRequired { username }
            } else {
                DelugeError::BadLogin { username }
            });
        }
        if !status.is_success() {
            return Err(error_from_response(status, &bytes, &username));
        }
        let login: LoginResponse =
            serde_json::from_slice(&bytes).map_err(|e| DelugeError::Rpc(e.to_string()))?;

        tracing::info!(
            "Connected to daemon {} at {}:{} as {} (level {})",
            info.version,
            host,
            port,
            username,
            login.auth_level.as_u8()
        );
        *self.conn.write().unwrap_or_else(|e| e.into_inner()) = Some(Connection {
            base_url,
            host: host.to_string(),
            port,
            username,
            token: login.token,
            level: login.auth_level,
            daemon_version: info.version.clone(),
        });
        Ok(info.version)
    }

    /// Log out and forget the connection. Fires the disconnect callback when
    /// a connection was open.
    pub async fn disconnect(&self) {
        if let Ok(conn) = self.connection() {
            let url = format!("{}/api/auth/logout", conn.base_url);
            if let Err(e) = self
                .send_raw(Method::POST, &url, Some(&conn.token), None)
                .await
            {
                tracing::debug!("Logout failed: {}", e);
            }
        }
        self.drop_connection();
    }

    // ── Daemon calls ─────────────────────────────────────

    pub async fn daemon_info(&self) -> Result<DaemonInfo, DelugeError> {
        self.call(Method::GET, "/api/daemon/info", None).await
    }

    pub async fn get_config(&self) -> Result<ConfigMap, DelugeError> {
        self.call(Method::GET, "/api/config", None).await
    }

    pub async fn get_config_value(&self, key: &str) -> Result<Value, DelugeError> {
        let data: Value = self
            .call(Method::GET, &format!("/api/config/{}", key), None)
            .await?;
        Ok(data.get("value").cloned().unwrap_or(Value::Null))
    }

    pub async fn set_config(&self, values: ConfigMap) -> Result<SetConfigOutcome, DelugeError> {
        self.call(Method::PUT, "/api/config", Some(&Value::Object(values)))
            .await
    }

    pub async fn get_torrents(&self) -> Result<Vec<TorrentStatus>, DelugeError> {
        self.call(Method::GET, "/api/torrents", None).await
    }

    pub async fn shutdown_daemon(&self) -> Result<(), DelugeError> {
        let _: Value = self.call(Method::POST, "/api/daemon/shutdown", None).await?;
        self.drop_connection();
        Ok(())
    }
}

fn url_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

fn error_from_response(status: StatusCode, body: &[u8], username: &str) -> DelugeError {
    let parsed: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let message = parsed
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("daemon returned {}", status));
    match parsed.get("error_code").and_then(Value::as_str) {
        Some("AUTHENTICATION_REQUIRED") => DelugeError::AuthenticationRequired {
            username: username.to_string(),
        },
        Some("BAD_LOGIN") => DelugeError::BadLogin {
            username: username.to_string(),
        },
        Some("NOT_AUTHORIZED") => {
            let field = |name: &str| {
                parsed
                    .get(name)
                    .and_then(Value::as_u64)
                    .unwrap_or_default() as u8
            };
            DelugeError::NotAuthorized {
                current: field("current"),
                required: field("required"),
            }
        }
        Some("UNKNOWN_CONFIG_KEY") => DelugeError::UnknownConfigKey(
            parsed
                .get("key")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        _ => DelugeError::Rpc(message),
    }
}

// ── Local daemon process ─────────────────────────────────────

fn find_daemon_binary() -> PathBuf {
    let exe = if cfg!(target_os = "windows") { "deluged.exe" } else { "deluged" };
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join(exe)))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from(exe))
}

/// Spawn the process detached so it outlives the caller.
fn spawn_detached(cmd: &mut Command) -> std::io::Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x00000008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    cmd.spawn()?;
    Ok(())
}

/// Start a local `deluged` on `port` and wait until it accepts connections.
pub async fn start_daemon(port: u16, config_dir: Option<&Path>) -> Result<(), DelugeError> {
    let binary = find_daemon_binary();
    let mut cmd = Command::new(&binary);
    cmd.arg("--port").arg(port.to_string());
    if let Some(dir) = config_dir {
        cmd.arg("--config").arg(dir);
    }
    tracing::info!("Starting daemon {} on port {}", binary.display(), port);
    spawn_detached(&mut cmd).map_err(|e| {
        DelugeError::Connection(format!("Unable to start daemon {}: {}", binary.display(), e))
    })?;

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    for _ in 0..20 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Err(DelugeError::Connection(format!(
        "Daemon did not start listening on port {}",
        port
    )))
}
