//! Web configuration pages.
//!
//! Each page is a [`ConfigBlock`]: a titled list of form fields whose values
//! live either in the web server's `web.conf` or in the daemon's config,
//! reached over RPC. Blocks are registered by name in a [`ConfigRegistry`]
//! and served under `/config/<name>` to logged-in users.

pub mod blocks;
pub mod forms;
pub mod login;
pub mod pages;

pub use blocks::{
    ConfigBlock, ConfigRegistry, DaemonConfigBlock, DaemonTarget, FormError, PasswordBlock,
    WebConfigBlock, WebContext,
};
pub use forms::{Field, FieldKind, Form, ValidationError};
pub use login::{LOGIN_FAILED, LOGIN_PATH, SESSION_COOKIE};
pub use pages::{router, WebState};

use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::client::DaemonClient;
use crate::common::is_ip;
use crate::config::{defaults_from, ConfigManager, ConfigMap};

pub const WEB_CONFIG: &str = "web.conf";

/// `web.conf` defaults. The initial password is `deluge`.
pub fn web_defaults() -> ConfigMap {
    let salt = blocks::new_salt();
    let pwd_sha256 = blocks::hash_password(&salt, "deluge");
    defaults_from(json!({
        "port": 8112,
        "interface": "0.0.0.0",
        "base": "/",
        "template": "deluge",
        "button_style": 2,
        "cache_templates": false,
        "auto_refresh": false,
        "auto_refresh_secs": 10,
        "session_timeout": 3600,
        "pwd_salt": salt,
        "pwd_sha256": pwd_sha256,
        "default_daemon": "127.0.0.1:58846",
    }))
}

#[derive(Debug, Clone)]
pub struct WebOptions {
    pub port: Option<u16>,
    pub interface: Option<String>,
    /// Daemon host.
    pub host: String,
    pub daemon_port: u16,
    pub username: String,
    pub password: String,
    pub config_dir: PathBuf,
}

/// Load `web.conf`, connect to the daemon and serve the config pages until
/// `shutdown` is cancelled.
pub async fn run(options: WebOptions, shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut config = ConfigManager::load(options.config_dir.join(WEB_CONFIG), web_defaults())?;
    if let Some(port) = options.port {
        config.set("port", json!(port))?;
    }
    match options.interface.as_deref() {
        Some(i) if is_ip(i) => {
            config.set("interface", json!(i))?;
        }
        Some(i) => tracing::error!("Invalid interface (must be IP Address): {}", i),
        None => {}
    }
    // Persist the generated password salt on first run.
    if !config.path().exists() {
        config.save()?;
    }

    let port: u16 = config.get_or("port", 8112);
    let interface: String = config.get_or("interface", "0.0.0.0".to_string());

    let client = Arc::new(DaemonClient::new().with_config_dir(&options.config_dir));
    let ctx = WebContext::new(config, client.clone()).with_daemon(DaemonTarget {
        host: options.host.clone(),
        port: options.daemon_port,
        username: options.username.clone(),
        password: options.password.clone(),
    });
    // Daemon pages retry on their own; this only reports early.
    if let Err(e) = ctx.daemon_client().await {
        tracing::warn!(
            "Unable to connect to daemon at {}:{}: {}",
            options.host,
            options.daemon_port,
            e
        );
    }

    let state = WebState::new(ConfigRegistry::with_builtin_blocks(), ctx);

    let addr: SocketAddr = format!("{}:{}", interface, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("deluge-web listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    client.disconnect().await;
    tracing::info!("deluge-web stopped");
    Ok(())
}
