//! The daemon object: owns the core, accepts RPC clients and guards its
//! config directory with a PID file.

mod state;
pub mod pidfile;

pub use state::{Core, SetConfigOutcome};
pub use pidfile::{is_daemon_running, read_pid_file, remove_pid_file, write_pid_file, PID_FILE};

use anyhow::Result;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthManager, SessionTokens};
use crate::common::{cancel_on_signal, get_version, is_ip};
use crate::config::ConfigManager;
use crate::error::DelugeError;
use crate::preferences::{default_prefs, CORE_CONFIG};
use crate::rpc::{self, RpcState};
use crate::session::Session;

#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    /// Interface the engine listens on for peers.
    pub listen_interface: Option<String>,
    /// Interface the RPC server binds to.
    pub ui_interface: Option<String>,
    pub port: Option<u16>,
    pub read_only_config_keys: Vec<String>,
    pub config_dir: PathBuf,
}

pub struct Daemon {
    core: Arc<RwLock<Core>>,
    auth: Arc<AuthManager>,
    tokens: Arc<SessionTokens>,
    shutdown: CancellationToken,
    interface: String,
    port: u16,
    pid_file: PathBuf,
}

impl Daemon {
    /// Load `core.conf` and the auth file, apply command line overrides and
    /// push the preferences into `session`.
    pub fn new(options: DaemonOptions, session: Box<dyn Session>) -> Result<Self, DelugeError> {
        let config_dir = options.config_dir.clone();
        std::fs::create_dir_all(&config_dir)?;
        tracing::info!("Deluge daemon {} starting", get_version());
        tracing::debug!("Config directory: {}", config_dir.display());

        let mut config = ConfigManager::load(config_dir.join(CORE_CONFIG), default_prefs(&config_dir))?;

        if let Some(listen) = options.listen_interface.as_deref().filter(|s| !s.is_empty()) {
            if is_ip(listen) {
                config.set("listen_interface", serde_json::json!(listen))?;
            } else {
                tracing::error!("Invalid listen interface (must be IP Address): {}", listen);
            }
        }

        let port = match options.port {
            Some(p) => p,
            None => config.get_or("daemon_port", 58846u16),
        };

        let interface = match options.ui_interface.as_deref() {
            Some(i) if is_ip(i) => i.to_string(),
            Some(i) => {
                tracing::error!("Invalid UI interface (must be IP Address): {}", i);
                default_ui_interface(&config)
            }
            None => default_ui_interface(&config),
        };

        let auth = AuthManager::load(&config_dir)?;

        let read_only = options.read_only_config_keys.clone();
        if !read_only.is_empty() {
            tracing::info!("Read-only config keys: {}", read_only.join(", "));
        }
        let mut core = Core::new(config, session, read_only);
        core.start();

        Ok(Self {
            core: Arc::new(RwLock::new(core)),
            auth: Arc::new(auth),
            tokens: Arc::new(SessionTokens::new()),
            shutdown: CancellationToken::new(),
            interface,
            port,
            pid_file: config_dir.join(PID_FILE),
        })
    }

    pub fn core(&self) -> Arc<RwLock<Core>> {
        self.core.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// Cancel to stop a running daemon.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn rpc_state(&self) -> RpcState {
        RpcState {
            core: self.core.clone(),
            auth: self.auth.clone(),
            tokens: self.tokens.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Bind the RPC listener and serve until Ctrl+C, SIGTERM or an RPC
    /// shutdown request.
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.interface, self.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve RPC on an already bound listener.
    ///
    /// The PID file exists exactly while the listener is up. `core.conf` is
    /// saved on the way out.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> Result<()> {
        let bound = listener.local_addr()?;
        tracing::info!("Deluge daemon listening on {}", bound);

        write_pid_file(&self.pid_file, std::process::id(), bound.port())?;

        let shutdown = self.shutdown.clone();
        cancel_on_signal(shutdown.clone());

        let app = rpc::router(self.rpc_state());
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        tracing::info!("Deluge daemon shutting down");
        {
            let mut core = self.core.write().await;
            core.stop();
            if let Err(e) = core.save() {
                tracing::error!("Failed to save core config: {}", e);
            }
        }
        remove_pid_file(&self.pid_file);
        served?;
        Ok(())
    }
}

fn default_ui_interface(config: &ConfigManager) -> String {
    if config.get_or("allow_remote", false) {
        "0.0.0.0".to_string()
    } else {
        "127.0.0.1".to_string()
    }
}
