//! Saved daemon hosts (`hostlist.conf`) and their online status.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use deluge_core::client::DaemonClient;
use deluge_core::config::{defaults_from, get_config_dir, ConfigError, ConfigManager};

pub const HOSTLIST_CONFIG: &str = "hostlist.conf";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 58846;

#[derive(Debug, thiserror::Error)]
pub enum HostListError {
    #[error("Invalid port. Must be an integer")]
    InvalidPort,

    #[error("Host already in list")]
    AlreadyInList,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

type HostTuple = (String, String, u16, String, String);

impl From<HostTuple> for HostEntry {
    fn from((id, host, port, username, password): HostTuple) -> Self {
        Self {
            id,
            host,
            port,
            username,
            password,
        }
    }
}

impl HostEntry {
    fn to_value(&self) -> Value {
        json!([self.id, self.host, self.port, self.username, self.password])
    }

    pub fn is_localhost(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1")
    }
}

fn new_host_id(seed: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    hex::encode(Sha256::digest(format!("{}{}", now, seed)))[..40].to_string()
}

fn default_hosts() -> Value {
    let local = HostEntry {
        id: new_host_id(DEFAULT_HOST),
        host: DEFAULT_HOST.to_string(),
        port: DEFAULT_PORT,
        username: String::new(),
        password: String::new(),
    };
    json!({ "hosts": [local.to_value()] })
}

pub struct HostList {
    config: ConfigManager,
}

impl HostList {
    pub fn load(config_dir: &Path) -> Result<Self, HostListError> {
        let path = get_config_dir(config_dir, HOSTLIST_CONFIG);
        let config = ConfigManager::load(path, defaults_from(default_hosts()))?;
        // The default entry's id must stay stable across runs.
        if !config.path().exists() {
            config.save()?;
        }
        Ok(Self { config })
    }

    pub fn path(&self) -> PathBuf {
        self.config.path().to_path_buf()
    }

    /// Malformed entries are skipped.
    pub fn hosts(&self) -> Vec<HostEntry> {
        let raw: Vec<Value> = self.config.get_or("hosts", Vec::new());
        raw.into_iter()
            .filter_map(|v| serde_json::from_value::<HostTuple>(v).ok())
            .map(HostEntry::from)
            .collect()
    }

    pub fn get_host(&self, id: &str) -> Option<HostEntry> {
        self.hosts().into_iter().find(|h| h.id == id)
    }

    fn store(&mut self, hosts: &[HostEntry]) -> Result<(), HostListError> {
        let values: Vec<Value> = hosts.iter().map(HostEntry::to_value).collect();
        self.config.set("hosts", Value::Array(values))?;
        self.config.save()?;
        Ok(())
    }

    /// Add a host and return its id. `port` is taken as typed by the user.
    pub fn add_host(
        &mut self,
        host: &str,
        port: &str,
        username: &str,
        password: &str,
    ) -> Result<String, HostListError> {
        let port: u16 = port.trim().parse().map_err(|_| HostListError::InvalidPort)?;
        let mut hosts = self.hosts();
        if hosts
            .iter()
            .any(|h| h.host == host && h.port == port && h.username == username)
        {
            return Err(HostListError::AlreadyInList);
        }
        let id = new_host_id(host);
        hosts.push(HostEntry {
            id: id.clone(),
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        });
        self.store(&hosts)?;
        tracing::info!("Added host {}:{}", host, port);
        Ok(id)
    }

    /// Returns whether a host was removed.
    pub fn remove_host(&mut self, id: &str) -> Result<bool, HostListError> {
        let mut hosts = self.hosts();
        let before = hosts.len();
        hosts.retain(|h| h.id != id);
        if hosts.len() == before {
            return Ok(false);
        }
        tracing::debug!("deleting host: {}", id);
        self.store(&hosts)?;
        Ok(true)
    }
}

/// Daemon version when `host` answers and accepts its credentials.
pub async fn host_status(host: &HostEntry, config_dir: &Path) -> Option<String> {
    let client = DaemonClient::new().with_config_dir(config_dir);
    let version = client
        .connect(&host.host, host.port, &host.username, &host.password)
        .await
        .ok();
    client.disconnect().await;
    version
}

/// Probe every host concurrently. Hosts that are online map to their
/// daemon version; offline hosts are absent.
pub async fn refresh_statuses(hosts: Vec<HostEntry>, config_dir: PathBuf) -> HashMap<String, String> {
    let mut set = tokio::task::JoinSet::new();
    for host in hosts {
        let dir = config_dir.clone();
        set.spawn(async move {
            let status = host_status(&host, &dir).await;
            (host.id, status)
        });
    }
    let mut online = HashMap::new();
    while let Some(joined) = set.join_next().await {
        if let Ok((id, Some(version))) = joined {
            online.insert(id, version);
        }
    }
    online
}
