//! Configuration blocks: a titled set of fields plus where its values live.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::forms::{Field, ValidationError};
use crate::client::DaemonClient;
use crate::config::{ConfigError, ConfigManager, ConfigMap};
use crate::error::DelugeError;

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    /// Shown on the page as the form error.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Deluge(#[from] DelugeError),
}

impl From<ConfigError> for FormError {
    fn from(e: ConfigError) -> Self {
        Self::Deluge(DelugeError::Config(e))
    }
}

/// Where the daemon blocks log in.
#[derive(Debug, Clone)]
pub struct DaemonTarget {
    pub host: String,
    pub port: u16,
    /// Empty on localhost uses the localclient account.
    pub username: String,
    pub password: String,
}

/// What a block needs to load and store its values.
#[derive(Clone)]
pub struct WebContext {
    /// `web.conf`
    pub config: Arc<Mutex<ConfigManager>>,
    pub client: Arc<DaemonClient>,
    daemon: Option<DaemonTarget>,
    reconnect: Arc<Mutex<()>>,
}

impl WebContext {
    pub fn new(config: ConfigManager, client: Arc<DaemonClient>) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            client,
            daemon: None,
            reconnect: Arc::new(Mutex::new(())),
        }
    }

    /// Reconnect to `target` whenever a daemon block finds the client
    /// disconnected.
    pub fn with_daemon(mut self, target: DaemonTarget) -> Self {
        self.daemon = Some(target);
        self
    }

    pub fn daemon(&self) -> Option<&DaemonTarget> {
        self.daemon.as_ref()
    }

    /// The daemon client, logged in again if the connection was lost.
    pub async fn daemon_client(&self) -> Result<&DaemonClient, DelugeError> {
        if self.client.connected() {
            return Ok(self.client.as_ref());
        }
        let Some(target) = &self.daemon else {
            return Ok(self.client.as_ref());
        };
        let _guard = self.reconnect.lock().await;
        if !self.client.connected() {
            let version = self
                .client
                .connect(&target.host, target.port, &target.username, &target.password)
                .await?;
            tracing::info!("Connected to daemon {} at {}:{}", version, target.host, target.port);
        }
        Ok(self.client.as_ref())
    }
}

#[async_trait]
pub trait ConfigBlock: Send + Sync {
    fn title(&self) -> &str;

    fn info(&self) -> &str {
        ""
    }

    fn fields(&self) -> Vec<Field>;

    async fn initial_data(&self, ctx: &WebContext) -> Result<ConfigMap, FormError>;

    async fn save(&self, ctx: &WebContext, data: ConfigMap) -> Result<(), FormError>;

    async fn post_save(&self, _ctx: &WebContext) -> Result<(), FormError> {
        Ok(())
    }
}

/// Save cleaned form data through `block`. Empty optional values are not
/// written.
pub async fn start_save(
    block: &dyn ConfigBlock,
    ctx: &WebContext,
    clean_data: &ConfigMap,
) -> Result<(), FormError> {
    let data: ConfigMap = clean_data
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    block.save(ctx, data).await?;
    block.post_save(ctx).await
}

// ── Web server config ────────────────────────────────

/// A block stored in the web server's own `web.conf`.
pub struct WebConfigBlock {
    title: String,
    info: String,
    fields: Vec<Field>,
}

impl WebConfigBlock {
    pub fn new(title: &str, info: &str, fields: Vec<Field>) -> Self {
        Self {
            title: title.to_string(),
            info: info.to_string(),
            fields,
        }
    }
}

#[async_trait]
impl ConfigBlock for WebConfigBlock {
    fn title(&self) -> &str {
        &self.title
    }

    fn info(&self) -> &str {
        &self.info
    }

    fn fields(&self) -> Vec<Field> {
        self.fields.clone()
    }

    async fn initial_data(&self, ctx: &WebContext) -> Result<ConfigMap, FormError> {
        Ok(ctx.config.lock().await.as_map().clone())
    }

    async fn save(&self, ctx: &WebContext, data: ConfigMap) -> Result<(), FormError> {
        let mut config = ctx.config.lock().await;
        let changed = config.set_many(data)?;
        if !changed.is_empty() {
            tracing::info!("web.conf updated: {}", changed.join(", "));
        }
        config.save()?;
        Ok(())
    }
}

pub fn hash_password(salt: &str, password: &str) -> String {
    hex::encode(Sha256::digest(format!("{}{}", salt, password)))
}

pub fn new_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}

/// Check `password` against the hash stored in `web.conf`.
pub fn check_password(config: &ConfigManager, password: &str) -> bool {
    let salt: String = config.get_or("pwd_salt", String::new());
    let stored: String = config.get_or("pwd_sha256", String::new());
    !stored.is_empty() && hash_password(&salt, password) == stored
}

/// Changes the web login password. Never pre-fills anything.
pub struct PasswordBlock;

#[async_trait]
impl ConfigBlock for PasswordBlock {
    fn title(&self) -> &str {
        "Password"
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::password("old_password", "Current Password"),
            Field::password("new_password", "New Password"),
            Field::password("new_password_confirm", "New Password (confirm)"),
        ]
    }

    async fn initial_data(&self, _ctx: &WebContext) -> Result<ConfigMap, FormError> {
        Ok(ConfigMap::new())
    }

    async fn save(&self, ctx: &WebContext, data: ConfigMap) -> Result<(), FormError> {
        let field = |name: &str| data.get(name).and_then(Value::as_str).unwrap_or_default();

        let mut config = ctx.config.lock().await;
        if !check_password(&config, field("old_password")) {
            return Err(ValidationError::new("Old password is invalid").into());
        }
        if field("new_password") != field("new_password_confirm") {
            return Err(ValidationError::new(
                "New Password is not equal to New Password(confirm)",
            )
            .into());
        }

        let salt = new_salt();
        let hash = hash_password(&salt, field("new_password"));
        config.set("pwd_salt", json!(salt))?;
        config.set("pwd_sha256", json!(hash))?;
        config.save()?;
        tracing::info!("Web password changed");
        Ok(())
    }
}

// ── Daemon config ────────────────────────────────────

/// A block whose values live in the daemon's `core.conf`, reached over RPC.
pub struct DaemonConfigBlock {
    title: String,
    info: String,
    fields: Vec<Field>,
}

impl DaemonConfigBlock {
    pub fn new(title: &str, info: &str, fields: Vec<Field>) -> Self {
        Self {
            title: title.to_string(),
            info: info.to_string(),
            fields,
        }
    }
}

#[async_trait]
impl ConfigBlock for DaemonConfigBlock {
    fn title(&self) -> &str {
        &self.title
    }

    fn info(&self) -> &str {
        &self.info
    }

    fn fields(&self) -> Vec<Field> {
        self.fields.clone()
    }

    async fn initial_data(&self, ctx: &WebContext) -> Result<ConfigMap, FormError> {
        Ok(ctx.daemon_client().await?.get_config().await?)
    }

    async fn save(&self, ctx: &WebContext, data: ConfigMap) -> Result<(), FormError> {
        let outcome = ctx.daemon_client().await?.set_config(data).await?;
        if !outcome.skipped.is_empty() {
            tracing::warn!(
                "Daemon refused read-only keys: {}",
                outcome.skipped.join(", ")
            );
        }
        Ok(())
    }
}

// ── Registry ─────────────────────────────────────────

pub struct RegisteredBlock {
    pub group: String,
    pub name: String,
    pub block: Arc<dyn ConfigBlock>,
}

/// Named blocks grouped for navigation. Groups keep the order they were
/// first seen in; blocks keep insertion order, and re-registering a name
/// replaces the block in place.
#[derive(Default)]
pub struct ConfigRegistry {
    groups: Vec<String>,
    blocks: Vec<RegisteredBlock>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_block(&mut self, group: &str, name: &str, block: impl ConfigBlock + 'static) {
        if !self.groups.iter().any(|g| g == group) {
            self.groups.push(group.to_string());
        }
        let entry = RegisteredBlock {
            group: group.to_string(),
            name: name.to_string(),
            block: Arc::new(block),
        };
        match self.blocks.iter_mut().find(|b| b.name == name) {
            Some(existing) => *existing = entry,
            None => self.blocks.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn blocks_in<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a RegisteredBlock> {
        self.blocks.iter().filter(move |b| b.group == group)
    }

    pub fn names(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name.as_str()).collect()
    }

    /// The stock pages: web server settings and the common daemon settings.
    pub fn with_builtin_blocks() -> Self {
        let mut registry = Self::new();
        register_web_blocks(&mut registry);
        register_daemon_blocks(&mut registry);
        registry
    }
}

pub const WEB_GROUP: &str = "Web UI";
pub const DAEMON_GROUP: &str = "Deluge";

fn register_web_blocks(registry: &mut ConfigRegistry) {
    registry.register_block(
        WEB_GROUP,
        "template",
        WebConfigBlock::new(
            "Template",
            "",
            vec![
                Field::choice(
                    "template",
                    "Template",
                    [("deluge", "deluge"), ("advanced", "advanced"), ("white", "white")],
                ),
                Field::choice(
                    "button_style",
                    "Button style",
                    [(0, "Text and image"), (1, "Image Only"), (2, "Text Only")],
                ),
                Field::boolean("cache_templates", "Cache templates"),
                Field::boolean("auto_refresh", "Auto refresh"),
                Field::integer("auto_refresh_secs", "Auto refresh (seconds)").min(1.0),
            ],
        ),
    );
    registry.register_block(
        WEB_GROUP,
        "server",
        WebConfigBlock::new(
            "Server",
            "Changes take effect after restarting deluge-web.",
            vec![
                Field::integer("port", "Port").min(1.0).max(65535.0),
                Field::ip_address("interface", "Interface"),
                Field::integer("session_timeout", "Session timeout (seconds)").min(60.0),
                Field::text("base", "Base path").max_length(64).optional(),
            ],
        ),
    );
    registry.register_block(WEB_GROUP, "password", PasswordBlock);
}

fn register_daemon_blocks(registry: &mut ConfigRegistry) {
    let encryption_policy = [(0, "Forced"), (1, "Enabled"), (2, "Disabled")];

    registry.register_block(
        DAEMON_GROUP,
        "network",
        DaemonConfigBlock::new(
            "Network",
            "",
            vec![
                Field::int_range("listen_ports", "Incoming ports", 0, 65535),
                Field::boolean("random_port", "Use random ports"),
                Field::ip_address("listen_interface", "Listen interface").optional(),
                Field::boolean("dht", "DHT"),
                Field::boolean("upnp", "UPnP"),
                Field::boolean("natpmp", "NAT-PMP"),
                Field::boolean("utpex", "Peer exchange"),
                Field::boolean("lsd", "Local service discovery"),
                Field::choice("enc_in_policy", "Inbound encryption", encryption_policy),
                Field::choice("enc_out_policy", "Outbound encryption", encryption_policy),
                Field::choice(
                    "enc_level",
                    "Encryption level",
                    [(0, "Handshake"), (1, "Full Stream"), (2, "Either")],
                ),
            ],
        ),
    );
    registry.register_block(
        DAEMON_GROUP,
        "bandwidth",
        DaemonConfigBlock::new(
            "Bandwidth",
            "-1 means unlimited.",
            vec![
                Field::integer("max_connections_global", "Maximum connections").min(-1.0),
                Field::integer("max_upload_slots_global", "Maximum upload slots").min(-1.0),
                Field::float("max_download_speed", "Maximum download speed (KiB/s)").min(-1.0),
                Field::float("max_upload_speed", "Maximum upload speed (KiB/s)").min(-1.0),
                Field::integer("max_half_open_connections", "Maximum half-open connections").min(-1.0),
                Field::integer("max_connections_per_second", "Maximum connection attempts per second").min(-1.0),
                Field::boolean("ignore_limits_on_local_network", "Ignore limits on local network"),
                Field::boolean("rate_limit_ip_overhead", "Rate limit IP overhead"),
                Field::integer("max_connections_per_torrent", "Maximum connections per torrent").min(-1.0),
                Field::integer("max_upload_slots_per_torrent", "Maximum upload slots per torrent").min(-1.0),
            ],
        ),
    );
    registry.register_block(
        DAEMON_GROUP,
        "queue",
        DaemonConfigBlock::new(
            "Queue",
            "",
            vec![
                Field::boolean("queue_new_to_top", "Queue new torrents to top"),
                Field::integer("max_active_limit", "Total active").min(-1.0),
                Field::integer("max_active_downloading", "Total active downloading").min(-1.0),
                Field::integer("max_active_seeding", "Total active seeding").min(-1.0),
                Field::boolean("dont_count_slow_torrents", "Do not count slow torrents"),
                Field::boolean("stop_seed_at_ratio", "Stop seeding at ratio"),
                Field::float("stop_seed_ratio", "Share ratio").min(0.0),
                Field::boolean("remove_seed_at_ratio", "Remove at ratio"),
            ],
        ),
    );
    registry.register_block(
        DAEMON_GROUP,
        "daemon",
        DaemonConfigBlock::new(
            "Daemon",
            "Port changes take effect after restarting the daemon.",
            vec![
                Field::integer("daemon_port", "Daemon port").min(1.0).max(65535.0),
                Field::boolean("allow_remote", "Allow remote connections"),
                Field::boolean("new_release_check", "Check for new releases"),
            ],
        ),
    );
}
