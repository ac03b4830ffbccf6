//! Core preferences (`core.conf`) and how each one reaches the engine.

use rand::Rng;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::common::get_default_download_dir;
use crate::config::{defaults_from, ConfigManager, ConfigMap};
use crate::session::{Session, SettingsPack};

pub const CORE_CONFIG: &str = "core.conf";

const RANDOM_PORT_RANGE: std::ops::Range<i64> = 49152..65525;
const DHT_BOOTSTRAP_NODES: &str =
    "router.bittorrent.com:6881,router.utorrent.com:6881,router.bitcomet.com:6881";
const PROXY_TYPE_I2P: i64 = 6;

/// Defaults for every key of `core.conf`.
pub fn default_prefs(config_dir: &std::path::Path) -> ConfigMap {
    let download_dir = get_default_download_dir();
    let plugins = config_dir.join("plugins").to_string_lossy().into_owned();
    let max_half_open = if cfg!(windows) { 8 } else { 50 };

    defaults_from(json!({
        "send_info": false,
        "info_sent": 0.0,
        "daemon_port": 58846,
        "allow_remote": false,
        "pre_allocate_storage": false,
        "download_location": download_dir,
        "listen_ports": [6881, 6891],
        "listen_interface": "",
        "random_port": true,
        "listen_random_port": null,
        "listen_use_sys_port": false,
        "listen_reuse_port": true,
        "outgoing_ports": [0, 0],
        "random_outgoing_ports": true,
        "copy_torrent_file": false,
        "del_copy_torrent_file": false,
        "torrentfiles_location": download_dir,
        "plugins_location": plugins,
        "prioritize_first_last_pieces": false,
        "sequential_download": false,
        "dht": true,
        "upnp": true,
        "natpmp": true,
        "utpex": true,
        "lsd": true,
        "enc_in_policy": 1,
        "enc_out_policy": 1,
        "enc_level": 2,
        "max_connections_global": 200,
        "max_upload_speed": -1.0,
        "max_download_speed": -1.0,
        "max_upload_slots_global": 4,
        "max_half_open_connections": max_half_open,
        "max_connections_per_second": 20,
        "ignore_limits_on_local_network": true,
        "max_connections_per_torrent": -1,
        "max_upload_slots_per_torrent": -1,
        "max_upload_speed_per_torrent": -1,
        "max_download_speed_per_torrent": -1,
        "enabled_plugins": [],
        "add_paused": false,
        "max_active_seeding": 5,
        "max_active_downloading": 3,
        "max_active_limit": 8,
        "dont_count_slow_torrents": false,
        "queue_new_to_top": false,
        "stop_seed_at_ratio": false,
        "remove_seed_at_ratio": false,
        "stop_seed_ratio": 2.0,
        "share_ratio_limit": 2.0,
        "seed_time_ratio_limit": 7.0,
        "seed_time_limit": 180,
        "auto_managed": true,
        "move_completed": false,
        "move_completed_path": download_dir,
        "move_completed_paths_list": [],
        "download_location_paths_list": [],
        "path_chooser_show_chooser_button_on_localhost": true,
        "path_chooser_auto_complete_enabled": true,
        "path_chooser_accelerator_string": "Tab",
        "path_chooser_max_popup_rows": 20,
        "path_chooser_show_hidden_files": false,
        "new_release_check": true,
        "proxy": {
            "type": 0,
            "hostname": "",
            "username": "",
            "password": "",
            "port": 8080,
            "proxy_hostnames": true,
            "proxy_peer_connections": true,
        },
        "i2p_proxy": {
            "hostname": "",
            "port": 0,
        },
        "peer_tos": "0x00",
        "rate_limit_ip_overhead": true,
        "anonymous_mode": false,
        "geoip_db_location": "/usr/share/GeoIP/GeoIP.dat",
        "cache_size": 512,
        "cache_expiry": 60,
        "auto_manage_prefer_seeds": false,
        "shared": false,
        "super_seeding": false,
        "priority": 0,
    }))
}

/// Emitted after a changed preference was pushed to the engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConfigValueChanged {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Default)]
pub struct PreferencesManager {
    started: bool,
    geoip_db: Option<PathBuf>,
}

impl PreferencesManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// GeoIP database found at `geoip_db_location`, if any.
    pub fn geoip_db(&self) -> Option<&PathBuf> {
        self.geoip_db.as_ref()
    }

    /// Fold the pre-1.3 `proxies` dict into `proxy`.
    pub fn migrate(config: &mut ConfigManager) {
        let Some(proxies) = config.remove("proxies") else {
            return;
        };
        tracing::warn!("Updating config file for proxy, using 'peer' values to fill new 'proxy' setting");
        let mut proxy = match config.get("proxy") {
            Some(Value::Object(p)) => p.clone(),
            _ => ConfigMap::new(),
        };
        if let Some(Value::Object(peer)) = proxies.get("peer") {
            proxy.extend(peer.clone());
        }
        tracing::warn!("New proxy config is: {}", serde_json::Value::Object(proxy.clone()));
        if let Err(e) = config.set("proxy", Value::Object(proxy)) {
            tracing::error!("Unable to migrate proxy settings: {}", e);
        }
    }

    /// Push the whole configuration into the engine.
    ///
    /// Listen interface and ports go first, then DHT so both share the same
    /// port, then every remaining key.
    pub fn start(&mut self, config: &mut ConfigManager, session: &mut dyn Session) {
        Self::migrate(config);
        set_listen_on(config, session);
        let dht = config.get_or("dht", true);
        on_set_dht(session, dht);

        for key in config.keys() {
            if key == "dht" || key == "random_port" || key.starts_with("listen_") {
                continue;
            }
            if let Some(value) = config.get(&key).cloned() {
                self.do_config_set_func(config, session, &key, &value);
            }
        }
        self.started = true;
    }

    pub fn stop(&mut self) {
        self.started = false;
    }

    /// React to a changed key. Nothing happens until the manager is started.
    pub fn on_config_value_change(
        &mut self,
        config: &mut ConfigManager,
        session: &mut dyn Session,
        key: &str,
        value: &Value,
    ) -> Option<ConfigValueChanged> {
        if !self.started {
            return None;
        }
        self.do_config_set_func(config, session, key, value);
        Some(ConfigValueChanged {
            key: key.to_string(),
            value: value.clone(),
        })
    }

    fn do_config_set_func(
        &mut self,
        config: &mut ConfigManager,
        session: &mut dyn Session,
        key: &str,
        value: &Value,
    ) {
        let int = || value.as_i64().unwrap_or_default();
        let boolean = || value.as_bool().unwrap_or_default();

        let mut set = |name: &str, v: crate::session::SettingValue| {
            tracing::debug!("Config key: {} set to {}..", key, value);
            session.apply_settings(SettingsPack::new().with(name, v));
        };

        match key {
            "listen_ports" | "listen_interface" | "random_port" => set_listen_on(config, session),
            "outgoing_ports" | "random_outgoing_ports" => set_outgoing_ports(config, session),
            "torrentfiles_location" => {
                if config.get_or("copy_torrent_file", false) {
                    if let Some(dir) = value.as_str() {
                        if let Err(e) = std::fs::create_dir_all(dir) {
                            tracing::debug!("Unable to make directory: {}", e);
                        }
                    }
                }
            }
            "peer_tos" => {
                let raw = value.as_str().unwrap_or_default();
                match i64::from_str_radix(raw.trim_start_matches("0x").trim_start_matches("0X"), 16) {
                    Ok(tos) => set("peer_tos", tos.into()),
                    Err(e) => tracing::error!("Invalid tos byte: {}", e),
                }
            }
            "dht" => on_set_dht(session, boolean()),
            "upnp" => set("enable_upnp", boolean().into()),
            "natpmp" => set("enable_natpmp", boolean().into()),
            "lsd" => set("enable_lsd", boolean().into()),
            "utpex" => {
                if boolean() {
                    session.add_extension("ut_pex");
                }
            }
            "enc_in_policy" | "enc_out_policy" | "enc_level" => set_encryption(config, session),
            "max_connections_global" => set("connections_limit", int().into()),
            "max_upload_speed" => set("upload_rate_limit", kib_to_bytes(value).into()),
            "max_download_speed" => set("download_rate_limit", kib_to_bytes(value).into()),
            "max_upload_slots_global" => set("unchoke_slots_limit", int().into()),
            "max_half_open_connections" => set("half_open_limit", int().into()),
            "max_connections_per_second" => set("connection_speed", int().into()),
            "ignore_limits_on_local_network" => set("ignore_limits_on_local_network", boolean().into()),
            "share_ratio_limit" => set("share_ratio_limit", value.as_f64().unwrap_or_default().into()),
            "seed_time_ratio_limit" => {
                set("seed_time_ratio_limit", value.as_f64().unwrap_or_default().into())
            }
            // Stored in minutes, the engine wants seconds.
            "seed_time_limit" => {
                set("seed_time_limit", ((value.as_f64().unwrap_or_default() * 60.0) as i64).into())
            }
            "max_active_downloading" => set("active_downloads", int().into()),
            "max_active_seeding" => set("active_seeds", int().into()),
            "max_active_limit" => set("active_limit", int().into()),
            "dont_count_slow_torrents" => set("dont_count_slow_torrents", boolean().into()),
            "proxy" | "i2p_proxy" => set_proxy(session, key, value),
            "rate_limit_ip_overhead" => set("rate_limit_ip_overhead", boolean().into()),
            "anonymous_mode" => set("anonymous_mode", boolean().into()),
            "geoip_db_location" => {
                let path = PathBuf::from(value.as_str().unwrap_or_default());
                if path.exists() {
                    tracing::debug!("GeoIP database: {}", path.display());
                    self.geoip_db = Some(path);
                } else {
                    tracing::warn!("Unable to find GeoIP database file: {}", path.display());
                    self.geoip_db = None;
                }
            }
            "cache_size" => set("cache_size", int().into()),
            "cache_expiry" => set("cache_expiry", int().into()),
            "auto_manage_prefer_seeds" => set("auto_manage_prefer_seeds", boolean().into()),
            _ => {}
        }
    }
}

fn kib_to_bytes(value: &Value) -> i64 {
    let kib = value.as_f64().unwrap_or(-1.0);
    if kib < 0.0 {
        -1
    } else {
        (kib * 1024.0) as i64
    }
}

fn port_pair(config: &ConfigManager, key: &str) -> (i64, i64) {
    let ports: Vec<i64> = config.get_or(key, Vec::new());
    match ports.as_slice() {
        [first, second, ..] => (*first, *second),
        [single] => (*single, *single),
        [] => (0, 0),
    }
}

fn set_listen_on(config: &mut ConfigManager, session: &mut dyn Session) {
    let (first, last) = if config.get_or("random_port", true) {
        let port = match config.get_or::<Option<i64>>("listen_random_port", None) {
            Some(p) if p > 0 => p,
            _ => {
                let p = rand::rng().random_range(RANDOM_PORT_RANGE);
                if let Err(e) = config.set("listen_random_port", json!(p)) {
                    tracing::error!("Unable to store random listen port: {}", e);
                }
                p
            }
        };
        (port, port)
    } else {
        if let Err(e) = config.set("listen_random_port", Value::Null) {
            tracing::error!("Unable to clear random listen port: {}", e);
        }
        port_pair(config, "listen_ports")
    };

    let interface: String = config.get_or("listen_interface", String::new());
    let interface = match interface.trim() {
        "" => "0.0.0.0".to_string(),
        i => i.to_string(),
    };
    let use_sys_port: bool = config.get_or("listen_use_sys_port", false);
    tracing::debug!(
        "Listen Interface: {}, Ports: [{}, {}] with use_sys_port: {}",
        interface,
        first,
        last,
        use_sys_port
    );

    let interfaces: Vec<String> = (first..=last)
        .map(|port| format!("{}:{}", interface, port))
        .collect();
    session.apply_settings(
        SettingsPack::new()
            .with("listen_system_port_fallback", use_sys_port)
            .with("listen_interfaces", interfaces.join(",")),
    );
}

fn set_outgoing_ports(config: &ConfigManager, session: &mut dyn Session) {
    let (first, last) = port_pair(config, "outgoing_ports");
    let port = if config.get_or("random_outgoing_ports", true) { 0 } else { first };
    let num_ports = if port != 0 {
        let n = last - first;
        if n > 1 {
            n
        } else {
            5
        }
    } else {
        0
    };
    tracing::debug!("Outgoing port set to {} with range: {}", port, num_ports);
    session.apply_settings(
        SettingsPack::new()
            .with("outgoing_port", port)
            .with("num_outgoing_ports", num_ports),
    );
}

fn on_set_dht(session: &mut dyn Session, enabled: bool) {
    session.apply_settings(SettingsPack::new().with("dht_bootstrap_nodes", DHT_BOOTSTRAP_NODES));
    for node in DHT_BOOTSTRAP_NODES.split(',') {
        if let Some((host, port)) = node.rsplit_once(':') {
            if let Ok(port) = port.parse() {
                session.add_dht_router(host, port);
            }
        }
    }
    session.apply_settings(SettingsPack::new().with("enable_dht", enabled));
}

fn set_encryption(config: &ConfigManager, session: &mut dyn Session) {
    // 0 plaintext, 1 rc4, 2 both; mirrors the engine's own numbering.
    let level = match config.get_or("enc_level", 2i64) {
        0 => "plaintext",
        1 => "rc4",
        _ => "both",
    };
    session.apply_settings(
        SettingsPack::new()
            .with("out_enc_policy", config.get_or("enc_out_policy", 1i64))
            .with("in_enc_policy", config.get_or("enc_in_policy", 1i64))
            .with("allowed_enc_level", level)
            .with("prefer_rc4", true),
    );
}

fn set_proxy(session: &mut dyn Session, key: &str, value: &Value) {
    let field = |name: &str| value.get(name).cloned().unwrap_or(Value::Null);
    let proxy_type = field("type").as_i64().unwrap_or_default();

    let pack = if key == "i2p_proxy" || proxy_type == PROXY_TYPE_I2P {
        SettingsPack::new()
            .with("proxy_type", PROXY_TYPE_I2P)
            .with("i2p_hostname", field("hostname").as_str().unwrap_or_default())
            .with("i2p_port", field("port").as_i64().unwrap_or_default())
    } else {
        SettingsPack::new()
            .with("proxy_type", proxy_type)
            .with("proxy_hostname", field("hostname").as_str().unwrap_or_default())
            .with("proxy_port", field("port").as_i64().unwrap_or_default())
            .with("proxy_username", field("username").as_str().unwrap_or_default())
            .with("proxy_password", field("password").as_str().unwrap_or_default())
            .with("proxy_hostnames", field("proxy_hostnames").as_bool().unwrap_or(true))
            .with(
                "proxy_peer_connections",
                field("proxy_peer_connections").as_bool().unwrap_or(true),
            )
    };
    session.apply_settings(pack);
}
