//! Boundary to the BitTorrent engine.
//!
//! The daemon never speaks the peer protocol itself. It pushes settings into
//! an engine session through [`Session`] and reads torrent status back out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A batch of engine settings applied together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPack(BTreeMap<String, SettingValue>);

impl SettingsPack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<SettingValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<SettingValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Status snapshot of one torrent, as shown in the torrent list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorrentStatus {
    pub id: String,
    pub queue: i64,
    pub name: String,
    pub state: String,
    pub total_wanted: u64,
    pub all_time_download: u64,
    pub total_uploaded: u64,
    pub total_remaining: u64,
    pub progress: f64,
    pub num_seeds: i64,
    pub total_seeds: i64,
    pub num_peers: i64,
    pub total_peers: i64,
    pub seeds_peers_ratio: f64,
    pub download_payload_rate: f64,
    pub upload_payload_rate: f64,
    pub max_download_speed: f64,
    pub max_upload_speed: f64,
    pub eta: u64,
    pub ratio: f64,
    pub distributed_copies: f64,
    pub time_added: f64,
    pub completed_time: f64,
    pub last_seen_complete: f64,
    pub tracker_host: String,
    pub download_location: String,
    pub owner: String,
    pub shared: bool,
}

pub trait Session: Send + Sync {
    fn apply_settings(&mut self, settings: SettingsPack);

    fn add_extension(&mut self, name: &str);

    fn add_dht_router(&mut self, host: &str, port: u16);

    fn torrents(&self) -> Vec<TorrentStatus>;
}

/// Session that only records what it is told. Stands in for the native engine
/// when none is linked.
#[derive(Debug, Default)]
pub struct MemorySession {
    settings: BTreeMap<String, SettingValue>,
    applied: Vec<SettingsPack>,
    extensions: Vec<String>,
    dht_routers: Vec<(String, u16)>,
    torrents: Vec<TorrentStatus>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_torrents(torrents: Vec<TorrentStatus>) -> Self {
        Self {
            torrents,
            ..Self::default()
        }
    }

    /// Current value of an engine setting.
    pub fn setting(&self, key: &str) -> Option<&SettingValue> {
        self.settings.get(key)
    }

    /// Every pack applied so far, in order.
    pub fn applied(&self) -> &[SettingsPack] {
        &self.applied
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn dht_routers(&self) -> &[(String, u16)] {
        &self.dht_routers
    }
}

impl Session for MemorySession {
    fn apply_settings(&mut self, settings: SettingsPack) {
        for (k, v) in settings.iter() {
            self.settings.insert(k.clone(), v.clone());
        }
        self.applied.push(settings);
    }

    fn add_extension(&mut self, name: &str) {
        if !self.extensions.iter().any(|e| e == name) {
            self.extensions.push(name.to_string());
        }
    }

    fn add_dht_router(&mut self, host: &str, port: u16) {
        self.dht_routers.push((host.to_string(), port));
    }

    fn torrents(&self) -> Vec<TorrentStatus> {
        self.torrents.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_session_records_settings() {
        let mut session = MemorySession::new();
        session.apply_settings(SettingsPack::new().with("connections_limit", 200i64));
        session.apply_settings(
            SettingsPack::new()
                .with("connections_limit", 50i64)
                .with("enable_dht", true),
        );
        assert_eq!(session.setting("connections_limit"), Some(&SettingValue::Int(50)));
        assert_eq!(session.setting("enable_dht"), Some(&SettingValue::Bool(true)));
        assert_eq!(session.applied().len(), 2);

        session.add_extension("ut_pex");
        session.add_extension("ut_pex");
        assert_eq!(session.extensions(), ["ut_pex".to_string()]);
    }

    #[test]
    fn test_torrent_status_partial_json() {
        let status: TorrentStatus =
            serde_json::from_str(r#"{"id": "abc", "name": "ubuntu.iso", "progress": 42.5}"#).unwrap();
        assert_eq!(status.name, "ubuntu.iso");
        assert_eq!(status.total_peers, 0);
    }
}
