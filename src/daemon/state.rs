//! The daemon's state: `core.conf`, the engine session and the preference
//! mapping between them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::broadcast;

use crate::config::{ConfigManager, ConfigMap};
use crate::error::DelugeError;
use crate::preferences::{ConfigValueChanged, PreferencesManager};
use crate::session::{Session, TorrentStatus};

/// Result of a `set_config` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetConfigOutcome {
    pub changed: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct Core {
    config: ConfigManager,
    session: Box<dyn Session>,
    preferences: PreferencesManager,
    read_only_keys: HashSet<String>,
    events: broadcast::Sender<ConfigValueChanged>,
}

impl Core {
    pub fn new(
        config: ConfigManager,
        session: Box<dyn Session>,
        read_only_keys: impl IntoIterator<Item = String>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            session,
            preferences: PreferencesManager::new(),
            read_only_keys: read_only_keys.into_iter().collect(),
            events,
        }
    }

    /// Apply all preferences to the session and start reacting to changes.
    pub fn start(&mut self) {
        self.preferences.start(&mut self.config, self.session.as_mut());
        tracing::info!("Core started with {} config keys", self.config.keys().len());
    }

    pub fn stop(&mut self) {
        self.preferences.stop();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigValueChanged> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigManager {
        &mut self.config
    }

    pub fn get_config(&self) -> ConfigMap {
        self.config.as_map().clone()
    }

    pub fn get_config_value(&self, key: &str) -> Result<Value, DelugeError> {
        self.config
            .get(key)
            .cloned()
            .ok_or_else(|| DelugeError::UnknownConfigKey(key.to_string()))
    }

    pub fn is_read_only(&self, key: &str) -> bool {
        self.read_only_keys.contains(key)
    }

    /// Set config values. Read-only keys are skipped without error; each
    /// changed key goes through the preference handlers and is broadcast.
    pub fn set_config(&mut self, values: ConfigMap) -> Result<SetConfigOutcome, DelugeError> {
        let mut outcome = SetConfigOutcome::default();
        for (key, value) in values {
            if self.is_read_only(&key) {
                tracing::debug!("Skipping read-only config key: {}", key);
                outcome.skipped.push(key);
                continue;
            }
            if !self.config.set(&key, value)? {
                continue;
            }
            let stored = self.config.get(&key).cloned().unwrap_or(Value::Null);
            if let Some(event) = self.preferences.on_config_value_change(
                &mut self.config,
                self.session.as_mut(),
                &key,
                &stored,
            ) {
                let _ = self.events.send(event);
            }
            outcome.changed.push(key);
        }
        if !outcome.changed.is_empty() {
            self.config.save()?;
        }
        Ok(outcome)
    }

    pub fn torrents(&self) -> Vec<TorrentStatus> {
        self.session.torrents()
    }

    pub fn save(&self) -> Result<(), DelugeError> {
        self.config.save().map_err(DelugeError::from)
    }
}
