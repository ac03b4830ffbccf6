//! Persistent key/value configuration files (`core.conf`, `web.conf`, ...).
//!
//! A config is a JSON object merged over a defaults map. Keys the file carries
//! but the defaults do not know are kept, so older and newer builds can share
//! a config directory.

use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

pub type ConfigMap = Map<String, Value>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Value type {found} invalid for key: {key} (expected {expected})")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Published on every effective change of a config value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub key: String,
    pub value: Value,
}

#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    defaults: ConfigMap,
    values: ConfigMap,
    events: broadcast::Sender<ConfigChange>,
}

impl ConfigManager {
    /// Load `path` over `defaults`. A missing file yields the defaults; a
    /// corrupt file falls back to its `.bak` copy when one exists.
    pub fn load(path: impl Into<PathBuf>, defaults: ConfigMap) -> Result<Self, ConfigError> {
        let path = path.into();
        let mut values = defaults.clone();

        if let Some(stored) = read_config_file(&path)? {
            values.extend(stored);
        }

        let (events, _) = broadcast::channel(64);
        tracing::debug!("Config {} loaded with {} keys", path.display(), values.len());
        Ok(Self {
            path,
            defaults,
            values,
            events,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.events.subscribe()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Value of `key`, or `fallback` when unset or of the wrong type.
    pub fn get_or<T: serde::de::DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(fallback)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn as_map(&self) -> &ConfigMap {
        &self.values
    }

    pub fn default_value(&self, key: &str) -> Option<&Value> {
        self.defaults.get(key)
    }

    /// Set a value, coercing it to the type of the current value where that
    /// is lossless enough (int/float, numeric strings).
    ///
    /// Returns whether the stored value changed. Unchanged values publish
    /// nothing.
    pub fn set(&mut self, key: &str, value: Value) -> Result<bool, ConfigError> {
        let value = match self.values.get(key) {
            Some(old) => coerce(key, old, value)?,
            None => value,
        };
        if self.values.get(key) == Some(&value) {
            return Ok(false);
        }
        tracing::debug!("Setting key \"{}\" to: {}", key, value);
        self.values.insert(key.to_string(), value.clone());
        // No subscribers is fine.
        let _ = self.events.send(ConfigChange {
            key: key.to_string(),
            value,
        });
        Ok(true)
    }

    /// Apply several values; returns the keys that actually changed.
    pub fn set_many(&mut self, values: ConfigMap) -> Result<Vec<String>, ConfigError> {
        let mut changed = Vec::new();
        for (key, value) in values {
            if self.set(&key, value)? {
                changed.push(key);
            }
        }
        Ok(changed)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Write the config as pretty JSON. The previous file is kept as `.bak`
    /// and the new one is moved into place in a single rename.
    pub fn save(&self) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(&self.values).map_err(|source| {
            ConfigError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, backup_path(&self.path)) {
                tracing::warn!("Unable to back up {}: {}", self.path.display(), e);
            }
        }

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        tracing::debug!("Config {} saved", self.path.display());
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn read_config_file(path: &Path) -> Result<Option<ConfigMap>, ConfigError> {
    let read = |p: &Path| -> Result<Option<ConfigMap>, ConfigError> {
        match fs::read_to_string(p) {
            Ok(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|source| ConfigError::Parse {
                    path: p.to_path_buf(),
                    source,
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: p.to_path_buf(),
                source,
            }),
        }
    };

    match read(path) {
        Err(ConfigError::Parse { path: bad, source }) => {
            let bak = backup_path(path);
            match read(&bak) {
                Ok(Some(map)) => {
                    tracing::warn!(
                        "Config {} is corrupt ({}), restored from {}",
                        bad.display(),
                        source,
                        bak.display()
                    );
                    Ok(Some(map))
                }
                _ => Err(ConfigError::Parse { path: bad, source }),
            }
        }
        other => other,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn coerce(key: &str, old: &Value, value: Value) -> Result<Value, ConfigError> {
    let mismatch = |value: &Value| ConfigError::TypeMismatch {
        key: key.to_string(),
        expected: type_name(old),
        found: type_name(value),
    };

    if old.is_null() || value.is_null() || type_name(old) == type_name(&value) {
        return Ok(value);
    }

    match (type_name(old), &value) {
        ("int", Value::Number(n)) => n
            .as_f64()
            .map(|f| Value::from(f.trunc() as i64))
            .ok_or_else(|| mismatch(&value)),
        ("float", Value::Number(n)) => n
            .as_f64()
            .map(Value::from)
            .ok_or_else(|| mismatch(&value)),
        ("int", Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| mismatch(&value)),
        ("float", Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| mismatch(&value)),
        ("bool", Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "off" | "" => Ok(Value::Bool(false)),
            _ => Err(mismatch(&value)),
        },
        ("string", Value::Number(n)) => Ok(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Ok(Value::String(b.to_string())),
        _ => Err(mismatch(&value)),
    }
}

// ── Config directory ─────────────────────────────────────

/// Resolve the config directory: explicit path, then `DELUGE_CONFIG_DIR`,
/// then the platform's per-user config location.
pub fn resolve_config_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var("DELUGE_CONFIG_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    default_config_dir()
}

fn default_config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .map(|appdata| PathBuf::from(appdata).join("deluge"))
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            if !xdg.is_empty() {
                return PathBuf::from(xdg).join("deluge");
            }
        }
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".config").join("deluge"))
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

/// Path of `name` inside the config directory.
pub fn get_config_dir(config_dir: &Path, name: &str) -> PathBuf {
    config_dir.join(name)
}

/// Build a `ConfigMap` from a `json!({...})` literal.
pub fn defaults_from(value: Value) -> ConfigMap {
    match value {
        Value::Object(map) => map,
        _ => ConfigMap::new(),
    }
}
