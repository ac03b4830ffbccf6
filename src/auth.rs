//! Credentials file and RPC login sessions.
//!
//! The `auth` file in the config directory holds one `user:password[:level]`
//! line per account. Daemon clients log in once and then present the issued
//! token in the `X-Deluge-Token` header.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::DelugeError;

pub const AUTH_FILE: &str = "auth";
pub const LOCALCLIENT: &str = "localclient";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum AuthLevel {
    None = 0,
    ReadOnly = 1,
    Normal = 5,
    Admin = 10,
}

impl AuthLevel {
    pub const DEFAULT: AuthLevel = AuthLevel::Normal;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a level written either as a number or by name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Some(Self::from(n));
        }
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "readonly" => Some(Self::ReadOnly),
            "normal" | "default" => Some(Self::Normal),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Intermediate numbers round down to the nearest named level.
impl From<u8> for AuthLevel {
    fn from(n: u8) -> Self {
        match n {
            0 => Self::None,
            1..=4 => Self::ReadOnly,
            5..=9 => Self::Normal,
            _ => Self::Admin,
        }
    }
}

impl From<AuthLevel> for u8 {
    fn from(level: AuthLevel) -> u8 {
        level.as_u8()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub level: AuthLevel,
}

impl Account {
    fn to_line(&self) -> String {
        format!("{}:{}:{}", self.username, self.password, self.level.as_u8())
    }
}

fn random_hex_secret() -> String {
    let mut seed = [0u8; 32];
    rand::rng().fill(&mut seed[..]);
    let digest = Sha256::digest(seed);
    hex::encode(digest)[..40].to_string()
}

/// Create an empty `auth` file readable only by the current user.
pub fn create_auth_file(config_dir: &Path) -> Result<PathBuf, DelugeError> {
    let path = config_dir.join(AUTH_FILE);
    if !path.exists() {
        fs::create_dir_all(config_dir)?;
        fs::File::create(&path)?.sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(path)
}

/// Write a `localclient` admin account with a random password.
///
/// With `append` the line is added to the existing accounts, otherwise the
/// file is replaced.
pub fn create_localclient_account(config_dir: &Path, append: bool) -> Result<Account, DelugeError> {
    let path = create_auth_file(config_dir)?;
    let account = Account {
        username: LOCALCLIENT.to_string(),
        password: random_hex_secret(),
        level: AuthLevel::Admin,
    };
    // Keep the new line separate from an unterminated last account.
    let needs_newline = append
        && fs::read(&path)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);
    let mut file = fs::OpenOptions::new()
        .write(true)
        .append(append)
        .truncate(!append)
        .open(&path)?;
    if needs_newline {
        writeln!(file)?;
    }
    writeln!(file, "{}", account.to_line())?;
    file.sync_all()?;
    Ok(account)
}

fn parse_auth_lines(content: &str) -> BTreeMap<String, Account> {
    let mut accounts = BTreeMap::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        let (username, password, level) = match parts.as_slice() {
            [user, pass] => (*user, *pass, AuthLevel::DEFAULT),
            [user, pass, level] => match AuthLevel::parse(level) {
                Some(l) => (*user, *pass, l),
                None => {
                    tracing::warn!("Auth level {:?} on line {} is not valid, skipping", level, lineno + 1);
                    continue;
                }
            },
            _ => {
                tracing::warn!("Your auth entry for line {} is invalid, skipping", lineno + 1);
                continue;
            }
        };
        accounts.insert(
            username.to_string(),
            Account {
                username: username.to_string(),
                password: password.to_string(),
                level,
            },
        );
    }
    accounts
}

/// Accounts known to the daemon.
#[derive(Debug)]
pub struct AuthManager {
    accounts: BTreeMap<String, Account>,
}

impl AuthManager {
    /// Read the `auth` file, creating it (with a localclient account) when it
    /// does not hold one yet.
    pub fn load(config_dir: &Path) -> Result<Self, DelugeError> {
        let path = create_auth_file(config_dir)?;
        let mut accounts = parse_auth_lines(&fs::read_to_string(&path)?);

        if !accounts.contains_key(LOCALCLIENT) {
            let account = create_localclient_account(config_dir, true)?;
            tracing::info!("Created {} account in {}", LOCALCLIENT, path.display());
            accounts.insert(account.username.clone(), account);
        }

        tracing::debug!("Loaded {} accounts from {}", accounts.len(), path.display());
        Ok(Self { accounts })
    }

    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (a.username.clone(), a))
                .collect(),
        }
    }

    pub fn account(&self, username: &str) -> Option<&Account> {
        self.accounts.get(username)
    }

    /// Check a login and return the account's level.
    pub fn authorize(&self, username: &str, password: &str) -> Result<AuthLevel, DelugeError> {
        if username.is_empty() {
            return Err(DelugeError::AuthenticationRequired {
                username: username.to_string(),
            });
        }
        match self.accounts.get(username) {
            Some(account) if account.password == password => Ok(account.level),
            Some(_) => Err(DelugeError::BadLogin {
                username: username.to_string(),
            }),
            None => {
                tracing::debug!("Username {:?} not in auth file", username);
                Err(DelugeError::BadLogin {
                    username: username.to_string(),
                })
            }
        }
    }
}

/// The localclient credentials of a local daemon, used when connecting to
/// localhost without a username.
pub fn get_localhost_auth(config_dir: &Path) -> Option<(String, String)> {
    let content = fs::read_to_string(config_dir.join(AUTH_FILE)).ok()?;
    parse_auth_lines(&content)
        .remove(LOCALCLIENT)
        .map(|a| (a.username, a.password))
}

// ── Login sessions ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSession {
    pub username: String,
    pub level: AuthLevel,
}

/// Idle time after which a daemon login token is dropped.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct TokenEntry {
    session: LoginSession,
    last_seen: Instant,
}

/// Tokens handed out by `POST /api/auth/login` and by the web login page.
///
/// A token expires once it has not been looked up for `ttl`.
#[derive(Debug)]
pub struct SessionTokens {
    sessions: RwLock<HashMap<String, TokenEntry>>,
    ttl: RwLock<Duration>,
}

impl Default for SessionTokens {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TOKEN_TTL)
    }
}

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: RwLock::new(ttl),
        }
    }

    pub fn ttl(&self) -> Duration {
        *self.ttl.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies to existing tokens as well.
    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.write().unwrap_or_else(|e| e.into_inner()) = ttl;
    }

    pub fn issue(&self, username: &str, level: AuthLevel) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();
        let ttl = self.ttl();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) < ttl);
        if sessions.len() < before {
            tracing::debug!("Dropped {} expired login sessions", before - sessions.len());
        }
        sessions.insert(
            token.clone(),
            TokenEntry {
                session: LoginSession {
                    username: username.to_string(),
                    level,
                },
                last_seen: now,
            },
        );
        tracing::info!("Login session opened for {} (token: {}…)", username, &token[..8]);
        token
    }

    /// Find a live session and restart its idle clock.
    pub fn lookup(&self, token: &str) -> Option<LoginSession> {
        let now = Instant::now();
        let ttl = self.ttl();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let entry = sessions.get_mut(token)?;
        if now.duration_since(entry.last_seen) >= ttl {
            tracing::debug!("Login session for {} expired", entry.session.username);
            sessions.remove(token);
            return None;
        }
        entry.last_seen = now;
        Some(entry.session.clone())
    }

    pub fn revoke(&self, token: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
