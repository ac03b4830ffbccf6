//! Connecting to a daemon with bounded retries and credential prompts.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use deluge_core::client::DaemonClient;
use deluge_core::DelugeError;

/// Retry budget for autoconnect: one attempt, then `retries` more, each
/// preceded by `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 6,
            delay: Duration::from_millis(500),
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the daemon version on success.
    async fn connect(
        &self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<String, DelugeError>;

    /// Launch a local daemon on `port` and wait for it to listen.
    async fn start_daemon(&self, port: u16, config_dir: &Path) -> Result<(), DelugeError>;
}

#[async_trait]
impl Connector for DaemonClient {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<String, DelugeError> {
        DaemonClient::connect(self, host, port, username, password).await
    }

    async fn start_daemon(&self, port: u16, config_dir: &Path) -> Result<(), DelugeError> {
        deluge_core::client::start_daemon(port, Some(config_dir)).await
    }
}

/// Questions the shell needs answered by whoever is in front of the screen.
#[async_trait]
pub trait Prompt: Send + Sync {
    async fn ask_yes_no(&self, title: &str, message: &str) -> bool;

    /// `None` when the user cancels.
    async fn ask_credentials(&self, message: &str, username: &str) -> Option<(String, String)>;

    async fn show_error(&self, title: &str, message: &str);
}

#[derive(Debug)]
pub enum ConnectOutcome {
    Connected { version: String },
    /// The user dismissed a credentials prompt.
    Cancelled,
    GaveUp(DelugeError),
}

/// Connect to `host:port`, retrying failures until the budget runs out.
/// Authentication failures ask for new credentials instead of retrying
/// blindly.
pub async fn connect_with_retry(
    connector: &dyn Connector,
    prompt: &dyn Prompt,
    policy: RetryPolicy,
    host: &str,
    port: u16,
    username: &str,
    password: &str,
) -> ConnectOutcome {
    let mut tries_left = policy.retries;
    let mut username = username.to_string();
    let mut password = password.to_string();

    loop {
        tokio::time::sleep(policy.delay).await;
        tracing::debug!("Trying to connect to {}@{}:{}", username, host, port);

        let err = match connector.connect(host, port, &username, &password).await {
            Ok(version) => return ConnectOutcome::Connected { version },
            Err(e) => e,
        };
        if tries_left == 0 {
            return ConnectOutcome::GaveUp(err);
        }

        if err.is_auth_error() {
            tracing::debug!("Password required: {}", err);
            match prompt.ask_credentials(&err.to_string(), &username).await {
                Some((u, p)) => {
                    username = u;
                    password = p;
                }
                None => return ConnectOutcome::Cancelled,
            }
        } else {
            tracing::info!("Connection to host failed..");
            tracing::info!("Retrying connection.. Retries left: {}", tries_left);
        }
        tries_left -= 1;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned connect results and records every attempt.
    #[derive(Default)]
    pub struct ScriptedConnector {
        pub results: Mutex<VecDeque<Result<String, DelugeError>>>,
        pub attempts: Mutex<Vec<(String, String)>>,
        pub daemon_fails: bool,
        pub daemons_started: Mutex<Vec<u16>>,
    }

    impl ScriptedConnector {
        pub fn new(results: Vec<Result<String, DelugeError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                ..Default::default()
            }
        }

        pub fn attempts(&self) -> Vec<(String, String)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &self,
            _host: &str,
            _port: u16,
            username: &str,
            password: &str,
        ) -> Result<String, DelugeError> {
            self.attempts
                .lock()
                .unwrap()
                .push((username.to_string(), password.to_string()));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DelugeError::Connection("refused".into())))
        }

        async fn start_daemon(&self, port: u16, _config_dir: &Path) -> Result<(), DelugeError> {
            self.daemons_started.lock().unwrap().push(port);
            if self.daemon_fails {
                return Err(DelugeError::Connection("no deluged binary".into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct ScriptedPrompt {
        pub yes: bool,
        pub credentials: Option<(String, String)>,
        pub asked: Mutex<Vec<String>>,
        /// Bodies of the dialogs, in order.
        pub messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Prompt for ScriptedPrompt {
        async fn ask_yes_no(&self, title: &str, message: &str) -> bool {
            self.asked.lock().unwrap().push(title.to_string());
            self.messages.lock().unwrap().push(message.to_string());
            self.yes
        }

        async fn ask_credentials(&self, message: &str, _username: &str) -> Option<(String, String)> {
            self.asked.lock().unwrap().push(message.to_string());
            self.credentials.clone()
        }

        async fn show_error(&self, title: &str, message: &str) {
            self.asked.lock().unwrap().push(title.to_string());
            self.messages.lock().unwrap().push(message.to_string());
        }
    }
}
