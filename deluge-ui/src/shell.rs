//! The UI shell: owns `ui.conf`, the components and the daemon connection,
//! and decides at startup between an in-process core and a remote daemon.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use deluge_core::client::DaemonClient;
use deluge_core::common::{fsize, fspeed, get_default_download_dir};
use deluge_core::config::{defaults_from, get_config_dir, ConfigManager};
use deluge_core::daemon::{is_daemon_running, Daemon, DaemonOptions, PID_FILE};
use deluge_core::session::MemorySession;
use deluge_core::DelugeError;

use crate::component::ComponentRegistry;
use crate::connect::{connect_with_retry, ConnectOutcome, Connector, Prompt, RetryPolicy};
use crate::hostlist::HostList;
use crate::statusbar::StatusBar;
use crate::torrentview::TorrentView;

pub const UI_CONFIG: &str = "ui.conf";
pub const UI_STATE_DIR: &str = "ui_state";
pub const RPC_STATS_INTERVAL: Duration = Duration::from_secs(10);

pub const SWITCH_TITLE: &str = "Switch to Thin Client Mode?";
pub const DAEMON_RUNNING_MESSAGE: &str = "A Deluge daemon process (deluged) is already running. \
To use Standalone mode, stop this daemon and restart Deluge.\n\nContinue in Thin Client mode?";
pub const STANDALONE_FAILED_MESSAGE: &str =
    "Unable to start Standalone mode would you like to continue in Thin Client mode?";
pub const CORE_ERROR_TITLE: &str = "Error Starting Core";
pub const CORE_ERROR_MESSAGE: &str = "An error occurred starting the core component required to run \
Deluge in Standalone mode.\n\nPlease see the details below for more information.";
pub const DAEMON_ERROR_TITLE: &str = "Error Starting Daemon";
pub const DAEMON_ERROR_MESSAGE: &str = "There was an error starting the daemon process.  \
Try running it from a console to see if there is an error.";

pub fn ui_defaults() -> Value {
    let download_dir = get_default_download_dir();
    json!({
        "standalone": true,
        "interactive_add": true,
        "focus_add_dialog": true,
        "enable_system_tray": true,
        "close_to_tray": false,
        "start_in_tray": false,
        "lock_tray": false,
        "tray_password": "",
        "check_new_releases": true,
        "default_load_path": null,
        "window_maximized": false,
        "window_x_pos": 0,
        "window_y_pos": 0,
        "window_width": 640,
        "window_height": 480,
        "window_pane_position": 235,
        "tray_download_speed_list": [5.0, 10.0, 30.0, 80.0, 300.0],
        "tray_upload_speed_list": [5.0, 10.0, 30.0, 80.0, 300.0],
        "connection_limit_list": [50, 100, 200, 300, 500],
        "enabled_plugins": [],
        "show_connection_manager_on_start": true,
        "autoconnect": false,
        "autoconnect_host_id": null,
        "autostart_localhost": false,
        "autoadd_queued": false,
        "choose_directory_dialog_path": download_dir,
        "show_new_releases": true,
        "show_sidebar": true,
        "show_toolbar": true,
        "show_statusbar": true,
        "sidebar_show_zero": false,
        "sidebar_show_trackers": true,
        "sidebar_show_owners": true,
        "sidebar_position": 170,
        "show_rate_in_title": false,
        "focus_main_window_on_add": true,
        "language": null,
    })
}

/// Messages from the shell to whatever draws the screen.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Status(String),
    Connected { host: String, port: u16, version: String },
    Disconnected,
    ShowConnectionManager,
    RpcStats(String),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Standalone,
    ThinClient,
    Quit,
}

/// Last RPC traffic sample: `(time, bytes_sent, bytes_recv)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RpcStats {
    pub time: f64,
    pub sent: u64,
    pub recv: u64,
}

impl RpcStats {
    /// Record a sample and format the traffic since the previous one.
    pub fn sample(&mut self, now: f64, sent: u64, recv: u64) -> String {
        let delta_time = now - self.time;
        let (sent_rate, recv_rate) = if delta_time > 0.0 {
            (
                sent.saturating_sub(self.sent) as f64 / delta_time,
                recv.saturating_sub(self.recv) as f64 / delta_time,
            )
        } else {
            (0.0, 0.0)
        };
        *self = Self { time: now, sent, recv };
        format!(
            "RPC: Sent {} ({}) Recv {} ({})",
            fsize(sent),
            fspeed(sent_rate),
            fsize(recv),
            fspeed(recv_rate)
        )
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn sample_rpc_stats(client: &DaemonClient, stats: &Mutex<RpcStats>, now: f64) -> Option<String> {
    if !client.connected() {
        return None;
    }
    let line = lock(stats).sample(now, client.get_bytes_sent(), client.get_bytes_recv());
    tracing::debug!("{}", line);
    Some(line)
}

struct StandaloneCore {
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

pub struct UiShell {
    config: ConfigManager,
    config_dir: PathBuf,
    client: Arc<DaemonClient>,
    components: Arc<Mutex<ComponentRegistry>>,
    stats: Arc<Mutex<RpcStats>>,
    events: mpsc::UnboundedSender<UiEvent>,
    retry: RetryPolicy,
    standalone: Option<StandaloneCore>,
    rpc_timer: Option<CancellationToken>,
    closing: bool,
}

impl UiShell {
    pub fn new(
        config_dir: &Path,
        client: Arc<DaemonClient>,
        events: mpsc::UnboundedSender<UiEvent>,
    ) -> Result<Self, DelugeError> {
        let state_dir = config_dir.join(UI_STATE_DIR);
        std::fs::create_dir_all(&state_dir)?;

        let config = ConfigManager::load(get_config_dir(config_dir, UI_CONFIG), defaults_from(ui_defaults()))?;
        if let Some(lang) = config.get("language").and_then(Value::as_str) {
            tracing::info!("Language set to {}", lang);
        }

        let mut registry = ComponentRegistry::new();
        registry.register(TorrentView::new(&state_dir));
        registry.register(StatusBar::new());
        let components = Arc::new(Mutex::new(registry));
        let stats = Arc::new(Mutex::new(RpcStats::default()));

        {
            let components = components.clone();
            let stats = stats.clone();
            let events = events.clone();
            client.set_disconnect_callback(move || {
                on_disconnect(&components, &stats, &events);
            });
        }

        Ok(Self {
            config,
            config_dir: config_dir.to_path_buf(),
            client,
            components,
            stats,
            events,
            retry: RetryPolicy::default(),
            standalone: None,
            rpc_timer: None,
            closing: false,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigManager {
        &mut self.config
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn client(&self) -> Arc<DaemonClient> {
        self.client.clone()
    }

    pub fn components(&self) -> Arc<Mutex<ComponentRegistry>> {
        self.components.clone()
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone.is_some()
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn daemon_bps(&self) -> RpcStats {
        *lock(&self.stats)
    }

    fn emit(&self, event: UiEvent) {
        // The screen may already be gone during shutdown.
        let _ = self.events.send(event);
    }

    /// Bring the UI up in standalone or thin-client mode.
    ///
    /// Standalone failures offer to fall back to thin-client mode; declining
    /// closes the shell.
    pub async fn start(&mut self, prompt: &dyn Prompt, connector: &dyn Connector) -> StartOutcome {
        if !self.config.get_or("standalone", true) {
            self.start_rpc_stats();
            self.start_thinclient(prompt, connector).await;
            return StartOutcome::ThinClient;
        }

        let err = match self.start_standalone().await {
            Ok(()) => return StartOutcome::Standalone,
            Err(e) => e,
        };

        let message = match err {
            DelugeError::DaemonRunning => {
                tracing::info!("Daemon already running, standalone mode unavailable");
                DAEMON_RUNNING_MESSAGE
            }
            other => {
                tracing::error!("Error starting core: {:#}", other);
                prompt
                    .show_error(CORE_ERROR_TITLE, &format!("{}\n\n{}", CORE_ERROR_MESSAGE, other))
                    .await;
                STANDALONE_FAILED_MESSAGE
            }
        };

        if !prompt.ask_yes_no(SWITCH_TITLE, message).await {
            self.close().await;
            return StartOutcome::Quit;
        }

        if let Err(e) = self.config.set("standalone", json!(false)).and_then(|_| self.config.save()) {
            tracing::error!("Unable to save {}: {}", UI_CONFIG, e);
        }
        self.start_rpc_stats();
        self.start_thinclient(prompt, connector).await;
        StartOutcome::ThinClient
    }

    /// Run a core in this process and connect to it over loopback.
    async fn start_standalone(&mut self) -> Result<(), DelugeError> {
        let pid_file = self.config_dir.join(PID_FILE);
        if is_daemon_running(&pid_file) {
            return Err(DelugeError::DaemonRunning);
        }

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let options = DaemonOptions {
            ui_interface: Some("127.0.0.1".to_string()),
            port: Some(port),
            config_dir: self.config_dir.clone(),
            ..Default::default()
        };
        let daemon = Daemon::new(options, Box::new(MemorySession::new()))?;
        let shutdown = daemon.shutdown_token();
        let handle = tokio::spawn(daemon.serve(listener));

        match self.client.connect("127.0.0.1", port, "", "").await {
            Ok(version) => {
                tracing::info!("Standalone core running on port {}", port);
                self.standalone = Some(StandaloneCore { shutdown, handle });
                self.on_connect("127.0.0.1", port, &version);
                Ok(())
            }
            Err(e) => {
                shutdown.cancel();
                if let Ok(Err(serve_err)) = handle.await {
                    tracing::debug!("Standalone core exited: {:#}", serve_err);
                }
                Err(e)
            }
        }
    }

    async fn start_thinclient(&mut self, prompt: &dyn Prompt, connector: &dyn Connector) {
        let connected = if self.config.get_or("autoconnect", false) {
            self.autoconnect(prompt, connector).await.is_some()
        } else {
            false
        };
        if !connected && self.config.get_or("show_connection_manager_on_start", true) {
            self.emit(UiEvent::ShowConnectionManager);
        }
    }

    /// Connect to the host named by `autoconnect_host_id`, starting a local
    /// daemon first when configured. Returns the daemon version.
    pub async fn autoconnect(&mut self, prompt: &dyn Prompt, connector: &dyn Connector) -> Option<String> {
        let host_id: Option<String> = self.config.get_or("autoconnect_host_id", None);
        let host_id = host_id?;
        let host = match HostList::load(&self.config_dir) {
            Ok(list) => list.get_host(&host_id),
            Err(e) => {
                tracing::error!("Unable to load host list: {}", e);
                return None;
            }
        };
        let Some(host) = host else {
            tracing::warn!("Autoconnect host {} is not in the host list", host_id);
            return None;
        };

        if self.config.get_or("autostart_localhost", false) && host.is_localhost() {
            tracing::debug!("Autostarting localhost:{}", host.port);
            if let Err(e) = connector.start_daemon(host.port, &self.config_dir).await {
                tracing::error!("Localhost daemon failed to start: {}", e);
                prompt.show_error(DAEMON_ERROR_TITLE, DAEMON_ERROR_MESSAGE).await;
                return None;
            }
        }

        let outcome = connect_with_retry(
            connector,
            prompt,
            self.retry,
            &host.host,
            host.port,
            &host.username,
            &host.password,
        )
        .await;
        match outcome {
            ConnectOutcome::Connected { version } => {
                self.on_connect(&host.host, host.port, &version);
                Some(version)
            }
            ConnectOutcome::Cancelled => None,
            ConnectOutcome::GaveUp(e) => {
                tracing::warn!("Giving up connecting to {}:{}: {}", host.host, host.port, e);
                self.emit(UiEvent::Status(format!("Unable to connect to {}:{}", host.host, host.port)));
                None
            }
        }
    }

    /// Start the components once a daemon connection exists.
    pub fn on_connect(&self, host: &str, port: u16, version: &str) {
        {
            let mut components = lock(&self.components);
            if let Some(bar) = components.get_mut::<StatusBar>() {
                bar.set_connected(host, port, version);
            }
            components.start_all();
        }
        self.emit(UiEvent::Connected {
            host: host.to_string(),
            port,
            version: version.to_string(),
        });
    }

    pub fn on_disconnect(&self) {
        on_disconnect(&self.components, &self.stats, &self.events);
    }

    pub fn print_rpc_stats(&self) -> Option<String> {
        self.print_rpc_stats_at(now_secs())
    }

    /// Sample RPC traffic at `now` (seconds); `None` while disconnected.
    pub fn print_rpc_stats_at(&self, now: f64) -> Option<String> {
        sample_rpc_stats(&self.client, &self.stats, now)
    }

    fn start_rpc_stats(&mut self) {
        if self.rpc_timer.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let client = self.client.clone();
        let stats = self.stats.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RPC_STATS_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if let Some(line) = sample_rpc_stats(&client, &stats, now_secs()) {
                            let _ = events.send(UiEvent::RpcStats(line));
                        }
                    }
                }
            }
        });
        self.rpc_timer = Some(token);
    }

    /// Save state and shut everything down. Only the first call does
    /// anything; returns whether this call did the work.
    pub async fn close(&mut self) -> bool {
        if self.closing {
            return false;
        }
        self.closing = true;
        tracing::debug!("UI shell closing");

        if let Err(e) = self.config.save() {
            tracing::error!("Unable to save {}: {}", UI_CONFIG, e);
        }
        {
            let components = lock(&self.components);
            if let Some(view) = components.get::<TorrentView>() {
                if let Err(e) = view.save_state() {
                    tracing::warn!("Unable to save torrent view state: {:#}", e);
                }
            }
        }
        if let Some(timer) = self.rpc_timer.take() {
            timer.cancel();
        }

        lock(&self.components).shutdown();
        self.client.disconnect().await;

        if let Some(core) = self.standalone.take() {
            core.shutdown.cancel();
            match core.handle.await {
                Ok(Ok(())) => tracing::debug!("Standalone core stopped"),
                Ok(Err(e)) => tracing::error!("Standalone core failed: {:#}", e),
                Err(e) => tracing::error!("Standalone core task panicked: {}", e),
            }
        }

        self.emit(UiEvent::Closed);
        true
    }
}

fn on_disconnect(
    components: &Mutex<ComponentRegistry>,
    stats: &Mutex<RpcStats>,
    events: &mpsc::UnboundedSender<UiEvent>,
) {
    tracing::debug!("Disconnected from daemon");
    *lock(stats) = RpcStats::default();
    lock(components).stop_all();
    let _ = events.send(UiEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentState;
    use crate::connect::testing::{ScriptedConnector, ScriptedPrompt};
    use crate::hostlist::HostList;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            retries: 6,
            delay: Duration::from_millis(1),
        }
    }

    fn shell(dir: &Path) -> (UiShell, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(DaemonClient::new().with_config_dir(dir));
        let shell = UiShell::new(dir, client, tx).unwrap().with_retry_policy(fast());
        (shell, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    fn thin_client(shell: &mut UiShell, autoconnect: bool) -> String {
        let mut hosts = HostList::load(shell.config_dir()).unwrap();
        let id = hosts.add_host("10.0.0.5", "58846", "alice", "pw").unwrap();
        let config = shell.config_mut();
        config.set("standalone", json!(false)).unwrap();
        config.set("autoconnect", json!(autoconnect)).unwrap();
        config.set("autoconnect_host_id", json!(id)).unwrap();
        id
    }

    #[test]
    fn test_new_creates_state_dir_and_components() {
        let dir = tempfile::tempdir().unwrap();
        let (shell, _rx) = shell(dir.path());
        assert!(dir.path().join(UI_STATE_DIR).is_dir());
        assert_eq!(lock(&shell.components).names(), vec!["TorrentView", "StatusBar"]);
        assert!(shell.config().get_or("standalone", false));
        assert_eq!(shell.config().get("autoconnect_host_id"), Some(&Value::Null));
    }

    #[test]
    fn test_rpc_stats_sample() {
        let mut stats = RpcStats::default();
        stats.sample(100.0, 1024, 2048);
        let line = stats.sample(110.0, 1024 + 10240, 2048 + 20480);
        assert_eq!(line, "RPC: Sent 11.0 KiB (1.0 KiB/s) Recv 22.0 KiB (2.0 KiB/s)");
        assert_eq!(stats, RpcStats { time: 110.0, sent: 11264, recv: 22528 });

        let same_instant = stats.sample(110.0, 11264, 22528);
        assert_eq!(same_instant, "RPC: Sent 11.0 KiB (0.0 KiB/s) Recv 22.0 KiB (0.0 KiB/s)");
    }

    #[test]
    fn test_rpc_stats_skipped_while_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let (shell, _rx) = shell(dir.path());
        assert_eq!(shell.print_rpc_stats_at(10.0), None);
        assert_eq!(shell.daemon_bps(), RpcStats::default());
    }

    #[tokio::test]
    async fn test_on_disconnect_resets_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let (shell, mut rx) = shell(dir.path());
        shell.on_connect("10.0.0.5", 58846, "2.1.1");
        *lock(&shell.stats) = RpcStats { time: 5.0, sent: 1, recv: 2 };
        assert_eq!(
            lock(&shell.components).state("StatusBar"),
            Some(ComponentState::Started)
        );

        shell.on_disconnect();
        assert_eq!(shell.daemon_bps(), RpcStats::default());
        assert_eq!(
            lock(&shell.components).state("TorrentView"),
            Some(ComponentState::Stopped)
        );
        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(UiEvent::Connected { .. })));
        assert_eq!(events.last(), Some(&UiEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_thin_client_autoconnect() {
        let dir = tempfile::tempdir().unwrap();
        let (mut shell, mut rx) = shell(dir.path());
        thin_client(&mut shell, true);
        let connector = ScriptedConnector::new(vec![
            Err(DelugeError::Connection("refused".into())),
            Ok("2.1.1".into()),
        ]);
        let prompt = ScriptedPrompt::default();

        assert_eq!(shell.start(&prompt, &connector).await, StartOutcome::ThinClient);
        assert_eq!(connector.attempts().len(), 2);
        assert_eq!(connector.attempts()[0], ("alice".to_string(), "pw".to_string()));
        assert!(connector.daemons_started.lock().unwrap().is_empty());
        let events = drain(&mut rx);
        assert!(events.contains(&UiEvent::Connected {
            host: "10.0.0.5".into(),
            port: 58846,
            version: "2.1.1".into()
        }));
        assert!(!events.contains(&UiEvent::ShowConnectionManager));
        shell.close().await;
    }

    #[tokio::test]
    async fn test_thin_client_without_autoconnect_shows_manager() {
        let dir = tempfile::tempdir().unwrap();
        let (mut shell, mut rx) = shell(dir.path());
        thin_client(&mut shell, false);
        let connector = ScriptedConnector::default();
        let prompt = ScriptedPrompt::default();

        assert_eq!(shell.start(&prompt, &connector).await, StartOutcome::ThinClient);
        assert!(connector.attempts().is_empty());
        assert_eq!(drain(&mut rx), vec![UiEvent::ShowConnectionManager]);
        shell.close().await;
    }

    #[tokio::test]
    async fn test_autoconnect_gives_up_and_shows_manager() {
        let dir = tempfile::tempdir().unwrap();
        let (mut shell, mut rx) = shell(dir.path());
        thin_client(&mut shell, true);
        let connector = ScriptedConnector::default();
        let prompt = ScriptedPrompt::default();

        shell.start(&prompt, &connector).await;
        assert_eq!(connector.attempts().len(), 7);
        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(UiEvent::Status(_))));
        assert_eq!(events.last(), Some(&UiEvent::ShowConnectionManager));
        shell.close().await;
    }

    #[tokio::test]
    async fn test_autostart_localhost_failure_skips_connect() {
        let dir = tempfile::tempdir().unwrap();
        let (mut shell, _rx) = shell(dir.path());
        let hosts = HostList::load(dir.path()).unwrap();
        let local = hosts.hosts()[0].clone();
        let config = shell.config_mut();
        config.set("autoconnect_host_id", json!(local.id)).unwrap();
        config.set("autostart_localhost", json!(true)).unwrap();

        let connector = ScriptedConnector {
            daemon_fails: true,
            ..Default::default()
        };
        let prompt = ScriptedPrompt::default();
        assert_eq!(shell.autoconnect(&prompt, &connector).await, None);
        assert_eq!(*connector.daemons_started.lock().unwrap(), vec![local.port]);
        assert!(connector.attempts().is_empty());
        assert_eq!(*prompt.asked.lock().unwrap(), vec![DAEMON_ERROR_TITLE.to_string()]);
    }

    #[tokio::test]
    async fn test_autoconnect_unknown_host() {
        let dir = tempfile::tempdir().unwrap();
        let (mut shell, _rx) = shell(dir.path());
        shell.config_mut().set("autoconnect_host_id", json!("f".repeat(40))).unwrap();
        let connector = ScriptedConnector::default();
        let prompt = ScriptedPrompt::default();
        assert_eq!(shell.autoconnect(&prompt, &connector).await, None);
        assert!(connector.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_standalone_with_running_daemon_declined_quits() {
        let dir = tempfile::tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::fs::write(dir.path().join(PID_FILE), format!("{};{}", std::process::id(), port)).unwrap();

        let (mut shell, mut rx) = shell(dir.path());
        let connector = ScriptedConnector::default();
        let prompt = ScriptedPrompt::default();
        assert_eq!(shell.start(&prompt, &connector).await, StartOutcome::Quit);
        assert_eq!(*prompt.asked.lock().unwrap(), vec![SWITCH_TITLE.to_string()]);
        assert!(shell.is_closing());
        assert_eq!(drain(&mut rx).last(), Some(&UiEvent::Closed));
        assert!(dir.path().join(UI_CONFIG).exists());
    }

    #[tokio::test]
    async fn test_standalone_with_running_daemon_switches_to_thin_client() {
        let dir = tempfile::tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::fs::write(dir.path().join(PID_FILE), format!("{};{}", std::process::id(), port)).unwrap();

        let (mut shell, _rx) = shell(dir.path());
        let connector = ScriptedConnector::default();
        let prompt = ScriptedPrompt {
            yes: true,
            ..Default::default()
        };
        assert_eq!(shell.start(&prompt, &connector).await, StartOutcome::ThinClient);
        assert!(!shell.config().get_or("standalone", true));

        let saved = ConfigManager::load(dir.path().join(UI_CONFIG), defaults_from(ui_defaults())).unwrap();
        assert!(!saved.get_or("standalone", true));
        shell.close().await;
    }

    /// An `auth` directory where the account file belongs keeps the core
    /// from loading its accounts.
    fn break_core(dir: &Path) {
        std::fs::create_dir(dir.join("auth")).unwrap();
    }

    #[tokio::test]
    async fn test_core_error_declined_quits() {
        let dir = tempfile::tempdir().unwrap();
        break_core(dir.path());

        let (mut shell, mut rx) = shell(dir.path());
        let connector = ScriptedConnector::default();
        let prompt = ScriptedPrompt::default();
        assert_eq!(shell.start(&prompt, &connector).await, StartOutcome::Quit);
        assert_eq!(
            *prompt.asked.lock().unwrap(),
            vec![CORE_ERROR_TITLE.to_string(), SWITCH_TITLE.to_string()]
        );
        let messages = prompt.messages.lock().unwrap().clone();
        assert!(messages[0].starts_with(CORE_ERROR_MESSAGE), "{}", messages[0]);
        assert_eq!(messages[1], STANDALONE_FAILED_MESSAGE);

        assert!(!shell.is_standalone());
        assert!(shell.is_closing());
        assert!(!dir.path().join(PID_FILE).exists());
        assert_eq!(drain(&mut rx).last(), Some(&UiEvent::Closed));
        assert!(shell.config().get_or("standalone", false));
    }

    #[tokio::test]
    async fn test_core_error_switches_to_thin_client() {
        let dir = tempfile::tempdir().unwrap();
        break_core(dir.path());

        let (mut shell, _rx) = shell(dir.path());
        let connector = ScriptedConnector::default();
        let prompt = ScriptedPrompt {
            yes: true,
            ..Default::default()
        };
        assert_eq!(shell.start(&prompt, &connector).await, StartOutcome::ThinClient);
        assert_eq!(
            *prompt.asked.lock().unwrap(),
            vec![CORE_ERROR_TITLE.to_string(), SWITCH_TITLE.to_string()]
        );
        assert_eq!(prompt.messages.lock().unwrap()[1], STANDALONE_FAILED_MESSAGE);
        assert!(!shell.is_standalone());
        assert!(!shell.is_closing());

        let saved = ConfigManager::load(dir.path().join(UI_CONFIG), defaults_from(ui_defaults())).unwrap();
        assert!(!saved.get_or("standalone", true));
        assert!(shell.close().await);
    }

    #[tokio::test]
    async fn test_standalone_core_starts_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut shell, mut rx) = shell(dir.path());
        let connector = ScriptedConnector::default();
        let prompt = ScriptedPrompt::default();

        assert_eq!(shell.start(&prompt, &connector).await, StartOutcome::Standalone);
        assert!(shell.is_standalone());
        assert!(shell.client().connected());
        assert!(dir.path().join(PID_FILE).exists());
        assert_eq!(
            lock(&shell.components).state("TorrentView"),
            Some(ComponentState::Started)
        );
        assert!(shell.print_rpc_stats().unwrap().starts_with("RPC: Sent "));

        assert!(shell.close().await);
        assert!(!shell.close().await);
        assert!(!shell.client().connected());
        assert!(!dir.path().join(PID_FILE).exists());
        assert!(dir.path().join(UI_STATE_DIR).join("torrentview.state").exists());
        assert!(lock(&shell.components).is_shut_down());

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(UiEvent::Connected { .. })));
        assert!(events.contains(&UiEvent::Disconnected));
        assert_eq!(events.last(), Some(&UiEvent::Closed));
    }
}
