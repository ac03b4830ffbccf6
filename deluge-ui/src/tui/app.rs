//! TUI state and key handling. Nothing here awaits; work that needs the
//! network is queued as an [`Action`] for the event loop to spawn.

use async_trait::async_trait;
use crossterm::event::{KeyCode, KeyEvent};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use deluge_core::session::TorrentStatus;

use crate::component::ComponentRegistry;
use crate::connect::Prompt;
use crate::hostlist::{HostEntry, HostList, DEFAULT_PORT};
use crate::shell::UiEvent;
use crate::statusbar::StatusBar;
use crate::torrentview::TorrentView;

// ═══════════════════════════════════════════════════════
// Prompts answered from the screen
// ═══════════════════════════════════════════════════════

pub enum PromptRequest {
    YesNo {
        title: String,
        message: String,
        reply: oneshot::Sender<bool>,
    },
    Credentials {
        message: String,
        username: String,
        reply: oneshot::Sender<Option<(String, String)>>,
    },
    Error {
        title: String,
        message: String,
    },
}

/// [`Prompt`] backed by popups. A closed screen answers "no"/cancel.
#[derive(Clone)]
pub struct TuiPrompt {
    tx: mpsc::UnboundedSender<PromptRequest>,
}

impl TuiPrompt {
    pub fn new(tx: mpsc::UnboundedSender<PromptRequest>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Prompt for TuiPrompt {
    async fn ask_yes_no(&self, title: &str, message: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let request = PromptRequest::YesNo {
            title: title.to_string(),
            message: message.to_string(),
            reply,
        };
        if self.tx.send(request).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    async fn ask_credentials(&self, message: &str, username: &str) -> Option<(String, String)> {
        let (reply, rx) = oneshot::channel();
        let request = PromptRequest::Credentials {
            message: message.to_string(),
            username: username.to_string(),
            reply,
        };
        self.tx.send(request).ok()?;
        rx.await.ok().flatten()
    }

    async fn show_error(&self, title: &str, message: &str) {
        let _ = self.tx.send(PromptRequest::Error {
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}

// ═══════════════════════════════════════════════════════
// Screen state
// ═══════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    ConnectionManager,
    Torrents,
}

pub const ADD_HOST_LABELS: [&str; 4] = ["Host", "Port", "Username", "Password"];

pub enum Popup {
    Message {
        title: String,
        text: String,
    },
    YesNo {
        title: String,
        text: String,
        reply: oneshot::Sender<bool>,
    },
    Credentials {
        text: String,
        fields: [String; 2],
        focus: usize,
        reply: oneshot::Sender<Option<(String, String)>>,
    },
    AddHost {
        fields: [String; 4],
        focus: usize,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    RefreshHosts,
    Connect(HostEntry),
    Disconnect,
    RefreshTorrents,
}

pub struct App {
    pub screen: Screen,
    pub popup: Option<Popup>,
    pending: VecDeque<Popup>,
    pub hosts: Vec<HostEntry>,
    /// Host id → daemon version for hosts that answered.
    pub online: HashMap<String, String>,
    pub host_selected: usize,
    pub connected: Option<(String, u16, String)>,
    pub status: Option<String>,
    pub components: Arc<Mutex<ComponentRegistry>>,
    pub config_dir: PathBuf,
    pub actions: Vec<Action>,
    pub quit: bool,
}

impl App {
    pub fn new(config_dir: PathBuf, components: Arc<Mutex<ComponentRegistry>>) -> Self {
        let mut app = Self {
            screen: Screen::ConnectionManager,
            popup: None,
            pending: VecDeque::new(),
            hosts: Vec::new(),
            online: HashMap::new(),
            host_selected: 0,
            connected: None,
            status: None,
            components,
            config_dir,
            actions: Vec::new(),
            quit: false,
        };
        app.reload_hosts();
        app
    }

    pub fn components(&self) -> std::sync::MutexGuard<'_, ComponentRegistry> {
        self.components.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn show(&mut self, popup: Popup) {
        if self.popup.is_none() {
            self.popup = Some(popup);
        } else {
            self.pending.push_back(popup);
        }
    }

    fn close_popup(&mut self) {
        self.popup = self.pending.pop_front();
    }

    pub fn show_message(&mut self, title: impl Into<String>, text: impl Into<String>) {
        self.show(Popup::Message {
            title: title.into(),
            text: text.into(),
        });
    }

    pub fn reload_hosts(&mut self) {
        match HostList::load(&self.config_dir) {
            Ok(list) => self.hosts = list.hosts(),
            Err(e) => self.show_message("Host List", e.to_string()),
        }
        self.host_selected = self.host_selected.min(self.hosts.len().saturating_sub(1));
    }

    pub fn selected_host(&self) -> Option<&HostEntry> {
        self.hosts.get(self.host_selected)
    }

    // ─── Incoming ───────────────────────────────────

    pub fn on_prompt(&mut self, request: PromptRequest) {
        let popup = match request {
            PromptRequest::YesNo { title, message, reply } => Popup::YesNo {
                title,
                text: message,
                reply,
            },
            PromptRequest::Credentials { message, username, reply } => Popup::Credentials {
                text: message,
                fields: [username, String::new()],
                focus: 1,
                reply,
            },
            PromptRequest::Error { title, message } => Popup::Message { title, text: message },
        };
        self.show(popup);
    }

    pub fn on_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Status(text) => self.status = Some(text),
            UiEvent::Connected { host, port, version } => {
                self.status = Some(format!("Connected to {}:{}", host, port));
                self.connected = Some((host, port, version));
                self.screen = Screen::Torrents;
                self.actions.push(Action::RefreshTorrents);
            }
            UiEvent::Disconnected => {
                self.connected = None;
                self.status = Some("Disconnected from daemon".to_string());
                self.screen = Screen::ConnectionManager;
                self.actions.push(Action::RefreshHosts);
            }
            UiEvent::ShowConnectionManager => {
                self.screen = Screen::ConnectionManager;
                self.actions.push(Action::RefreshHosts);
            }
            UiEvent::RpcStats(line) => {
                if let Some(bar) = self.components().get_mut::<StatusBar>() {
                    bar.set_rpc_stats(line);
                }
            }
            UiEvent::Closed => self.quit = true,
        }
    }

    pub fn on_torrents(&mut self, torrents: Vec<TorrentStatus>) {
        let mut components = self.components();
        if let Some(bar) = components.get_mut::<StatusBar>() {
            bar.set_torrents(&torrents);
        }
        if let Some(view) = components.get_mut::<TorrentView>() {
            view.set_torrents(torrents);
        }
        components.update_all();
    }

    // ─── Keys ───────────────────────────────────────

    pub fn on_key(&mut self, key: KeyEvent) {
        if self.popup.is_some() {
            self.on_popup_key(key);
            return;
        }
        match self.screen {
            Screen::ConnectionManager => self.on_manager_key(key),
            Screen::Torrents => self.on_torrents_key(key),
        }
    }

    fn on_manager_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.host_selected = self.host_selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.host_selected + 1 < self.hosts.len() {
                    self.host_selected += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(host) = self.selected_host().cloned() {
                    self.status = Some(format!("Connecting to {}:{}..", host.host, host.port));
                    self.actions.push(Action::Connect(host));
                }
            }
            KeyCode::Char('a') => self.show(Popup::AddHost {
                fields: [String::new(), DEFAULT_PORT.to_string(), String::new(), String::new()],
                focus: 0,
                error: None,
            }),
            KeyCode::Char('D') => self.remove_selected_host(),
            KeyCode::Char('r') => self.actions.push(Action::RefreshHosts),
            KeyCode::Esc => {
                if self.connected.is_some() {
                    self.screen = Screen::Torrents;
                }
            }
            KeyCode::Char('Q') | KeyCode::Char('q') => self.quit = true,
            _ => {}
        }
    }

    fn on_torrents_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                if let Some(view) = self.components().get_mut::<TorrentView>() {
                    view.select_prev();
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if let Some(view) = self.components().get_mut::<TorrentView>() {
                    view.select_next();
                }
            }
            KeyCode::Char('c') => {
                self.screen = Screen::ConnectionManager;
                self.actions.push(Action::RefreshHosts);
            }
            KeyCode::Char('d') => self.actions.push(Action::Disconnect),
            KeyCode::Char('Q') | KeyCode::Char('q') => self.quit = true,
            _ => {}
        }
    }

    fn remove_selected_host(&mut self) {
        let Some(id) = self.selected_host().map(|h| h.id.clone()) else {
            return;
        };
        let removed = HostList::load(&self.config_dir).and_then(|mut list| list.remove_host(&id));
        match removed {
            Ok(_) => {
                self.online.remove(&id);
                self.reload_hosts();
            }
            Err(e) => self.show_message("Remove Host", e.to_string()),
        }
    }

    fn on_popup_key(&mut self, key: KeyEvent) {
        let Some(popup) = self.popup.take() else {
            return;
        };
        match popup {
            Popup::Message { .. } => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                    self.close_popup();
                } else {
                    self.popup = Some(popup);
                }
            }
            Popup::YesNo { title, text, reply } => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    let _ = reply.send(true);
                    self.close_popup();
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    let _ = reply.send(false);
                    self.close_popup();
                }
                _ => self.popup = Some(Popup::YesNo { title, text, reply }),
            },
            Popup::Credentials { text, mut fields, mut focus, reply } => match key.code {
                KeyCode::Enter => {
                    let [username, password] = fields;
                    let _ = reply.send(Some((username, password)));
                    self.close_popup();
                }
                KeyCode::Esc => {
                    let _ = reply.send(None);
                    self.close_popup();
                }
                code => {
                    edit_fields(&mut fields, &mut focus, code);
                    self.popup = Some(Popup::Credentials { text, fields, focus, reply });
                }
            },
            Popup::AddHost { mut fields, mut focus, error } => match key.code {
                KeyCode::Esc => self.close_popup(),
                KeyCode::Enter => {
                    let [host, port, username, password] = &fields;
                    let added = HostList::load(&self.config_dir)
                        .and_then(|mut list| list.add_host(host.trim(), port, username, password));
                    match added {
                        Ok(_) => {
                            self.reload_hosts();
                            self.actions.push(Action::RefreshHosts);
                            self.close_popup();
                        }
                        Err(e) => {
                            self.popup = Some(Popup::AddHost {
                                fields,
                                focus,
                                error: Some(e.to_string()),
                            })
                        }
                    }
                }
                code => {
                    edit_fields(&mut fields, &mut focus, code);
                    self.popup = Some(Popup::AddHost { fields, focus, error });
                }
            },
        }
    }

    /// Drain queued actions for the event loop.
    pub fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }
}

fn edit_fields<const N: usize>(fields: &mut [String; N], focus: &mut usize, code: KeyCode) {
    match code {
        KeyCode::Tab | KeyCode::Down => *focus = (*focus + 1) % N,
        KeyCode::BackTab | KeyCode::Up => *focus = (*focus + N - 1) % N,
        KeyCode::Backspace => {
            fields[*focus].pop();
        }
        KeyCode::Char(c) => fields[*focus].push(c),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.on_key(key(KeyCode::Char(c)));
        }
    }

    fn app(dir: &std::path::Path) -> App {
        App::new(dir.to_path_buf(), Arc::new(Mutex::new(ComponentRegistry::new())))
    }

    #[test]
    fn test_add_host_popup() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        assert_eq!(app.hosts.len(), 1);

        app.on_key(key(KeyCode::Char('a')));
        type_text(&mut app, "seedbox");
        app.on_key(key(KeyCode::Tab));
        for _ in 0..5 {
            app.on_key(key(KeyCode::Backspace));
        }
        type_text(&mut app, "port");
        app.on_key(key(KeyCode::Enter));
        match &app.popup {
            Some(Popup::AddHost { error: Some(e), .. }) => {
                assert_eq!(e, "Invalid port. Must be an integer")
            }
            _ => panic!("expected add host error"),
        }

        for _ in 0..4 {
            app.on_key(key(KeyCode::Backspace));
        }
        type_text(&mut app, "1234");
        app.on_key(key(KeyCode::Enter));
        assert!(app.popup.is_none());
        assert_eq!(app.hosts.len(), 2);
        assert_eq!(app.hosts[1].host, "seedbox");
        assert_eq!(app.hosts[1].port, 1234);
        assert_eq!(app.take_actions(), vec![Action::RefreshHosts]);
    }

    #[test]
    fn test_delete_and_connect_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let local = app.hosts[0].clone();

        app.on_key(key(KeyCode::Enter));
        app.on_key(key(KeyCode::Char('r')));
        assert_eq!(
            app.take_actions(),
            vec![Action::Connect(local), Action::RefreshHosts]
        );

        app.on_key(key(KeyCode::Char('D')));
        assert!(app.hosts.is_empty());
        app.on_key(key(KeyCode::Enter));
        assert!(app.take_actions().is_empty());

        app.on_key(key(KeyCode::Char('Q')));
        assert!(app.quit);
    }

    #[tokio::test]
    async fn test_prompts_are_answered_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let prompt = TuiPrompt::new(tx);

        let asking = tokio::spawn({
            let prompt = prompt.clone();
            async move { prompt.ask_yes_no("Switch?", "Continue?").await }
        });
        app.on_prompt(rx.recv().await.unwrap());
        let creds = tokio::spawn({
            let prompt = prompt.clone();
            async move { prompt.ask_credentials("Username required", "bob").await }
        });
        app.on_prompt(rx.recv().await.unwrap());
        assert!(matches!(app.popup, Some(Popup::YesNo { .. })));

        app.on_key(key(KeyCode::Char('y')));
        assert!(asking.await.unwrap());

        assert!(matches!(app.popup, Some(Popup::Credentials { focus: 1, .. })));
        type_text(&mut app, "pw");
        app.on_key(key(KeyCode::Enter));
        assert_eq!(creds.await.unwrap(), Some(("bob".to_string(), "pw".to_string())));
        assert!(app.popup.is_none());
    }

    #[tokio::test]
    async fn test_dropped_screen_answers_no() {
        let (tx, rx) = mpsc::unbounded_channel();
        let prompt = TuiPrompt::new(tx);
        drop(rx);
        assert!(!prompt.ask_yes_no("t", "m").await);
        assert_eq!(prompt.ask_credentials("m", "u").await, None);
    }

    #[test]
    fn test_ui_events_switch_screens() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.on_ui_event(UiEvent::Connected {
            host: "127.0.0.1".into(),
            port: 58846,
            version: "2.1.1".into(),
        });
        assert_eq!(app.screen, Screen::Torrents);
        app.on_ui_event(UiEvent::Disconnected);
        assert_eq!(app.screen, Screen::ConnectionManager);
        assert!(app.connected.is_none());
        assert_eq!(
            app.take_actions(),
            vec![Action::RefreshTorrents, Action::RefreshHosts]
        );
        app.on_ui_event(UiEvent::Closed);
        assert!(app.quit);
    }
}
