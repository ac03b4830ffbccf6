//! Terminal front end.
//!
//! The shell starts in a background task while this loop draws. Prompts the
//! shell raises come back over a channel and are answered through popups.

pub mod app;
pub mod render;
pub mod theme;

use std::collections::HashMap;
use std::io::{self, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tokio::sync::{mpsc, Mutex};

use deluge_core::client::DaemonClient;
use deluge_core::session::TorrentStatus;

use crate::connect::{connect_with_retry, ConnectOutcome, RetryPolicy};
use crate::hostlist::refresh_statuses;
use crate::shell::{StartOutcome, UiEvent, UiShell};
use app::{Action, App, PromptRequest, TuiPrompt};

const TORRENT_REFRESH: Duration = Duration::from_secs(1);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Results of background work, folded into the app on the next tick.
enum Background {
    Hosts(HashMap<String, String>),
    Torrents(Vec<TorrentStatus>),
    Error { title: String, message: String },
    Signal,
}

// ═══════════════════════════════════════════════════════
// Entry point
// ═══════════════════════════════════════════════════════

pub async fn run(config_dir: PathBuf) -> anyhow::Result<()> {
    let client = Arc::new(DaemonClient::new().with_config_dir(&config_dir));
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let shell = UiShell::new(&config_dir, client.clone(), ui_tx)?;
    let components = shell.components();
    let shell = Arc::new(Mutex::new(shell));

    let (prompt_tx, mut prompt_rx) = mpsc::unbounded_channel::<PromptRequest>();
    let (bg_tx, mut bg_rx) = mpsc::unbounded_channel::<Background>();
    let prompt = TuiPrompt::new(prompt_tx);

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        default_hook(info);
    }));

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(out))?;
    terminal.clear()?;

    let mut app = App::new(config_dir.clone(), components);

    // ── Background tasks ──────────────────────────────

    // 1) shell startup
    {
        let shell = shell.clone();
        let prompt = prompt.clone();
        let client = client.clone();
        tokio::spawn(async move {
            let mut shell = shell.lock().await;
            match shell.start(&prompt, client.as_ref()).await {
                StartOutcome::Standalone => tracing::info!("Running in standalone mode"),
                StartOutcome::ThinClient => tracing::info!("Running in thin client mode"),
                StartOutcome::Quit => tracing::info!("Startup declined, quitting"),
            }
        });
    }

    // 2) torrent polling
    {
        let client = client.clone();
        let tx = bg_tx.clone();
        tokio::spawn(async move {
            loop {
                if client.connected() {
                    match client.get_torrents().await {
                        Ok(torrents) => {
                            if tx.send(Background::Torrents(torrents)).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::debug!("Torrent refresh failed: {}", e),
                    }
                }
                tokio::time::sleep(TORRENT_REFRESH).await;
            }
        });
    }

    // 3) SIGINT / SIGTERM
    {
        let tx = bg_tx.clone();
        tokio::spawn(async move {
            wait_for_close_signal().await;
            let _ = tx.send(Background::Signal);
        });
    }

    spawn_host_refresh(&app, &bg_tx);

    // ── Event loop ────────────────────────────────────
    let tick = Duration::from_millis(50);
    let mut last_render = Instant::now() - Duration::from_secs(1);

    loop {
        while let Ok(event) = ui_rx.try_recv() {
            app.on_ui_event(event);
        }
        while let Ok(request) = prompt_rx.try_recv() {
            app.on_prompt(request);
        }
        while let Ok(result) = bg_rx.try_recv() {
            match result {
                Background::Hosts(online) => app.online = online,
                Background::Torrents(torrents) => app.on_torrents(torrents),
                Background::Error { title, message } => app.show_message(title, message),
                Background::Signal => {
                    tracing::debug!("Close signal caught");
                    app.quit = true;
                }
            }
        }
        for action in app.take_actions() {
            dispatch(action, &app, &client, &shell, &prompt, &bg_tx);
        }

        if last_render.elapsed() >= Duration::from_millis(16) {
            terminal.draw(|f| render::render(&app, f))?;
            last_render = Instant::now();
        }

        if app.quit {
            break;
        }

        if event::poll(tick)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL)
                    && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d'))
                {
                    app.quit = true;
                    continue;
                }
                app.on_key(key);
            }
        }
    }

    // ── Cleanup ───────────────────────────────────────
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    // Unanswered prompts resolve as "no" once the screen is gone.
    drop(app);
    drop(prompt_rx);

    match tokio::time::timeout(CLOSE_TIMEOUT, async { shell.lock().await.close().await }).await {
        Ok(_) => {}
        Err(_) => tracing::warn!("Timed out waiting for the UI shell to close"),
    }
    Ok(())
}

fn spawn_host_refresh(app: &App, tx: &mpsc::UnboundedSender<Background>) {
    let hosts = app.hosts.clone();
    let dir = app.config_dir.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let online = refresh_statuses(hosts, dir).await;
        let _ = tx.send(Background::Hosts(online));
    });
}

fn dispatch(
    action: Action,
    app: &App,
    client: &Arc<DaemonClient>,
    shell: &Arc<Mutex<UiShell>>,
    prompt: &TuiPrompt,
    tx: &mpsc::UnboundedSender<Background>,
) {
    match action {
        Action::RefreshHosts => spawn_host_refresh(app, tx),
        Action::RefreshTorrents => {
            let client = client.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Ok(torrents) = client.get_torrents().await {
                    let _ = tx.send(Background::Torrents(torrents));
                }
            });
        }
        Action::Connect(host) => {
            let client = client.clone();
            let shell = shell.clone();
            let prompt = prompt.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                // One retry, so a rejected login can be answered with new credentials.
                let policy = RetryPolicy {
                    retries: 1,
                    delay: Duration::ZERO,
                };
                let outcome = connect_with_retry(
                    client.as_ref(),
                    &prompt,
                    policy,
                    &host.host,
                    host.port,
                    &host.username,
                    &host.password,
                )
                .await;
                match outcome {
                    ConnectOutcome::Connected { version } => {
                        shell.lock().await.on_connect(&host.host, host.port, &version);
                    }
                    ConnectOutcome::Cancelled => {}
                    ConnectOutcome::GaveUp(e) => {
                        let _ = tx.send(Background::Error {
                            title: "Connection Failed".to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            });
        }
        Action::Disconnect => {
            let client = client.clone();
            tokio::spawn(async move { client.disconnect().await });
        }
    }
}

async fn wait_for_close_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Unable to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
