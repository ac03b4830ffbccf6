//! Layout and widgets for the connection manager, the torrent list and the
//! popups drawn over them.

use ratatui::prelude::*;
use ratatui::widgets::{Block, BorderType, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use super::app::{App, Popup, Screen, ADD_HOST_LABELS};
use super::theme::Theme;
use crate::colors::{parse_color_string, state_color};
use crate::statusbar::StatusBar;
use crate::torrentview::TorrentView;

// ═══════════════════════════════════════════════════════
// Top level
// ═══════════════════════════════════════════════════════

pub fn render(app: &App, frame: &mut Frame) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),
            Constraint::Length(1), // status bar
            Constraint::Length(1), // hints
        ])
        .split(area);

    match app.screen {
        Screen::ConnectionManager => render_connection_manager(app, frame, chunks[0]),
        Screen::Torrents => render_torrents(app, frame, chunks[0]),
    }
    render_status_bar(app, frame, chunks[1]);
    render_hint_bar(app, frame, chunks[2]);

    if let Some(popup) = &app.popup {
        render_popup(popup, frame, area);
    }
}

fn panel(title: &str, active: bool) -> Block<'_> {
    Block::default()
        .title(Span::styled(format!(" {} ", title), Theme::title()))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if active { Theme::border_active() } else { Theme::border() })
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    )
}

// ═══════════════════════════════════════════════════════
// Connection manager
// ═══════════════════════════════════════════════════════

pub fn render_connection_manager(app: &App, frame: &mut Frame, area: Rect) {
    let header = Row::new(["Status", "Host", "Version"]).style(Theme::header());
    let rows = app.hosts.iter().map(|h| {
        let (status, style, version) = match app.online.get(&h.id) {
            Some(v) => ("● Online", Theme::online(), v.clone()),
            None => ("○ Offline", Theme::offline(), String::new()),
        };
        let user = if h.username.is_empty() {
            String::new()
        } else {
            format!("{}@", h.username)
        };
        Row::new([
            Cell::from(status).style(style),
            Cell::from(format!("{}{}:{}", user, h.host, h.port)),
            Cell::from(version),
        ])
    });

    let table = Table::new(
        rows,
        [Constraint::Length(10), Constraint::Min(20), Constraint::Length(12)],
    )
    .header(header)
    .block(panel("Connection Manager", app.popup.is_none()))
    .highlight_style(Theme::selected())
    .highlight_symbol("▸ ");

    let mut state = TableState::default().with_selected((!app.hosts.is_empty()).then_some(app.host_selected));
    frame.render_stateful_widget(table, area, &mut state);
}

// ═══════════════════════════════════════════════════════
// Torrent list
// ═══════════════════════════════════════════════════════

pub fn render_torrents(app: &App, frame: &mut Frame, area: Rect) {
    let components = app.components();
    let Some(view) = components.get::<TorrentView>() else {
        return;
    };

    let headers = view.headers();
    let widths: Vec<Constraint> = headers
        .iter()
        .map(|(name, width)| {
            if name == "Name" {
                Constraint::Min(*width)
            } else {
                Constraint::Length(*width)
            }
        })
        .collect();
    let header = Row::new(headers.iter().map(|(name, _)| name.clone())).style(Theme::header());

    let name_col = headers.iter().position(|(name, _)| name == "Name");
    let rows = view.torrents().iter().zip(view.rows()).map(|(t, cells)| {
        let cells = cells.into_iter().enumerate().map(|(i, text)| {
            if Some(i) == name_col {
                let markup = format!("{}{}", state_color(&t.state), text.replace("{!", "{ !"));
                match parse_color_string(&markup) {
                    Ok(line) => Cell::from(line),
                    Err(_) => Cell::from(text),
                }
            } else {
                Cell::from(text)
            }
        });
        Row::new(cells)
    });

    let title = match &app.connected {
        Some((host, port, version)) => format!("Torrents ({}:{} v{})", host, port, version),
        None => "Torrents".to_string(),
    };
    let table = Table::new(rows, widths)
        .header(header)
        .block(panel(&title, app.popup.is_none()))
        .highlight_style(Theme::selected());

    let selected = (!view.torrents().is_empty()).then_some(view.selected());
    let mut state = TableState::default().with_selected(selected);
    frame.render_stateful_widget(table, area, &mut state);
}

// ═══════════════════════════════════════════════════════
// Status and hint bars
// ═══════════════════════════════════════════════════════

pub fn render_status_bar(app: &App, frame: &mut Frame, area: Rect) {
    let markup = {
        let components = app.components();
        components
            .get::<StatusBar>()
            .map(StatusBar::markup)
            .unwrap_or_default()
    };
    let mut line = parse_color_string(&markup).unwrap_or_else(|_| Line::raw(markup.clone()));
    if let Some(status) = &app.status {
        line.spans.push(Span::styled(format!("  {}", status), Theme::dimmed()));
    }
    frame.render_widget(Paragraph::new(line), area);
}

pub fn render_hint_bar(app: &App, frame: &mut Frame, area: Rect) {
    let hints: &[(&str, &str)] = match (&app.popup, app.screen) {
        (Some(Popup::YesNo { .. }), _) => &[("y", "Yes"), ("n/Esc", "No")],
        (Some(Popup::Message { .. }), _) => &[("Enter", "Close")],
        (Some(_), _) => &[("Tab", "Next field"), ("Enter", "OK"), ("Esc", "Cancel")],
        (None, Screen::ConnectionManager) => &[
            ("Enter", "Connect"),
            ("a", "Add host"),
            ("D", "Delete"),
            ("r", "Refresh"),
            ("Q", "Quit"),
        ],
        (None, Screen::Torrents) => &[
            ("↑↓", "Select"),
            ("c", "Connection manager"),
            ("d", "Disconnect"),
            ("q", "Quit"),
        ],
    };
    let mut spans = Vec::new();
    for (key, label) in hints {
        spans.push(Span::styled(format!("[{}]", key), Theme::shortcut()));
        spans.push(Span::styled(format!(" {}  ", label), Theme::dimmed()));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ═══════════════════════════════════════════════════════
// Popups
// ═══════════════════════════════════════════════════════

fn render_popup(popup: &Popup, frame: &mut Frame, area: Rect) {
    match popup {
        Popup::Message { title, text } => {
            let lines = text.lines().count() as u16;
            let rect = centered(area, 70, lines + 6);
            frame.render_widget(Clear, rect);
            let body = vec![
                Line::styled(text.clone(), Theme::error()),
                Line::raw(""),
                Line::from(vec![Span::styled("[Enter]", Theme::shortcut()), Span::raw(" Close")]),
            ];
            frame.render_widget(
                Paragraph::new(body)
                    .wrap(Wrap { trim: false })
                    .block(panel(title, true).border_style(Theme::popup_border())),
                rect,
            );
        }
        Popup::YesNo { title, text, .. } => {
            let lines = text.lines().count() as u16;
            let rect = centered(area, 70, lines + 7);
            frame.render_widget(Clear, rect);
            let mut body: Vec<Line> = text.lines().map(|l| Line::raw(l.to_string())).collect();
            body.push(Line::raw(""));
            body.push(Line::from(vec![
                Span::styled("[y]", Theme::shortcut()),
                Span::raw(" Yes   "),
                Span::styled("[n/Esc]", Theme::shortcut()),
                Span::raw(" No"),
            ]));
            frame.render_widget(
                Paragraph::new(body)
                    .wrap(Wrap { trim: false })
                    .alignment(Alignment::Center)
                    .block(panel(title, true).border_style(Theme::popup_border())),
                rect,
            );
        }
        Popup::Credentials { text, fields, focus, .. } => {
            let rect = centered(area, 60, 8);
            frame.render_widget(Clear, rect);
            let mut body = vec![Line::raw(text.clone()), Line::raw("")];
            body.extend(field_lines(&["Username", "Password"], fields, *focus));
            frame.render_widget(
                Paragraph::new(body).block(panel("Password Required", true).border_style(Theme::popup_border())),
                rect,
            );
        }
        Popup::AddHost { fields, focus, error } => {
            let rect = centered(area, 60, 9);
            frame.render_widget(Clear, rect);
            let mut body = field_lines(&ADD_HOST_LABELS, fields, *focus);
            body.push(Line::raw(""));
            if let Some(err) = error {
                body.push(Line::styled(err.clone(), Theme::error()));
            }
            frame.render_widget(
                Paragraph::new(body).block(panel("Add Host", true).border_style(Theme::popup_border())),
                rect,
            );
        }
    }
}

fn field_lines(labels: &[&str], values: &[String], focus: usize) -> Vec<Line<'static>> {
    labels
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (label, value))| {
            let shown = if *label == "Password" {
                "*".repeat(value.chars().count())
            } else {
                value.clone()
            };
            let style = if i == focus { Theme::field_editing() } else { Theme::field() };
            Line::from(vec![
                Span::styled(format!("{:>10}: ", label), Theme::dimmed()),
                Span::styled(shown, style),
            ])
        })
        .collect()
}
