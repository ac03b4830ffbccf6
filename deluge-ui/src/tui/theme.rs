//! Styles shared by every screen.

use ratatui::style::{Color, Modifier, Style};

pub struct Theme;

impl Theme {
    // ─── Host state ───
    pub fn online()  -> Style { Style::default().fg(Color::Green).add_modifier(Modifier::BOLD) }
    pub fn offline() -> Style { Style::default().fg(Color::DarkGray) }
    pub fn error()   -> Style { Style::default().fg(Color::Red) }

    // ─── Borders ───
    pub fn border()        -> Style { Style::default().fg(Color::DarkGray) }
    pub fn border_active() -> Style { Style::default().fg(Color::Cyan) }

    // ─── Titles and lists ───
    pub fn title()    -> Style { Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD) }
    pub fn header()   -> Style { Style::default().fg(Color::Green).add_modifier(Modifier::BOLD) }
    pub fn selected() -> Style { Style::default().bg(Color::DarkGray).fg(Color::White).add_modifier(Modifier::BOLD) }
    pub fn shortcut() -> Style { Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD) }
    pub fn dimmed()   -> Style { Style::default().fg(Color::DarkGray) }

    // ─── Popups ───
    pub fn field()         -> Style { Style::default().fg(Color::White) }
    pub fn field_editing() -> Style { Style::default().fg(Color::Yellow).add_modifier(Modifier::UNDERLINED) }
    pub fn popup_border()  -> Style { Style::default().fg(Color::Yellow) }
}
