//! `{!fg,bg,attr!}` colour markup used by status lines and help text.
//!
//! A tag is either a scheme name (`{!error!}`), an explicit colour pair with
//! optional attributes (`{!green,black,bold!}`), or attribute changes applied
//! to the previous colour (`{!+underline,-bold!}`).

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BadColorString(pub String);

/// `(fg, bg, attributes)` for each named scheme.
pub const SCHEMES: &[(&str, (&str, &str, &[&str]))] = &[
    ("input", ("white", "black", &[])),
    ("normal", ("white", "black", &[])),
    ("status", ("yellow", "blue", &["bold"])),
    ("info", ("white", "black", &["bold"])),
    ("error", ("red", "black", &["bold"])),
    ("success", ("green", "black", &["bold"])),
    ("event", ("magenta", "black", &["bold"])),
    ("selected", ("black", "white", &["bold"])),
    ("marked", ("white", "blue", &["bold"])),
    ("selectedmarked", ("blue", "white", &["bold"])),
    ("header", ("green", "black", &["bold"])),
    ("filterstatus", ("green", "blue", &["bold"])),
];

const ATTRIBUTES: &[&str] = &["blink", "bold", "dim", "reverse", "standout", "underline"];

/// Markup prefix for a torrent state.
pub fn state_color(state: &str) -> &'static str {
    match state {
        "Seeding" => "{!blue,black,bold!}",
        "Downloading" | "Moving" => "{!green,black,bold!}",
        "Paused" => "{!white,black!}",
        "Checking" => "{!green,black!}",
        "Queued" => "{!yellow,black!}",
        "Error" => "{!red,black,bold!}",
        _ => "{!input!}",
    }
}

fn color(name: &str) -> Option<Color> {
    Some(match name {
        "black" => Color::Black,
        "blue" => Color::Blue,
        "cyan" => Color::Cyan,
        "green" => Color::Green,
        "magenta" => Color::Magenta,
        "red" => Color::Red,
        "white" => Color::White,
        "yellow" => Color::Yellow,
        "grey" => Color::Indexed(241),
        "whitegrey" => Color::Indexed(249),
        "magentadark" => Color::Indexed(99),
        _ => return None,
    })
}

fn modifier(name: &str) -> Option<Modifier> {
    Some(match name {
        "blink" => Modifier::SLOW_BLINK,
        "bold" => Modifier::BOLD,
        "dim" => Modifier::DIM,
        "reverse" | "standout" => Modifier::REVERSED,
        "underline" => Modifier::UNDERLINED,
        _ => return None,
    })
}

fn scheme(name: &str) -> Option<(&'static str, &'static str, &'static [&'static str])> {
    SCHEMES.iter().find(|(n, _)| *n == name).map(|(_, s)| *s)
}

fn input_style() -> Style {
    Style::default().fg(Color::White).bg(Color::Black)
}

fn apply_attrs<'a>(mut style: Style, attrs: impl IntoIterator<Item = &'a str>) -> Result<Style, BadColorString> {
    for attr in attrs {
        let attr = attr.trim();
        if attr.is_empty() || attr == "ignore" {
            continue;
        }
        let (add, name) = match attr.strip_prefix('-') {
            Some(rest) => (false, rest),
            None => (true, attr.strip_prefix('+').unwrap_or(attr)),
        };
        let m = modifier(name).ok_or_else(|| BadColorString(format!("Bad attribute value!: {}", attr)))?;
        style = if add { style.add_modifier(m) } else { style.remove_modifier(m) };
    }
    Ok(style)
}

fn check_balanced(s: &str) -> Result<(), BadColorString> {
    if s.matches("{!").count() != s.matches("!}").count() {
        return Err(BadColorString("Number of {! is not equal to number of !}".into()));
    }
    Ok(())
}

/// Expand tabs to the next multiple of eight columns.
pub fn replace_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0usize;
    for c in line.chars() {
        if c == '\t' {
            let n = 8 - col % 8;
            out.extend(std::iter::repeat(' ').take(n));
            col += n;
        } else {
            out.push(c);
            col += 1;
        }
    }
    out
}

/// Remove every `{!...!}` tag.
pub fn strip_colors(line: &str) -> String {
    let mut rest = line;
    let mut out = String::with_capacity(line.len());
    while let Some(begin) = rest.find("{!") {
        let Some(end) = rest[begin..].find("!}") else {
            break;
        };
        out.push_str(&rest[..begin]);
        rest = &rest[begin + end + 2..];
    }
    out.push_str(rest);
    out
}

/// Visible character count once tags are stripped and tabs expanded.
pub fn get_line_length(line: &str) -> Result<usize, BadColorString> {
    check_balanced(line)?;
    Ok(replace_tabs(&strip_colors(line)).chars().count())
}

/// Terminal cell width, counting double-width characters as two.
pub fn get_line_width(line: &str) -> Result<usize, BadColorString> {
    check_balanced(line)?;
    Ok(Line::raw(replace_tabs(&strip_colors(line))).width())
}

/// Turn markup into a styled line.
pub fn parse_color_string(s: &str) -> Result<Line<'static>, BadColorString> {
    check_balanced(s)?;

    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut last: Option<Style> = None;
    let mut rest = s;

    while let Some(begin) = rest.find("{!") {
        if begin > 0 {
            spans.push(Span::styled(rest[..begin].to_string(), input_style()));
        }
        let end = rest[begin..]
            .find("!}")
            .map(|e| begin + e)
            .ok_or_else(|| BadColorString("Missing closing '!}'".into()))?;

        let attrs: Vec<&str> = rest[begin + 2..end].split(',').collect();
        if attrs.len() == 1 && attrs[0].trim().is_empty() {
            return Err(BadColorString("No description in {! !}".into()));
        }
        let head = attrs[0].trim();

        let style = if let Some((fg, bg, scheme_attrs)) = scheme(head) {
            let base = Style::default()
                .fg(color(fg).unwrap_or(Color::White))
                .bg(color(bg).unwrap_or(Color::Black));
            let style = apply_attrs(base, scheme_attrs.iter().copied())?;
            apply_attrs(style, attrs[1..].iter().copied())?
        } else if head.starts_with('+') || head.starts_with('-') {
            let prev = last.ok_or_else(|| {
                BadColorString(format!(
                    "No color value given when no previous color was used!: {}",
                    head
                ))
            })?;
            for attr in &attrs {
                let name = attr.trim().get(1..).unwrap_or_default();
                if !ATTRIBUTES.contains(&name) {
                    return Err(BadColorString(format!("Bad attribute value!: {}", attr)));
                }
            }
            apply_attrs(prev, attrs.iter().copied())?
        } else {
            let bg = attrs.get(1).map(|b| b.trim()).unwrap_or("black");
            let (Some(fg_color), Some(bg_color)) = (color(head), color(bg)) else {
                return Err(BadColorString(format!("Bad color value in tag: {},{}", head, bg)));
            };
            let base = Style::default().fg(fg_color).bg(bg_color);
            apply_attrs(base, attrs.iter().skip(2).copied())?
        };
        last = Some(style);

        let text_start = end + 2;
        match rest[text_start..].find("{!") {
            Some(next) => {
                let next = text_start + next;
                spans.push(Span::styled(replace_tabs(&rest[text_start..next]), style));
                rest = &rest[next..];
            }
            None => {
                spans.push(Span::styled(replace_tabs(&rest[text_start..]), style));
                rest = "";
                break;
            }
        }
    }

    if spans.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }
    Ok(Line::from(spans))
}

// ── Help text highlighting ──────────────────────────────

fn help_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"<torrent-id>|<torrent>|<command>|<torrent-file>", "{!green!}$0{!input!}"),
            (r"<state>|<download-folder>|\.\.\.", "{!yellow!}$0{!input!}"),
            (r"\s\*\s", "{!blue!}$0{!input!}"),
            (r"(^|[^\-a-z])(-[a-zA-Z0-9])", "${1}{!red!}${2}{!input!}"),
            (r"--[_\-a-zA-Z0-9]+", "{!green!}$0{!input!}"),
            (r"\[|\]", "{!info!}$0{!input!}"),
            (r"<tab>", "{!white!}$0{!input!}"),
            (r"[_A-Z]{3,}", "{!cyan!}$0{!input!}"),
            (r"<key>|<value>", "{!cyan!}$0{!input!}"),
            (r"usage:", "{!info!}$0{!input!}"),
        ]
        .into_iter()
        .map(|(pattern, replacement)| (Regex::new(pattern).expect("static regex"), replacement))
        .collect()
    })
}

/// Adds colour markup to command help: options, placeholders, keywords.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColorFormatter;

impl ColorFormatter {
    pub fn format_colors(&self, text: &str) -> String {
        help_rules().iter().fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &Line<'_>) -> Vec<String> {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_parse_scheme_and_custom_colors() {
        let line = parse_color_string("pre {!error!}oops{!green,blue,underline!} ok").unwrap();
        assert_eq!(texts(&line), vec!["pre ", "oops", " ok"]);
        assert_eq!(line.spans[1].style.fg, Some(Color::Red));
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(line.spans[2].style.fg, Some(Color::Green));
        assert_eq!(line.spans[2].style.bg, Some(Color::Blue));
        assert!(line.spans[2].style.add_modifier.contains(Modifier::UNDERLINED));
    }

    #[test]
    fn test_bg_defaults_to_black_and_plain_text_passes_through() {
        let line = parse_color_string("{!cyan!}x").unwrap();
        assert_eq!(line.spans[0].style.bg, Some(Color::Black));

        let plain = parse_color_string("no tags\there").unwrap();
        assert_eq!(texts(&plain), vec!["no tags\there"]);
    }

    #[test]
    fn test_attribute_changes_reuse_last_color() {
        let line = parse_color_string("{!info!}a{!-bold,+underline!}b").unwrap();
        let b = line.spans[1].style;
        assert_eq!(b.fg, Some(Color::White));
        assert!(b.sub_modifier.contains(Modifier::BOLD));
        assert!(b.add_modifier.contains(Modifier::UNDERLINED));
    }

    #[test]
    fn test_bad_color_strings() {
        let cases = [
            ("{!red!}x!}", "Number of {! is not equal to number of !}"),
            ("{!!}x", "No description in {! !}"),
            ("{!+bold!}x", "No color value given when no previous color was used!: +bold"),
            ("{!red!}x{!+sparkly!}", "Bad attribute value!: +sparkly"),
            ("{!pink,black!}x", "Bad color value in tag: pink,black"),
            ("{!red,black,wobble!}x", "Bad attribute value!: wobble"),
        ];
        for (input, message) in cases {
            let err = parse_color_string(input).unwrap_err();
            assert_eq!(err.0, message, "input {:?}", input);
        }
        assert!(get_line_length("{!red!").is_err());
    }

    #[test]
    fn test_tabs_and_lengths() {
        assert_eq!(replace_tabs("a\tb"), format!("a{}b", " ".repeat(7)));
        assert_eq!(replace_tabs("12345678\tx"), format!("12345678{}x", " ".repeat(8)));
        assert_eq!(strip_colors("{!info!}Seeds:{!input!} 3"), "Seeds: 3");
        assert_eq!(get_line_length("{!info!}ab\tc").unwrap(), 9);
        assert_eq!(get_line_width("{!info!}日本").unwrap(), 4);
        assert_eq!(get_line_length("{!info!}日本").unwrap(), 2);
    }

    #[test]
    fn test_format_colors() {
        let out = ColorFormatter.format_colors("usage: add [-p <download-folder>] --move");
        assert!(out.starts_with("{!info!}usage:{!input!}"));
        assert!(out.contains("{!red!}-p{!input!}"));
        assert!(out.contains("{!yellow!}<download-folder>{!input!}"));
        assert!(out.contains("{!green!}--move{!input!}"));
        assert!(out.contains("{!info!}[{!input!}"));
        assert!(parse_color_string(&out).is_ok());
    }

    #[test]
    fn test_state_color_parses() {
        for state in ["Seeding", "Downloading", "Paused", "Checking", "Queued", "Error", "Moving", "Unknown"] {
            assert!(parse_color_string(&format!("{}{}", state_color(state), state)).is_ok());
        }
    }
}
