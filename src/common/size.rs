//! Parsing of human written data sizes such as `1 GiB` or `10 bytes`.

use std::sync::OnceLock;

use regex::Regex;

/// A piece of tokenized user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Token {
    fn as_number(&self) -> Option<f64> {
        match self {
            Token::Int(n) => Some(*n as f64),
            Token::Float(f) => Some(*f),
            Token::Text(_) => None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Failed to parse size! (input {input:?} was tokenized as {tokens:?})")]
pub struct InvalidSize {
    pub input: String,
    pub tokens: Vec<Token>,
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("static regex"))
}

/// Split text into numbers and words, ignoring whitespace.
///
/// Numbers are recognised even when glued to a word: `1MiB` → `[1, "MiB"]`.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;

    let mut push_text = |tokens: &mut Vec<Token>, s: &str| {
        let s = s.trim();
        if !s.is_empty() {
            tokens.push(Token::Text(s.to_string()));
        }
    };

    for m in number_re().find_iter(text) {
        push_text(&mut tokens, &text[last..m.start()]);
        let raw = m.as_str();
        if raw.contains('.') {
            if let Ok(f) = raw.parse() {
                tokens.push(Token::Float(f));
            }
        } else if let Ok(n) = raw.parse() {
            tokens.push(Token::Int(n));
        } else {
            push_text(&mut tokens, raw);
        }
        last = m.end();
    }
    push_text(&mut tokens, &text[last..]);
    tokens
}

struct SizeUnit {
    prefix: &'static str,
    divider: u64,
}

// Order matters: the first prefix matching the unit wins.
const SIZE_UNITS: &[SizeUnit] = &[
    SizeUnit { prefix: "b", divider: 1 },
    SizeUnit { prefix: "KiB", divider: 1 << 10 },
    SizeUnit { prefix: "MiB", divider: 1 << 20 },
    SizeUnit { prefix: "GiB", divider: 1 << 30 },
    SizeUnit { prefix: "TiB", divider: 1 << 40 },
    SizeUnit { prefix: "PiB", divider: 1 << 50 },
    SizeUnit { prefix: "KB", divider: 1_000 },
    SizeUnit { prefix: "MB", divider: 1_000_000 },
    SizeUnit { prefix: "GB", divider: 1_000_000_000 },
    SizeUnit { prefix: "TB", divider: 1_000_000_000_000 },
    SizeUnit { prefix: "PB", divider: 1_000_000_000_000_000 },
    SizeUnit { prefix: "m", divider: 1_000_000 },
];

/// Parse a human readable size into a number of bytes.
///
/// A bare number is taken as bytes. Otherwise a number followed by a unit is
/// expected; the unit is matched case-insensitively by prefix.
pub fn parse_human_size(size: &str) -> Result<u64, InvalidSize> {
    let tokens = tokenize(size);
    if let Some(value) = tokens.first().and_then(Token::as_number) {
        if tokens.len() == 1 {
            return Ok(value as u64);
        }
        if let [_, Token::Text(unit)] = tokens.as_slice() {
            let normalized = unit.to_lowercase();
            if let Some(u) = SIZE_UNITS
                .iter()
                .find(|u| normalized.starts_with(&u.prefix.to_lowercase()))
            {
                return Ok((value * u.divider as f64) as u64);
            }
        }
    }
    Err(InvalidSize {
        input: size.to_string(),
        tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("1MiB"),
            vec![Token::Int(1), Token::Text("MiB".into())]
        );
        assert_eq!(
            tokenize(" 2.5 GB "),
            vec![Token::Float(2.5), Token::Text("GB".into())]
        );
        assert_eq!(tokenize("abc"), vec![Token::Text("abc".into())]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_parse_human_size() {
        let sizes = [
            ("1", 1),
            ("10 bytes", 10),
            ("2048 bytes", 2048),
            ("1MiB", 1 << 20),
            ("1 MiB", 1 << 20),
            ("1 GiB", 1 << 30),
            ("1M", 1_000_000),
            ("1MB", 1_000_000),
            ("1 GB", 1_000_000_000),
            ("1 TB", 1_000_000_000_000),
        ];
        for (human, bytes) in sizes {
            assert_eq!(
                parse_human_size(human).unwrap(),
                bytes,
                "Mismatch when converting '{}'",
                human
            );
        }
    }

    #[test]
    fn test_parse_human_size_invalid() {
        assert!(parse_human_size("").is_err());
        assert!(parse_human_size("MiB").is_err());
        assert!(parse_human_size("1 zorks").is_err());
        let err = parse_human_size("1 2 3").unwrap_err();
        assert_eq!(err.tokens.len(), 3);
        assert!(err.to_string().starts_with("Failed to parse size!"));
    }
}
