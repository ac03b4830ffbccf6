//! Version comparison used for daemon/client compatibility checks.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

/// Development marker of a version. Any tag orders after any flag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Dev {
    Flag(bool),
    Tag(String),
}

impl Dev {
    fn is_set(&self) -> bool {
        match self {
            Dev::Flag(b) => *b,
            Dev::Tag(t) => !t.is_empty(),
        }
    }

    fn is_plain_dev(&self) -> bool {
        matches!(self, Dev::Tag(t) if t == "dev")
    }
}

/// A parsed version string that knows how `1.4.0.dev1` relates to `1.4.0`,
/// `1.2.2-rc2` and friends.
#[derive(Debug, Clone)]
pub struct VersionSplit {
    version: Vec<u64>,
    suffix: Option<String>,
    dev: Dev,
}

fn pep386_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<version>\d+\.\d+)(?P<extraversion>(?:\.\d+)*)(?:(?P<prerel>[abc]|rc)(?P<prerelversion>\d+(?:\.\d+)*))?(?:\.post\d+)?(?P<devpart>\.dev\d+)?$",
        )
        .expect("static regex")
    })
}

impl VersionSplit {
    pub fn new(ver: &str) -> Self {
        let parts: Vec<String> = match pep386_re().captures(ver) {
            Some(caps) => {
                let get = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or("");
                vec![
                    format!("{}{}", get("version"), get("extraversion")),
                    format!("{}{}", get("prerel"), get("prerelversion")),
                    get("devpart").trim_start_matches('.').to_string(),
                ]
            }
            None => ver
                .to_lowercase()
                .replace('_', "-")
                .split('-')
                .map(str::to_string)
                .collect(),
        };

        let version = parts[0]
            .split('.')
            .filter(|x| !x.is_empty() && x.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|x| x.parse().ok())
            .collect();

        let mut suffix = None;
        let mut dev = Dev::Flag(false);
        if parts.len() > 1 {
            let second = &parts[1];
            if ["rc", "a", "b", "c"].iter().any(|p| second.starts_with(p)) {
                suffix = Some(second.clone());
            }
            if let Some(last) = parts.last() {
                if last.starts_with("dev") {
                    dev = Dev::Tag(last.clone());
                }
            }
        }

        Self { version, suffix, dev }
    }

    /// Comparable views of both versions.
    ///
    /// When exactly one side is a development build its marker is inverted
    /// (unless it is the bare `dev` tag) so `.devN` builds sort before the
    /// release they lead up to.
    fn comparable<'a>(&'a self, other: &'a Self) -> ((&'a [u64], &'a str, Dev), (&'a [u64], &'a str, Dev)) {
        let mut a = self.dev.clone();
        let mut b = other.dev.clone();
        if a.is_set() != b.is_set() {
            if !a.is_plain_dev() {
                a = Dev::Flag(!a.is_set());
            }
            if !b.is_plain_dev() {
                b = Dev::Flag(!b.is_set());
            }
        }
        (
            (self.version.as_slice(), self.suffix.as_deref().unwrap_or("z"), a),
            (other.version.as_slice(), other.suffix.as_deref().unwrap_or("z"), b),
        )
    }
}

impl PartialEq for VersionSplit {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = self.comparable(other);
        a == b
    }
}

impl PartialOrd for VersionSplit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let (a, b) = self.comparable(other);
        Some(a.cmp(&b))
    }
}

impl std::str::FromStr for VersionSplit {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> VersionSplit {
        VersionSplit::new(s)
    }

    #[test]
    fn test_version_split_release_ordering() {
        assert!(v("1.2.2") == v("1.2.2"));
        assert!(v("1.2.1") < v("1.2.2"));
        assert!(v("1.1.9") < v("1.2.2"));
        assert!(v("1.2.2") > v("1.2.1"));
        assert!(v("0.14.9") == v("0.14.9"));
        assert!(v("0.14.9") > v("0.14.5"));
        assert!(v("0.14.10") >= v("0.14.9"));
    }

    #[test]
    fn test_version_split_prerelease() {
        assert!(v("1.2.2") > v("1.2.2-rc2"));
        assert!(v("1.2.2-rc3") > v("1.2.2-rc2"));
        assert!(v("1.2.2-dev") < v("1.3.0-rc2"));
        assert!(v("1.4.0a1") < v("1.4.0"));
    }

    #[test]
    fn test_version_split_dev_builds() {
        assert!(v("1.2.2") < v("1.2.2-dev"));
        assert!(v("1.2.2-rc2-dev") > v("1.2.2-rc2"));
        assert!(v("1.4.0") > v("1.3.900.dev123"));
        assert!(v("1.3.2rc2.dev1") < v("1.3.2-rc2"));
        assert!(v("1.3.900.dev888") > v("1.3.900.dev123"));
        assert!(v("1.4.0") > v("1.4.0.dev123"));
        assert!(v("1.4.0.dev1") < v("1.4.0"));
    }

    #[test]
    fn test_version_split_from_str() {
        let parsed: VersionSplit = "2.0.3".parse().unwrap();
        assert!(parsed > v("1.3.15"));
    }
}
