//! URL and magnet-link helpers.

use data_encoding::BASE32;
use serde::{Deserialize, Serialize};

const MAGNET_SCHEME: &str = "magnet:?";
const XT_PARAM: &str = "xt=urn:btih:";
const DN_PARAM: &str = "dn=";

/// What can be learned about a torrent from its magnet link alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetInfo {
    pub name: String,
    pub info_hash: String,
    /// Magnet links carry no file list.
    pub files_tree: String,
}

/// True for `http`, `https`, `ftp` and `udp` URLs.
pub fn is_url(url: &str) -> bool {
    match url.split_once("://") {
        Some((scheme, _)) => matches!(scheme, "http" | "https" | "ftp" | "udp"),
        None => false,
    }
}

/// A 40 character alphanumeric string.
pub fn is_infohash(infohash: &str) -> bool {
    infohash.chars().count() == 40 && infohash.chars().all(char::is_alphanumeric)
}

pub fn is_magnet(uri: &str) -> bool {
    uri.starts_with(MAGNET_SCHEME) && uri.contains(XT_PARAM)
}

/// Extract the info-hash and display name of a magnet link.
///
/// Base32 hashes are converted to lowercase hex. A hash of any other shape
/// ends parsing. The name falls back to the info-hash.
pub fn get_magnet_info(uri: &str) -> Option<MagnetInfo> {
    let params = uri.strip_prefix(MAGNET_SCHEME)?;

    let mut name = None;
    let mut info_hash = None;
    for param in params.split('&') {
        if let Some(xt_hash) = param.strip_prefix(XT_PARAM) {
            if xt_hash.len() == 32 {
                match BASE32.decode(xt_hash.to_uppercase().as_bytes()) {
                    Ok(raw) => info_hash = Some(hex::encode(raw)),
                    Err(e) => {
                        tracing::debug!("Invalid base32 magnet hash: {}, {}", xt_hash, e);
                        break;
                    }
                }
            } else if is_infohash(xt_hash) {
                info_hash = Some(xt_hash.to_lowercase());
            } else {
                break;
            }
        } else if let Some(dn) = param.strip_prefix(DN_PARAM) {
            name = url::form_urlencoded::parse(format!("dn={}", dn).as_bytes())
                .next()
                .map(|(_, v)| v.into_owned());
        }
    }

    let info_hash = info_hash?;
    let name = match name {
        Some(n) if !n.is_empty() => n,
        _ => info_hash.clone(),
    };
    Some(MagnetInfo {
        name,
        info_hash,
        files_tree: String::new(),
    })
}

/// Build a magnet URI from a hex info-hash, with optional name and trackers.
pub fn create_magnet_uri(
    infohash: &str,
    name: Option<&str>,
    trackers: &[String],
) -> Result<String, hex::FromHexError> {
    let raw = hex::decode(infohash)?;
    let mut uri = format!("{}{}{}", MAGNET_SCHEME, XT_PARAM, BASE32.encode(&raw));
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        uri.push_str("&dn=");
        uri.push_str(name);
    }
    for tracker in trackers {
        uri.push_str("&tr=");
        uri.push_str(tracker);
    }
    Ok(uri)
}
