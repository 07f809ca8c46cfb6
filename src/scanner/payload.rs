//! Payload Classification
//!
//! Decides what a decoded string is: a URL, a Wi-Fi join record or plain text.

use log::debug;
use serde::{Deserialize, Serialize};

use super::wifi::{parse_wifi_message, WifiInfo};

/// What a decoded payload turned out to be
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScanResult {
    #[default]
    None,
    Url {
        scheme: String,
        /// `[user[:password]@]host[:port]`
        netloc: String,
        /// The payload as decoded
        full: String,
    },
    Wifi(WifiInfo),
    Text {
        raw: String,
    },
}

impl ScanResult {
    pub fn is_none(&self) -> bool {
        matches!(self, ScanResult::None)
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Split `scheme://netloc/path` per generic URI syntax. The netloc is the
/// authority exactly as written, so nothing is normalized away. Strings
/// without a `//` authority (bare paths, `mailto:`, `http:host`) are not
/// URLs here.
fn split_url(payload: &str) -> Option<(String, String)> {
    let (scheme, rest) = payload.trim().split_once(':')?;
    if !is_scheme(scheme) {
        return None;
    }

    let authority = rest.strip_prefix("//")?;
    let end = authority.find(['/', '?', '#']).unwrap_or(authority.len());
    let netloc = &authority[..end];
    if netloc.is_empty() || netloc.contains('[') != netloc.contains(']') {
        return None;
    }

    Some((scheme.to_ascii_lowercase(), netloc.to_string()))
}

/// Classify a decoded payload. Order: URL, Wi-Fi, then text.
pub fn classify(payload: &str) -> ScanResult {
    if let Some((scheme, netloc)) = split_url(payload) {
        return ScanResult::Url {
            scheme,
            netloc,
            full: payload.to_string(),
        };
    }

    match parse_wifi_message(payload) {
        Ok(Some(info)) => return ScanResult::Wifi(info),
        Ok(None) => {}
        Err(e) => debug!("Not a usable Wi-Fi record: {}", e),
    }

    ScanResult::Text {
        raw: payload.to_string(),
    }
}
