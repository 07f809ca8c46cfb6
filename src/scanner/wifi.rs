//! Wi-Fi Join Records
//!
//! Parser and serializer for the MeCard-like `WIFI:S:...;T:...;P:...;;`
//! text found in Wi-Fi sharing QR codes.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Prefix every Wi-Fi record starts with
pub const WIFI_PREFIX: &str = "WIFI:";

/// Wire form of an open network
pub const NOPASS: &str = "nopass";

/// Characters that must be backslash-escaped inside a field value
const SPECIAL_CHARS: [char; 4] = ['\\', ';', ',', '"'];

/// Wi-Fi security type. An open network has no `AuthType` at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthType {
    #[serde(rename = "WEP")]
    Wep,
    #[serde(rename = "WPA")]
    Wpa,
    #[serde(rename = "WPA2")]
    Wpa2,
    #[serde(rename = "WPA2-EAP")]
    Wpa2Eap,
}

impl AuthType {
    pub const ALL: [AuthType; 4] = [AuthType::Wep, AuthType::Wpa, AuthType::Wpa2, AuthType::Wpa2Eap];

    /// Value used in the `T:` field
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Wep => "WEP",
            AuthType::Wpa => "WPA",
            AuthType::Wpa2 => "WPA2",
            AuthType::Wpa2Eap => "WPA2-EAP",
        }
    }

    /// Parse a `T:` value. `nopass` gives `Ok(None)`.
    pub fn parse(value: &str) -> Result<Option<Self>, ParseError> {
        if value.eq_ignore_ascii_case(NOPASS) {
            return Ok(None);
        }
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
            .map(Some)
            .ok_or_else(|| ParseError::UnknownAuthType(value.to_string()))
    }

    /// NetworkManager `802-11-wireless-security.key-mgmt` for a new connection
    pub fn nm_key_mgmt(&self) -> &'static str {
        match self {
            AuthType::Wep => "none",
            AuthType::Wpa | AuthType::Wpa2 => "wpa-psk",
            AuthType::Wpa2Eap => "wpa-eap",
        }
    }

    /// Map the key management of a saved NetworkManager profile.
    /// Returns None for open networks.
    pub fn from_nm_key_mgmt(key_mgmt: &str) -> Option<Self> {
        match key_mgmt {
            "" | "none" => None,
            "wpa-psk" | "sae" => Some(AuthType::Wpa),
            "wpa-eap" => Some(AuthType::Wpa2Eap),
            _ => Some(AuthType::Wpa),
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials for joining a Wi-Fi network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiInfo {
    pub ssid: String,
    pub password: Option<String>,
    /// None means open network
    pub auth_type: Option<AuthType>,
    pub hidden: bool,
    /// Whether the machine is currently on this network
    #[serde(default)]
    pub connected: bool,
}

impl WifiInfo {
    pub fn new(ssid: impl Into<String>, auth_type: Option<AuthType>, password: Option<String>) -> Self {
        let mut info = Self {
            ssid: ssid.into(),
            password,
            auth_type,
            hidden: false,
            connected: false,
        };
        info.normalize();
        info
    }

    /// Open networks carry no password
    pub fn normalize(&mut self) {
        if self.auth_type.is_none() {
            self.password = None;
        }
    }

    pub fn is_open(&self) -> bool {
        self.auth_type.is_none()
    }

    /// Wire form of the auth type
    pub fn auth_str(&self) -> &'static str {
        self.auth_type.map(|t| t.as_str()).unwrap_or(NOPASS)
    }
}

/// Escape the four special characters with a backslash
pub fn mecard_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Reverse `mecard_escape`. A backslash before any other character, or a
/// trailing one, is kept literally.
pub fn mecard_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next) if SPECIAL_CHARS.contains(&next) => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split on `;` that are not escaped
fn split_fields(body: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ';' => {
                fields.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&body[start..]);
    fields
}

/// Truthiness used by the `H:` field
pub fn parse_to_boolean(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "t" | "y"
    )
}

/// Parse a Wi-Fi record.
///
/// Returns `Ok(None)` when the text is not a Wi-Fi record at all (no `WIFI:`
/// prefix) and `Err` when it is one with an unknown auth type. A missing `T`
/// field means WPA.
pub fn parse_wifi_message(text: &str) -> Result<Option<WifiInfo>, ParseError> {
    let text = text.trim();
    let Some(body) = text.strip_prefix(WIFI_PREFIX) else {
        return Ok(None);
    };

    let mut ssid = String::new();
    let mut password = None;
    let mut auth = None;
    let mut hidden = false;

    for field in split_fields(body) {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        match key {
            "S" => ssid = mecard_unescape(value),
            "P" => password = Some(mecard_unescape(value)),
            "T" => auth = Some(mecard_unescape(value)),
            "H" => hidden = parse_to_boolean(value),
            _ => {}
        }
    }

    let auth_type = match auth {
        Some(value) => AuthType::parse(&value)?,
        None => Some(AuthType::Wpa),
    };

    let mut info = WifiInfo {
        ssid,
        password,
        auth_type,
        hidden,
        connected: false,
    };
    info.normalize();
    Ok(Some(info))
}

/// Serialize to the record form read by phone cameras
pub fn serialize_wifi_message(info: &WifiInfo) -> String {
    let mut out = format!(
        "{}S:{};T:{};",
        WIFI_PREFIX,
        mecard_escape(&info.ssid),
        info.auth_str()
    );
    if let (Some(_), Some(password)) = (info.auth_type, &info.password) {
        out.push_str(&format!("P:{};", mecard_escape(password)));
    }
    if info.hidden {
        out.push_str("H:true;");
    }
    out.push(';');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wpa(ssid: &str, password: &str) -> WifiInfo {
        WifiInfo::new(ssid, Some(AuthType::Wpa), Some(password.to_string()))
    }

    #[test]
    fn test_parse_wikipedia_example() {
        let info = parse_wifi_message("WIFI:S:Wikipedia;T:WPA;P:Password1!;;")
            .unwrap()
            .unwrap();
        assert_eq!(info, wpa("Wikipedia", "Password1!"));
        assert!(!info.hidden);
    }

    #[test]
    fn test_parse_wpa2() {
        let info = parse_wifi_message("WIFI:S:my-network;T:WPA2;P:my-password;;")
            .unwrap()
            .unwrap();
        assert_eq!(info.ssid, "my-network");
        assert_eq!(info.auth_type, Some(AuthType::Wpa2));
        assert_eq!(info.password.as_deref(), Some("my-password"));
    }

    #[test]
    fn test_parse_field_order_and_spaces() {
        let info = parse_wifi_message("WIFI:T:WPA;P:thithammuaxuan;S:Thi Tham Mua Xuan;")
            .unwrap()
            .unwrap();
        assert_eq!(info, wpa("Thi Tham Mua Xuan", "thithammuaxuan"));
    }

    #[test]
    fn test_not_a_wifi_record() {
        assert_eq!(parse_wifi_message("https://example.com").unwrap(), None);
        assert_eq!(parse_wifi_message("wifi:S:lower;;").unwrap(), None);
        assert_eq!(parse_wifi_message("").unwrap(), None);
    }

    #[test]
    fn test_unknown_auth_type() {
        assert_eq!(
            parse_wifi_message("WIFI:S:x;T:WPA4;P:y;;"),
            Err(ParseError::UnknownAuthType("WPA4".to_string()))
        );
    }

    #[test]
    fn test_missing_auth_defaults_to_wpa() {
        let info = parse_wifi_message("WIFI:S:home;P:secret;;").unwrap().unwrap();
        assert_eq!(info.auth_type, Some(AuthType::Wpa));
    }

    #[test]
    fn test_nopass_clears_password() {
        let info = parse_wifi_message("WIFI:S:cafe;T:nopass;P:ignored;;")
            .unwrap()
            .unwrap();
        assert_eq!(info.auth_type, None);
        assert_eq!(info.password, None);

        let mut open = WifiInfo::new("cafe", None, Some("ignored".to_string()));
        assert_eq!(open.password, None);
        open.password = Some("sneaked in".to_string());
        assert_eq!(serialize_wifi_message(&open), "WIFI:S:cafe;T:nopass;;");
        let reparsed = parse_wifi_message(&serialize_wifi_message(&open)).unwrap().unwrap();
        assert_eq!(reparsed.password, None);
    }

    #[test]
    fn test_hidden_flag() {
        for value in ["true", "TRUE", "yes", "t", "Y"] {
            let text = format!("WIFI:S:x;T:WEP;P:k;H:{};;", value);
            assert!(parse_wifi_message(&text).unwrap().unwrap().hidden, "{}", value);
        }
        let info = parse_wifi_message("WIFI:S:x;T:WEP;P:k;H:false;;").unwrap().unwrap();
        assert!(!info.hidden);
        assert!(!parse_to_boolean("1"));
    }

    #[test]
    fn test_escaped_separators_in_values() {
        let info = parse_wifi_message(r#"WIFI:S:a\;b\,c;T:WPA;P:p\"q\\r;;"#)
            .unwrap()
            .unwrap();
        assert_eq!(info.ssid, "a;b,c");
        assert_eq!(info.password.as_deref(), Some(r#"p"q\r"#));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(mecard_unescape(r#"\"foo\;bar\\baz\""#), r#""foo;bar\baz""#);
        assert_eq!(mecard_unescape(r"keep\n"), r"keep\n");
        assert_eq!(mecard_unescape("end\\"), "end\\");
    }

    #[test]
    fn test_escape_round_trip() {
        for s in ["", "plain", r"\;", r#"a\b;c,d"e"#, r"\\\;;;", "😻;😻", r"\x"] {
            assert_eq!(mecard_unescape(&mecard_escape(s)), s);
        }
    }

    #[test]
    fn test_serialize_unicode_passthrough() {
        assert_eq!(
            serialize_wifi_message(&wpa("😻😻😻😻", "password")),
            "WIFI:S:😻😻😻😻;T:WPA;P:password;;"
        );
    }

    #[test]
    fn test_serialize_hidden() {
        let mut info = WifiInfo::new("lab", Some(AuthType::Wpa2Eap), Some("x".to_string()));
        info.hidden = true;
        assert_eq!(serialize_wifi_message(&info), "WIFI:S:lab;T:WPA2-EAP;P:x;H:true;;");
    }

    #[test]
    fn test_round_trip() {
        let mut hidden = WifiInfo::new("tricky;name,\"q\"", Some(AuthType::Wep), Some(r"pa\ss".to_string()));
        hidden.hidden = true;
        let cases = [
            wpa("Wikipedia", "Password1!"),
            WifiInfo::new("no-password", Some(AuthType::Wpa2), None),
            hidden,
        ];
        for info in cases {
            let parsed = parse_wifi_message(&serialize_wifi_message(&info)).unwrap().unwrap();
            assert_eq!(parsed, info);
        }
    }

    #[test]
    fn test_network_manager_mapping() {
        assert_eq!(AuthType::Wep.nm_key_mgmt(), "none");
        assert_eq!(AuthType::Wpa2.nm_key_mgmt(), "wpa-psk");
        assert_eq!(AuthType::Wpa2Eap.nm_key_mgmt(), "wpa-eap");

        assert_eq!(AuthType::from_nm_key_mgmt(""), None);
        assert_eq!(AuthType::from_nm_key_mgmt("none"), None);
        assert_eq!(AuthType::from_nm_key_mgmt("sae"), Some(AuthType::Wpa));
        assert_eq!(AuthType::from_nm_key_mgmt("wpa-eap"), Some(AuthType::Wpa2Eap));
        assert_eq!(AuthType::from_nm_key_mgmt("owe"), Some(AuthType::Wpa));
    }
}
