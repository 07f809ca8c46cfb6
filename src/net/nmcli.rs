//! NetworkManager via nmcli
//!
//! Talks to NetworkManager through its command-line client in terse mode.

use log::{debug, info, warn};
use std::process::Command;

use super::{SavedNetwork, WifiNetworks};
use crate::error::NetworkError;
use crate::scanner::wifi::{AuthType, WifiInfo};

const NMCLI: &str = "nmcli";
const WIRELESS_TYPE: &str = "802-11-wireless";

/// `WifiNetworks` backed by the `nmcli` binary
#[derive(Debug, Clone)]
pub struct NmcliNetworks {
    program: String,
}

impl Default for NmcliNetworks {
    fn default() -> Self {
        Self::new()
    }
}

impl NmcliNetworks {
    pub fn new() -> Self {
        Self {
            program: NMCLI.to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, NetworkError> {
        debug!("{} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| NetworkError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(NetworkError::Rejected(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn saved_network(&self, name: &str) -> Result<SavedNetwork, NetworkError> {
        // `-s` reveals secrets; without it the psk comes back empty
        let output = self.run(&[
            "-s",
            "-g",
            "802-11-wireless.ssid,802-11-wireless.hidden,802-11-wireless-security.key-mgmt,802-11-wireless-security.psk",
            "connection",
            "show",
            "id",
            name,
        ])?;
        Ok(parse_connection_details(name, &output))
    }
}

/// Split one line of terse output. `\:` and `\\` are escapes.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    if let Some(field) = fields.last_mut() {
                        field.push(next);
                    }
                }
            }
            ':' => fields.push(String::new()),
            _ => {
                if let Some(field) = fields.last_mut() {
                    field.push(c);
                }
            }
        }
    }
    fields
}

/// `NAME:TYPE` lines, keeping the Wi-Fi profiles
fn parse_wifi_profile_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let fields = split_terse(line);
            match fields.as_slice() {
                [name, kind] if kind == WIRELESS_TYPE && !name.is_empty() => Some(name.clone()),
                _ => None,
            }
        })
        .collect()
}

/// `ACTIVE:SSID` lines from the device Wi-Fi list
fn parse_active_ssid(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let fields = split_terse(line);
        match fields.as_slice() {
            [active, ssid] if active == "yes" && !ssid.is_empty() => Some(ssid.clone()),
            _ => None,
        }
    })
}

/// Values of a `-g` detail query, one per line in the requested order
fn parse_connection_details(name: &str, output: &str) -> SavedNetwork {
    let mut lines = output.lines().map(str::trim);
    let mut next = || lines.next().unwrap_or_default().to_string();
    let ssid = next();
    let hidden = next();
    let key_mgmt = next();
    let password = next();

    SavedNetwork {
        name: name.to_string(),
        ssid: if ssid.is_empty() { name.to_string() } else { ssid },
        key_mgmt,
        password: (!password.is_empty()).then_some(password),
        hidden: hidden == "yes",
    }
}

/// Arguments for `nmcli connection add`
fn add_connection_args(info: &WifiInfo) -> Vec<String> {
    let mut args: Vec<String> = [
        "connection",
        "add",
        "type",
        "wifi",
        "con-name",
        info.ssid.as_str(),
        "ssid",
        info.ssid.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if info.hidden {
        args.extend(["802-11-wireless.hidden".to_string(), "yes".to_string()]);
    }

    if let Some(auth) = info.auth_type {
        args.extend(["wifi-sec.key-mgmt".to_string(), auth.nm_key_mgmt().to_string()]);
        if let Some(password) = &info.password {
            match auth {
                AuthType::Wpa | AuthType::Wpa2 => {
                    args.extend(["wifi-sec.psk".to_string(), password.clone()])
                }
                AuthType::Wep => args.extend(["wifi-sec.wep-key0".to_string(), password.clone()]),
                // Enterprise credentials need an identity we do not have
                AuthType::Wpa2Eap => {}
            }
        }
    }
    args
}

impl WifiNetworks for NmcliNetworks {
    fn active_wifi_ssid(&self) -> Result<Option<String>, NetworkError> {
        let output = self.run(&["-t", "-f", "ACTIVE,SSID", "device", "wifi", "list", "--rescan", "no"])?;
        Ok(parse_active_ssid(&output))
    }

    fn add_connection(&self, info: &WifiInfo) -> Result<(), NetworkError> {
        let args = add_connection_args(info);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)?;
        info!("Added Wi-Fi connection {}", info.ssid);
        Ok(())
    }

    fn saved_networks(&self) -> Result<Vec<SavedNetwork>, NetworkError> {
        let output = self.run(&["-t", "-f", "NAME,TYPE", "connection", "show"])?;
        let networks = parse_wifi_profile_names(&output)
            .into_iter()
            .filter_map(|name| match self.saved_network(&name) {
                Ok(network) => Some(network),
                Err(e) => {
                    warn!("Skipping saved network {}: {}", name, e);
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!("Found {} saved Wi-Fi network(s)", networks.len());
        Ok(networks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_terse_escapes() {
        assert_eq!(split_terse("yes:My\\:Net"), vec!["yes", "My:Net"]);
        assert_eq!(split_terse("a\\\\b:c"), vec!["a\\b", "c"]);
        assert_eq!(split_terse(":"), vec!["", ""]);
    }

    #[test]
    fn test_profile_names() {
        let output = "Wired connection 1:802-3-ethernet\nHome\\:5G:802-11-wireless\nlo:loopback\nCafe:802-11-wireless\n";
        assert_eq!(parse_wifi_profile_names(output), vec!["Home:5G", "Cafe"]);
    }

    #[test]
    fn test_active_ssid() {
        assert_eq!(
            parse_active_ssid("no:Neighbour\nyes:Home\nno:Other\n"),
            Some("Home".to_string())
        );
        assert_eq!(parse_active_ssid("no:Neighbour\n"), None);
    }

    #[test]
    fn test_connection_details() {
        let saved = parse_connection_details("Home", "home-ssid\nno\nwpa-psk\nhunter2\n");
        assert_eq!(saved.ssid, "home-ssid");
        assert_eq!(saved.key_mgmt, "wpa-psk");
        assert_eq!(saved.password.as_deref(), Some("hunter2"));
        assert!(!saved.hidden);

        let open = parse_connection_details("Cafe", "\nyes\n\n\n");
        assert_eq!(open.ssid, "Cafe");
        assert_eq!(open.password, None);
        assert!(open.hidden);
    }

    #[test]
    fn test_add_connection_args() {
        let mut info = WifiInfo::new("Lab", Some(AuthType::Wpa2), Some("secret".to_string()));
        info.hidden = true;
        assert_eq!(
            add_connection_args(&info).join(" "),
            "connection add type wifi con-name Lab ssid Lab 802-11-wireless.hidden yes \
             wifi-sec.key-mgmt wpa-psk wifi-sec.psk secret"
        );

        let open = WifiInfo::new("Cafe", None, None);
        assert_eq!(
            add_connection_args(&open).join(" "),
            "connection add type wifi con-name Cafe ssid Cafe"
        );

        let wep = WifiInfo::new("Old", Some(AuthType::Wep), Some("abcde".to_string()));
        assert!(add_connection_args(&wep).join(" ").ends_with("wifi-sec.key-mgmt none wifi-sec.wep-key0 abcde"));
    }
}
