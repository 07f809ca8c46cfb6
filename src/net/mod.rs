//! Wi-Fi Networks
//!
//! The connection manager the scan session talks to when it finds a Wi-Fi
//! record, plus the saved-network listing used for QR generation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::NetworkError;
use crate::scanner::wifi::{AuthType, WifiInfo};

pub mod nmcli;

pub use nmcli::NmcliNetworks;

/// A Wi-Fi profile stored by the connection manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedNetwork {
    /// Connection profile name
    pub name: String,
    pub ssid: String,
    /// NetworkManager key management (`wpa-psk`, `none`, ...)
    pub key_mgmt: String,
    pub password: Option<String>,
    pub hidden: bool,
}

impl SavedNetwork {
    /// Credentials suitable for a Wi-Fi QR code
    pub fn to_wifi_info(&self) -> WifiInfo {
        let mut info = WifiInfo::new(
            self.ssid.clone(),
            AuthType::from_nm_key_mgmt(&self.key_mgmt),
            self.password.clone().filter(|p| !p.is_empty()),
        );
        info.hidden = self.hidden;
        info
    }
}

/// Connection manager operations the scanner needs. Calls may block, so
/// async callers go through `execute`.
pub trait WifiNetworks: Send + Sync {
    /// SSID of the Wi-Fi network currently in use, if any
    fn active_wifi_ssid(&self) -> Result<Option<String>, NetworkError>;

    /// Save and activate a connection for `info`
    fn add_connection(&self, info: &WifiInfo) -> Result<(), NetworkError>;

    /// Saved Wi-Fi profiles
    fn saved_networks(&self) -> Result<Vec<SavedNetwork>, NetworkError>;

    /// Whether the machine is already on the network `info` describes
    fn is_connected_to(&self, info: &WifiInfo) -> bool {
        match self.active_wifi_ssid() {
            Ok(Some(ssid)) => ssid == info.ssid,
            Ok(None) => false,
            Err(e) => {
                log::debug!("Cannot query active Wi-Fi: {}", e);
                false
            }
        }
    }
}

/// Work the scan session hands to the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkRequest {
    /// Is the machine already on this network?
    CheckConnected(WifiInfo),
    /// Save and activate a connection for this network
    Connect(WifiInfo),
}

/// Answer to a `NetworkRequest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkReply {
    Connectivity { ssid: String, connected: bool },
    Joined {
        ssid: String,
        outcome: Result<(), NetworkError>,
    },
}

impl NetworkRequest {
    pub fn ssid(&self) -> &str {
        match self {
            NetworkRequest::CheckConnected(info) | NetworkRequest::Connect(info) => &info.ssid,
        }
    }

    /// Run the request on the calling thread
    pub fn run(self, network: &dyn WifiNetworks) -> NetworkReply {
        match self {
            NetworkRequest::CheckConnected(info) => NetworkReply::Connectivity {
                connected: network.is_connected_to(&info),
                ssid: info.ssid,
            },
            NetworkRequest::Connect(info) => NetworkReply::Joined {
                outcome: network.add_connection(&info),
                ssid: info.ssid,
            },
        }
    }

    fn failed(&self, reason: String) -> NetworkReply {
        let ssid = self.ssid().to_string();
        match self {
            NetworkRequest::CheckConnected(_) => NetworkReply::Connectivity {
                ssid,
                connected: false,
            },
            NetworkRequest::Connect(_) => NetworkReply::Joined {
                ssid,
                outcome: Err(NetworkError::Unavailable(reason)),
            },
        }
    }
}

/// Run a request on tokio's blocking pool, keeping slow connection
/// manager calls off the async workers
pub async fn execute(network: Arc<dyn WifiNetworks>, request: NetworkRequest) -> NetworkReply {
    let pending = request.clone();
    match tokio::task::spawn_blocking(move || request.run(network.as_ref())).await {
        Ok(reply) => reply,
        Err(e) => {
            log::warn!("Connection manager call for {} failed: {}", pending.ssid(), e);
            pending.failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingNetwork {
        active: Option<String>,
        reject: bool,
        added: Mutex<Vec<String>>,
    }

    impl WifiNetworks for RecordingNetwork {
        fn active_wifi_ssid(&self) -> Result<Option<String>, NetworkError> {
            Ok(self.active.clone())
        }

        fn add_connection(&self, info: &WifiInfo) -> Result<(), NetworkError> {
            if self.reject {
                return Err(NetworkError::Rejected("secrets required".to_string()));
            }
            self.added.lock().push(info.ssid.clone());
            Ok(())
        }

        fn saved_networks(&self) -> Result<Vec<SavedNetwork>, NetworkError> {
            Ok(Vec::new())
        }
    }

    fn home() -> WifiInfo {
        WifiInfo::new("Home", Some(AuthType::Wpa), Some("pw".to_string()))
    }

    #[tokio::test]
    async fn test_execute_runs_off_the_runtime() {
        let network = Arc::new(RecordingNetwork {
            active: Some("Home".to_string()),
            reject: false,
            added: Mutex::new(Vec::new()),
        });

        let reply = execute(network.clone(), NetworkRequest::CheckConnected(home())).await;
        assert_eq!(
            reply,
            NetworkReply::Connectivity {
                ssid: "Home".to_string(),
                connected: true
            }
        );

        let reply = execute(network.clone(), NetworkRequest::Connect(home())).await;
        assert!(matches!(reply, NetworkReply::Joined { outcome: Ok(()), .. }));
        assert_eq!(network.added.lock().as_slice(), ["Home".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_connection_is_reported() {
        let network = Arc::new(RecordingNetwork {
            active: None,
            reject: true,
            added: Mutex::new(Vec::new()),
        });
        let reply = execute(network, NetworkRequest::Connect(home())).await;
        assert!(matches!(
            reply,
            NetworkReply::Joined { outcome: Err(NetworkError::Rejected(_)), .. }
        ));
    }

    #[test]
    fn test_saved_network_to_wifi_info() {
        let saved = SavedNetwork {
            name: "Home".to_string(),
            ssid: "home-5g".to_string(),
            key_mgmt: "sae".to_string(),
            password: Some("hunter2".to_string()),
            hidden: true,
        };
        let info = saved.to_wifi_info();
        assert_eq!(info.auth_type, Some(AuthType::Wpa));
        assert_eq!(info.password.as_deref(), Some("hunter2"));
        assert!(info.hidden);
    }

    #[test]
    fn test_open_saved_network_drops_password() {
        let saved = SavedNetwork {
            name: "Cafe".to_string(),
            ssid: "Cafe".to_string(),
            key_mgmt: String::new(),
            password: Some("stale".to_string()),
            hidden: false,
        };
        let info = saved.to_wifi_info();
        assert!(info.is_open());
        assert_eq!(info.password, None);
    }
}
