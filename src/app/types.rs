//! Application Types
//!
//! States, events and commands shared by the session controller, its async
//! driver and whatever UI sits on top.

use serde::Serialize;

use crate::error::{CaptureError, DecodeError, NetworkError};
use crate::media::{DeviceInfo, FrameBuffer, ImageLocation};
use crate::scanner::{DecodedSymbol, ScanResult};

/// What the UI should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSessionState {
    /// Nothing is being decoded
    #[default]
    Idle,
    /// Webcam frames or a still image are being decoded
    Scanning,
    /// A still image held no readable code
    NoResult,
    WifiFound,
    UrlFound,
    TextFound,
}

impl ScanSessionState {
    /// State reached after classifying a payload
    pub fn for_result(result: &ScanResult) -> Self {
        match result {
            ScanResult::None => ScanSessionState::NoResult,
            ScanResult::Url { .. } => ScanSessionState::UrlFound,
            ScanResult::Wifi(_) => ScanSessionState::WifiFound,
            ScanResult::Text { .. } => ScanSessionState::TextFound,
        }
    }
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    #[default]
    Webcam,
    Image,
}

/// Notifications from the session controller to its UI sink
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ScanSessionState),
    /// Raw decoded symbol, published before its classification
    Decoded(DecodedSymbol),
    /// Classified result; `ScanResult::None` clears the display
    Result(ScanResult),
    DevicesChanged(Vec<DeviceInfo>),
    /// Camera or pipeline problem, non-fatal
    CaptureFailed(CaptureError),
    /// Still image could not be read or decoded
    DecodeFailed(DecodeError),
    /// Connection manager answer for the Wi-Fi result on display
    WifiConnectivity { ssid: String, connected: bool },
    WifiConnected(String),
    WifiConnectFailed(NetworkError),
}

/// Requests from a UI (or the CLI) to the session driver
#[derive(Debug)]
pub enum SessionCommand {
    SelectSource(ScanSource),
    /// Switch to the camera with this path or serial
    SelectDevice(String),
    Pause,
    Resume,
    Reset,
    /// Read, decode and scan an image file or URI
    ScanImage(ImageLocation),
    /// Scan an image already in memory (clipboard paste)
    ScanFrame(FrameBuffer),
    /// Join the Wi-Fi network of the current result
    ConnectWifi,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::classify;

    #[test]
    fn test_state_for_result() {
        assert_eq!(
            ScanSessionState::for_result(&classify("https://example.com")),
            ScanSessionState::UrlFound
        );
        assert_eq!(
            ScanSessionState::for_result(&classify("WIFI:S:x;T:WPA;P:y;;")),
            ScanSessionState::WifiFound
        );
        assert_eq!(
            ScanSessionState::for_result(&classify("plain")),
            ScanSessionState::TextFound
        );
        assert_eq!(ScanSessionState::for_result(&ScanResult::None), ScanSessionState::NoResult);
    }
}
