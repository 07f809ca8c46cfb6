//! Scan Session
//!
//! Central state machine: which source is active, which camera is open,
//! whether frames are being decoded, and what result is on display.

pub mod config;
pub mod driver;
pub mod types;

pub use config::Settings;
pub use driver::{SessionDriver, SessionHandle};
pub use types::{ScanSessionState, ScanSource, SessionCommand, SessionEvent};

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{CaptureError, DecodeError, DeviceError, NetworkError};
use crate::media::{CaptureBackend, DeviceInfo, DeviceRegistry, FrameBuffer};
use crate::net::{self, NetworkReply, NetworkRequest, WifiNetworks};
use crate::scanner::{classify, scan_with_retry, DecodedSymbol, ScanResult, SymbolScanner};

/// Scan session controller.
///
/// Owns the decoder and the capture backend; everything it wants the UI to
/// know goes out as a `SessionEvent`.
pub struct ScanSession {
    state: ScanSessionState,
    source: ScanSource,
    scanner: Box<dyn SymbolScanner>,
    capture: Box<dyn CaptureBackend>,
    network: Option<Arc<dyn WifiNetworks>>,
    /// Connection manager work waiting to be run off the session task
    network_requests: Vec<NetworkRequest>,
    devices: DeviceRegistry,
    /// Path or serial of the camera in use
    active_device: Option<String>,
    /// Webcam decoding suspended until an explicit resume
    paused: bool,
    invert_retry: bool,
    result: ScanResult,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ScanSession {
    pub fn new(
        scanner: Box<dyn SymbolScanner>,
        capture: Box<dyn CaptureBackend>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            state: ScanSessionState::Idle,
            source: ScanSource::Webcam,
            scanner,
            capture,
            network: None,
            network_requests: Vec::new(),
            devices: DeviceRegistry::new(),
            active_device: None,
            paused: false,
            invert_retry: true,
            result: ScanResult::None,
            events,
        }
    }

    /// Attach a connection manager, used to mark and join Wi-Fi results
    pub fn with_network(mut self, network: Arc<dyn WifiNetworks>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_invert_retry(mut self, enabled: bool) -> Self {
        self.invert_retry = enabled;
        self
    }

    pub fn state(&self) -> ScanSessionState {
        self.state
    }

    pub fn source(&self) -> ScanSource {
        self.source
    }

    pub fn result(&self) -> &ScanResult {
        &self.result
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        self.devices.list()
    }

    pub fn active_device(&self) -> Option<&str> {
        self.active_device.as_deref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn network(&self) -> Option<Arc<dyn WifiNetworks>> {
        self.network.clone()
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event dropped, no listener");
        }
    }

    fn set_state(&mut self, state: ScanSessionState) {
        if self.state != state {
            debug!("Scan state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn clear_result(&mut self) {
        if !self.result.is_none() {
            self.result = ScanResult::None;
            self.emit(SessionEvent::Result(ScanResult::None));
        }
    }

    /// Stop feeding frames to the decoder. Always done before the capture
    /// graph is paused, stopped or rebuilt.
    fn stop_consuming(&mut self) {
        self.capture.set_consuming(false);
    }

    fn report_capture_error(&mut self, err: CaptureError) -> CaptureError {
        error!("Capture failed: {}", err);
        self.emit(SessionEvent::CaptureFailed(err.clone()));
        self.set_state(ScanSessionState::Idle);
        err
    }

    /// Back to Idle with nothing on display
    pub fn reset(&mut self) {
        self.stop_consuming();
        self.clear_result();
        self.set_state(ScanSessionState::Idle);
    }

    /// Switch between webcam and still images. Leaving the webcam tears
    /// the capture graph down; entering it starts the active (or first) camera.
    pub fn select_source(&mut self, source: ScanSource) -> Result<(), CaptureError> {
        info!("Scan source: {:?}", source);
        self.reset();
        self.source = source;
        match source {
            ScanSource::Image => {
                self.capture.stop();
                self.paused = false;
                Ok(())
            }
            ScanSource::Webcam => self.start_webcam(),
        }
    }

    fn start_webcam(&mut self) -> Result<(), CaptureError> {
        let device = self
            .active_device
            .as_deref()
            .and_then(|key| self.devices.get(key))
            .filter(|d| d.enabled)
            .or_else(|| self.devices.first_enabled())
            .cloned();

        match device {
            Some(device) => self.open_device(&device),
            None => Err(self.report_capture_error(
                DeviceError::Unavailable("no camera found".to_string()).into(),
            )),
        }
    }

    /// Pick another camera. Any displayed result is cleared first.
    pub fn select_device(&mut self, path_or_serial: &str) -> Result<(), CaptureError> {
        let Some(device) = self.devices.get(path_or_serial).cloned() else {
            return Err(self.report_capture_error(
                DeviceError::Unavailable(path_or_serial.to_string()).into(),
            ));
        };
        self.reset();
        self.open_device(&device)
    }

    fn open_device(&mut self, device: &DeviceInfo) -> Result<(), CaptureError> {
        self.stop_consuming();
        let key = device.path_or_serial.as_str();
        if let Err(e) = self.capture.open(device) {
            self.active_device = None;
            // Skipped by automatic selection until picked explicitly
            if self.devices.set_enabled(key, false) {
                self.emit(SessionEvent::DevicesChanged(self.devices.list().to_vec()));
            }
            return Err(self.report_capture_error(e));
        }
        if self.devices.get(key).is_some_and(|d| !d.enabled) {
            self.devices.set_enabled(key, true);
            self.emit(SessionEvent::DevicesChanged(self.devices.list().to_vec()));
        }
        info!("Using camera {} ({})", device.display_name, device.path_or_serial);
        self.active_device = Some(device.path_or_serial.clone());

        if self.source == ScanSource::Webcam {
            self.play()
        } else {
            Ok(())
        }
    }

    fn play(&mut self) -> Result<(), CaptureError> {
        if let Err(e) = self.capture.play() {
            return Err(self.report_capture_error(e));
        }
        self.paused = false;
        self.capture.set_consuming(true);
        self.set_state(ScanSessionState::Scanning);
        Ok(())
    }

    /// Replace the device list (initial enumeration)
    pub fn set_devices(&mut self, devices: Vec<DeviceInfo>) {
        self.devices = DeviceRegistry::new();
        for device in devices {
            if !self.devices.insert(device.clone()) {
                warn!("Ignoring duplicate camera {}", device.path_or_serial);
            }
        }
        self.emit(SessionEvent::DevicesChanged(self.devices.list().to_vec()));
    }

    /// Hot-plug: a camera appeared
    pub fn device_added(&mut self, device: DeviceInfo) {
        let key = device.path_or_serial.clone();
        if self.devices.insert(device) {
            info!("Camera added: {}", key);
            self.emit(SessionEvent::DevicesChanged(self.devices.list().to_vec()));
        } else {
            debug!("Camera {} already known", key);
        }
    }

    /// Hot-plug: a camera went away. Losing the active camera stops
    /// capture and returns to Idle.
    pub fn device_removed(&mut self, path_or_serial: &str) {
        if self.devices.remove(path_or_serial).is_none() {
            return;
        }
        info!("Camera removed: {}", path_or_serial);
        self.emit(SessionEvent::DevicesChanged(self.devices.list().to_vec()));

        if self.active_device.as_deref() == Some(path_or_serial) {
            self.stop_consuming();
            self.capture.stop();
            self.active_device = None;
            self.paused = false;
            self.report_capture_error(DeviceError::Removed(path_or_serial.to_string()).into());
        }
    }

    fn pause_capture(&mut self) {
        self.stop_consuming();
        self.capture.pause();
        self.paused = true;
    }

    /// Suspend webcam decoding. A displayed result stays on screen.
    pub fn pause(&mut self) {
        self.pause_capture();
        if self.state == ScanSessionState::Scanning {
            self.set_state(ScanSessionState::Idle);
        }
    }

    /// Start a fresh webcam scan after a pause or a detection
    pub fn resume(&mut self) -> Result<(), CaptureError> {
        if self.source != ScanSource::Webcam {
            return Ok(());
        }
        self.clear_result();
        if self.capture.is_open() {
            self.play()
        } else {
            self.start_webcam()
        }
    }

    /// Decode one webcam frame. Frames are ignored unless the webcam is
    /// actively scanning; the first detection pauses playback.
    pub fn on_frame(&mut self, frame: &FrameBuffer) -> Option<&ScanResult> {
        if self.source != ScanSource::Webcam
            || self.paused
            || self.state != ScanSessionState::Scanning
        {
            return None;
        }

        let symbol = self.scanner.scan(frame).into_iter().next()?;
        // Stop the stream before publishing so the same code is not
        // reported again from the next frames
        self.pause_capture();
        self.publish(symbol);
        Some(&self.result)
    }

    /// Enter Scanning for a still image whose bytes are still on the way
    pub fn begin_still(&mut self) {
        if self.source == ScanSource::Webcam {
            self.stop_consuming();
            self.capture.stop();
            self.source = ScanSource::Image;
        }
        self.clear_result();
        self.set_state(ScanSessionState::Scanning);
    }

    /// Decode a still image once, with the inverted retry for light-on-dark
    /// codes. Nothing found ends in NoResult.
    pub fn scan_still(&mut self, frame: &FrameBuffer) -> &ScanResult {
        self.begin_still();
        let symbols = scan_with_retry(self.scanner.as_mut(), frame, self.invert_retry);
        match symbols.into_iter().next() {
            Some(symbol) => self.publish(symbol),
            None => {
                info!("No code found in image {}x{}", frame.width(), frame.height());
                self.set_state(ScanSessionState::NoResult);
            }
        }
        &self.result
    }

    /// The still image never made it to the decoder
    pub fn report_decode_error(&mut self, err: DecodeError) {
        warn!("Image decode failed: {}", err);
        self.emit(SessionEvent::DecodeFailed(err));
        self.clear_result();
        self.set_state(ScanSessionState::NoResult);
    }

    fn publish(&mut self, symbol: DecodedSymbol) {
        info!("Decoded {}: {}", symbol.symbol_type, symbol.payload);
        let mut result = classify(&symbol.payload);
        self.emit(SessionEvent::Decoded(symbol));

        if let (ScanResult::Wifi(info), Some(_)) = (&result, &self.network) {
            // `connected` is filled in when the connection manager answers
            self.network_requests
                .push(NetworkRequest::CheckConnected(info.clone()));
        }

        self.result = result.clone();
        self.set_state(ScanSessionState::for_result(&result));
        self.emit(SessionEvent::Result(result));
    }

    /// Ask to join the network of the Wi-Fi result on display. The outcome
    /// arrives later as `WifiConnected` or `WifiConnectFailed`.
    pub fn connect_wifi(&mut self) -> Result<(), NetworkError> {
        let request = match (&self.result, &self.network) {
            (ScanResult::Wifi(info), Some(_)) => Ok(NetworkRequest::Connect(info.clone())),
            (ScanResult::Wifi(_), None) => Err(NetworkError::Unavailable(
                "no connection manager".to_string(),
            )),
            _ => Err(NetworkError::NothingToConnect),
        };

        match request {
            Ok(request) => {
                info!("Joining Wi-Fi {}", request.ssid());
                self.network_requests.push(request);
                Ok(())
            }
            Err(e) => {
                warn!("Wi-Fi connection failed: {}", e);
                self.emit(SessionEvent::WifiConnectFailed(e.clone()));
                Err(e)
            }
        }
    }

    /// Hand over queued connection manager work
    pub fn take_network_requests(&mut self) -> Vec<NetworkRequest> {
        std::mem::take(&mut self.network_requests)
    }

    /// Apply a connection manager answer. Answers about a network that is
    /// no longer on display only produce their event.
    pub fn on_network_reply(&mut self, reply: NetworkReply) {
        match reply {
            NetworkReply::Connectivity { ssid, connected } => {
                if self.mark_connected(&ssid, connected) {
                    self.emit(SessionEvent::WifiConnectivity { ssid, connected });
                }
            }
            NetworkReply::Joined {
                ssid,
                outcome: Ok(()),
            } => {
                info!("Connected to Wi-Fi {}", ssid);
                self.mark_connected(&ssid, true);
                self.emit(SessionEvent::WifiConnected(ssid));
            }
            NetworkReply::Joined {
                ssid,
                outcome: Err(e),
            } => {
                warn!("Joining Wi-Fi {} failed: {}", ssid, e);
                self.emit(SessionEvent::WifiConnectFailed(e));
            }
        }
    }

    fn mark_connected(&mut self, ssid: &str, connected: bool) -> bool {
        match &mut self.result {
            ScanResult::Wifi(info) if info.ssid == ssid => {
                info.connected = connected;
                true
            }
            _ => false,
        }
    }

    /// Run queued connection manager work to completion. For one-shot
    /// callers without a `SessionDriver`; returns the first failed join.
    pub async fn settle_network(&mut self) -> Result<(), NetworkError> {
        let Some(network) = self.network.clone() else {
            return Ok(());
        };
        let mut outcome = Ok(());
        for request in self.take_network_requests() {
            let reply = net::execute(network.clone(), request).await;
            if let NetworkReply::Joined { outcome: Err(e), .. } = &reply {
                if outcome.is_ok() {
                    outcome = Err(e.clone());
                }
            }
            self.on_network_reply(reply);
        }
        outcome
    }
}
