//! Camera Devices
//!
//! The live set of usable cameras, keyed by device path (V4L2) or object
//! serial (PipeWire). Hot-plug events add and remove entries.

use serde::{Deserialize, Serialize};

/// Capture backend a device belongs to, decided once at enumeration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSourceType {
    V4L2,
    PipeWire,
}

impl DeviceSourceType {
    /// GStreamer source element for this backend
    pub fn element_name(&self) -> &'static str {
        match self {
            DeviceSourceType::V4L2 => "v4l2src",
            DeviceSourceType::PipeWire => "pipewiresrc",
        }
    }

    /// Source element property that selects the device
    pub fn selector_property(&self) -> &'static str {
        match self {
            DeviceSourceType::V4L2 => "device",
            DeviceSourceType::PipeWire => "target-object",
        }
    }

    /// Map a GStreamer `device.api` value
    pub fn from_device_api(api: &str) -> Option<Self> {
        match api {
            "v4l2" => Some(DeviceSourceType::V4L2),
            "pipewire" => Some(DeviceSourceType::PipeWire),
            _ => None,
        }
    }
}

/// A camera the user can pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub source_type: DeviceSourceType,
    /// V4L2 device path or PipeWire object serial
    pub path_or_serial: String,
    pub display_name: String,
    pub enabled: bool,
}

impl DeviceInfo {
    pub fn new(
        source_type: DeviceSourceType,
        path_or_serial: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            source_type,
            path_or_serial: path_or_serial.into(),
            display_name: display_name.into(),
            enabled: true,
        }
    }
}

/// Hot-plug notification from a device monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Added(DeviceInfo),
    /// Carries the path or serial of the device that went away
    Removed(String),
}

/// Ordered device set with unique keys
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceInfo>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device. Returns false (and keeps the existing entry) when the
    /// key is already present or empty.
    pub fn insert(&mut self, device: DeviceInfo) -> bool {
        if device.path_or_serial.is_empty() || self.contains(&device.path_or_serial) {
            return false;
        }
        self.devices.push(device);
        true
    }

    /// Remove a device by key, returning it if it was present
    pub fn remove(&mut self, path_or_serial: &str) -> Option<DeviceInfo> {
        let pos = self
            .devices
            .iter()
            .position(|d| d.path_or_serial == path_or_serial)?;
        Some(self.devices.remove(pos))
    }

    pub fn get(&self, path_or_serial: &str) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.path_or_serial == path_or_serial)
    }

    pub fn contains(&self, path_or_serial: &str) -> bool {
        self.get(path_or_serial).is_some()
    }

    /// Enable or disable a device; returns false if it is unknown
    pub fn set_enabled(&mut self, path_or_serial: &str, enabled: bool) -> bool {
        match self
            .devices
            .iter_mut()
            .find(|d| d.path_or_serial == path_or_serial)
        {
            Some(device) => {
                device.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// First enabled device in enumeration order
    pub fn first_enabled(&self) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.enabled)
    }

    pub fn list(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
