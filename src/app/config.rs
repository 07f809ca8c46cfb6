//! Application Configuration
//!
//! Persistent settings for the qrscope command-line front end. The scanning
//! core itself keeps no state across runs; the binary reads these and passes
//! the values in.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::media::CaptureConfig;
use crate::scanner::generator::{QrGenerator, DEFAULT_BORDER, DEFAULT_MODULE_SIZE};

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Camera ===
    /// Flip the camera image horizontally
    pub mirror: bool,

    /// Show a local preview window while scanning
    pub preview: bool,

    /// Path or serial of the camera to use first
    pub preferred_device: Option<String>,

    // === Decoding ===
    /// Retry inverted when a black & white image yields nothing
    pub invert_retry: bool,

    // === Generator ===
    /// Quiet zone, in modules
    pub qr_border: u32,

    /// Pixels per module
    pub qr_module_size: u32,

    // === Logging ===
    /// Default log filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mirror: false,
            preview: true,
            preferred_device: None,
            invert_retry: true,
            qr_border: DEFAULT_BORDER,
            qr_module_size: DEFAULT_MODULE_SIZE,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Get settings file path
    pub fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("qrscope").join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_json(&content)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, self.to_json()?)?;

        Ok(())
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            mirror: self.mirror,
            preview: self.preview,
            ..Default::default()
        }
    }

    pub fn generator(&self) -> QrGenerator {
        QrGenerator::new()
            .with_border(self.qr_border)
            .with_module_size(self.qr_module_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.invert_retry);
        assert_eq!(settings.qr_border, 2);
        assert_eq!(settings.generator(), QrGenerator::new());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings = Settings::from_json(r#"{ "mirror": true, "qr_border": 4 }"#).unwrap();
        assert!(settings.mirror);
        assert_eq!(settings.qr_border, 4);
        assert_eq!(settings.qr_module_size, DEFAULT_MODULE_SIZE);
        assert_eq!(settings.log_filter, "info");
        assert!(settings.capture_config().mirror);
    }

    #[test]
    fn test_json_round_trip() {
        let settings = Settings {
            preferred_device: Some("/dev/video2".to_string()),
            preview: false,
            ..Default::default()
        };
        let json = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(Settings::from_json("{ not json").is_err());
    }
}
