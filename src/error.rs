//! Error Types
//!
//! Typed errors for every stage of the scan pipeline. None of them is fatal:
//! the session controller turns them into state changes or status events.

use thiserror::Error;

/// Camera device problems
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// No usable camera for the requested selection
    #[error("no camera available: {0}")]
    Unavailable(String),

    /// The device went away while it was in use
    #[error("camera {0} was removed")]
    Removed(String),
}

/// Image container / frame problems
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bytes could not be decoded as an image
    #[error("unreadable image: {0}")]
    UnreadableImage(String),

    /// Content type is known and is not an image
    #[error("not an image (content type {0})")]
    NotAnImage(String),

    /// Reading the file or fetching the URI failed
    #[error("failed to read {location}: {reason}")]
    Read { location: String, reason: String },

    /// Pixel buffer length does not match width * height * channels
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    InvalidFrame { expected: usize, actual: usize },
}

/// Malformed Wi-Fi record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown Wi-Fi auth type: {0}")]
    UnknownAuthType(String),
}

/// QR generation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("text is too long to fit in a QR code")]
    TextTooLong,

    #[error("cannot encode QR code: {0}")]
    Invalid(String),

    #[error("cannot write image: {0}")]
    Image(String),
}

/// Capture graph construction failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineBuildError {
    #[error("GStreamer initialization failed: {0}")]
    Init(String),

    #[error("failed to build pipeline `{description}`: {reason}")]
    Launch { description: String, reason: String },

    #[error("pipeline has no element named {0}")]
    MissingElement(&'static str),

    #[error("pipeline state change failed: {0}")]
    StateChange(String),
}

/// Anything the capture side can report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Pipeline(#[from] PipelineBuildError),
}

/// Wi-Fi connection collaborator failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("network manager is not available: {0}")]
    Unavailable(String),

    #[error("network manager refused the request: {0}")]
    Rejected(String),

    #[error("no Wi-Fi result to connect to")]
    NothingToConnect,
}
