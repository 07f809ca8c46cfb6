//! qrscope - QR code scanning pipeline
//!
//! Webcam and still-image frame sources, grayscale normalization, QR
//! decoding, payload classification (URL / Wi-Fi / text), a scan session
//! state machine and the reverse path, QR generation.

pub mod app;
pub mod error;
pub mod media;
pub mod net;
pub mod scanner;

pub use app::{ScanSession, ScanSessionState, ScanSource, SessionEvent};
pub use error::{
    CaptureError, DecodeError, DeviceError, EncodeError, NetworkError, ParseError,
    PipelineBuildError,
};
pub use media::{FrameBuffer, PixelFormat};
pub use scanner::{
    classify, BarcodeScanner, DecodedSymbol, QrGenerator, QrScanner, ScanResult, WifiInfo,
};
