//! Scanner
//!
//! Decoding (QR codes and linear barcodes), payload classification and the
//! reverse path, QR generation.

pub mod barcode;
pub mod decoder;
pub mod generator;
pub mod payload;
pub mod wifi;

pub use barcode::{BarcodeScanner, LinearScanner};
pub use decoder::{scan_with_retry, DecodedSymbol, QrScanner, SymbolScanner};
pub use generator::QrGenerator;
pub use payload::{classify, ScanResult};
pub use wifi::{parse_wifi_message, serialize_wifi_message, AuthType, WifiInfo};
