//! QR Code Decoder
//!
//! Runs grayscale frames through rqrr and reports every symbol it can read.

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info};

use crate::media::{self, FrameBuffer, PixelFormat};

/// Symbol type reported for QR codes
pub const QR_CODE: &str = "QR-Code";

/// One decoded symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedSymbol {
    pub symbol_type: String,
    pub payload: String,
}

/// Anything that can find symbols in a grayscale frame.
///
/// Implementations return an empty list when nothing is found and never
/// fail on garbage input.
pub trait SymbolScanner: Send {
    fn scan(&mut self, frame: &FrameBuffer) -> Vec<DecodedSymbol>;
}

/// QR scanner backed by rqrr. One instance is reused for every frame.
#[derive(Debug, Default)]
pub struct QrScanner {
    /// Frames scanned so far
    frame_count: u64,
}

impl QrScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn detect(gray: &FrameBuffer) -> Vec<DecodedSymbol> {
        let width = gray.width() as usize;
        let pixels = gray.pixels();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width,
            gray.height() as usize,
            |x, y| pixels[y * width + x],
        );

        let grids = prepared.detect_grids();
        debug!("Found {} potential QR grids", grids.len());

        grids
            .into_iter()
            .filter_map(|grid| match grid.decode() {
                Ok((_, content)) => Some(DecodedSymbol {
                    symbol_type: QR_CODE.to_string(),
                    payload: content,
                }),
                Err(e) => {
                    debug!("Grid decode failed: {:?}", e);
                    None
                }
            })
            .collect()
    }
}

impl SymbolScanner for QrScanner {
    fn scan(&mut self, frame: &FrameBuffer) -> Vec<DecodedSymbol> {
        self.frame_count += 1;
        if frame.is_empty() {
            return Vec::new();
        }

        let converted;
        let gray = if frame.format() == PixelFormat::Gray8 {
            frame
        } else {
            converted = media::to_grayscale(frame);
            &converted
        };

        debug!(
            "Scanning frame {} for QR code ({}x{})",
            frame.frame_id(),
            gray.width(),
            gray.height()
        );

        // rqrr indexes grid cells with arithmetic that can panic on
        // adversarial input; a bad frame just yields nothing
        match panic::catch_unwind(AssertUnwindSafe(|| Self::detect(gray))) {
            Ok(symbols) => {
                if let Some(first) = symbols.first() {
                    info!("QR code detected: {}", first.payload);
                }
                symbols
            }
            Err(_) => {
                debug!("Decoder gave up on frame {}", frame.frame_id());
                Vec::new()
            }
        }
    }
}

/// Scan a frame, retrying once on the inverted image when the first pass
/// finds nothing and the picture is almost pure black and white.
pub fn scan_with_retry(
    scanner: &mut dyn SymbolScanner,
    frame: &FrameBuffer,
    invert_retry: bool,
) -> Vec<DecodedSymbol> {
    let gray = media::to_grayscale(frame);
    let symbols = scanner.scan(&gray);
    if !symbols.is_empty() || !invert_retry {
        return symbols;
    }

    if !media::is_almost_black_white(frame) {
        return symbols;
    }

    info!("Image is almost black & white, retrying inverted");
    scanner.scan(&media::invert(&gray))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame_yields_nothing() {
        let mut scanner = QrScanner::new();
        let empty = FrameBuffer::new(0, 0, PixelFormat::Gray8, Vec::new()).unwrap();
        assert!(scanner.scan(&empty).is_empty());
    }

    #[test]
    fn test_all_zero_frame_yields_nothing() {
        let mut scanner = QrScanner::new();
        let black = FrameBuffer::new(64, 48, PixelFormat::Gray8, vec![0; 64 * 48]).unwrap();
        assert!(scanner.scan(&black).is_empty());
        assert_eq!(scanner.frame_count(), 1);
    }

    #[test]
    fn test_noise_yields_nothing() {
        let mut scanner = QrScanner::new();
        let pixels: Vec<u8> = (0..120u32 * 90)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();
        let noise = FrameBuffer::new(120, 90, PixelFormat::Gray8, pixels).unwrap();
        assert!(scanner.scan(&noise).is_empty());
    }

    #[test]
    fn test_color_frames_are_accepted() {
        let mut scanner = QrScanner::new();
        let white = FrameBuffer::new(8, 8, PixelFormat::Rgba8, vec![255; 8 * 8 * 4]).unwrap();
        assert!(scanner.scan(&white).is_empty());
    }
}
