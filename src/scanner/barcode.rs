//! Barcode Decoder
//!
//! Linear symbologies (EAN, UPC, Code 128 and friends) through rxing, plus
//! the default scanner that looks for a QR code first and falls back to them.

use rxing::BarcodeFormat;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info};

use super::decoder::{DecodedSymbol, QrScanner, SymbolScanner, QR_CODE};
use crate::media::{self, FrameBuffer, PixelFormat};

/// Symbol type name for an rxing format, spelled the way ZBar spells it
pub fn symbol_type_name(format: &BarcodeFormat) -> String {
    let name = match format {
        BarcodeFormat::EAN_13 => "EAN-13",
        BarcodeFormat::EAN_8 => "EAN-8",
        BarcodeFormat::UPC_A => "UPC-A",
        BarcodeFormat::UPC_E => "UPC-E",
        BarcodeFormat::CODE_39 => "CODE-39",
        BarcodeFormat::CODE_93 => "CODE-93",
        BarcodeFormat::CODE_128 => "CODE-128",
        BarcodeFormat::CODABAR => "Codabar",
        BarcodeFormat::ITF => "I2/5",
        BarcodeFormat::RSS_14 => "DataBar",
        BarcodeFormat::RSS_EXPANDED => "DataBar-Exp",
        BarcodeFormat::QR_CODE => QR_CODE,
        BarcodeFormat::DATA_MATRIX => "DataMatrix",
        BarcodeFormat::PDF_417 => "PDF417",
        BarcodeFormat::AZTEC => "Aztec",
        other => return format!("{:?}", other),
    };
    name.to_string()
}

/// Linear barcode scanner backed by rxing
#[derive(Debug, Default)]
pub struct LinearScanner;

impl LinearScanner {
    pub fn new() -> Self {
        Self
    }

    fn detect(gray: &FrameBuffer) -> Option<DecodedSymbol> {
        match rxing::helpers::detect_in_luma(
            gray.pixels().to_vec(),
            gray.width(),
            gray.height(),
            None,
        ) {
            Ok(result) => Some(DecodedSymbol {
                symbol_type: symbol_type_name(result.getBarcodeFormat()),
                payload: result.getText().to_string(),
            }),
            Err(e) => {
                debug!("No barcode in frame: {:?}", e);
                None
            }
        }
    }
}

impl SymbolScanner for LinearScanner {
    fn scan(&mut self, frame: &FrameBuffer) -> Vec<DecodedSymbol> {
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

        match panic::catch_unwind(AssertUnwindSafe(|| Self::detect(gray))) {
            Ok(Some(symbol)) => {
                info!("{} detected: {}", symbol.symbol_type, symbol.payload);
                vec![symbol]
            }
            Ok(None) => Vec::new(),
            Err(_) => {
                debug!("Barcode reader gave up on frame {}", frame.frame_id());
                Vec::new()
            }
        }
    }
}

/// QR codes first, then linear barcodes. The decoder sessions use by default.
#[derive(Debug, Default)]
pub struct BarcodeScanner {
    qr: QrScanner,
    linear: LinearScanner,
}

impl BarcodeScanner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SymbolScanner for BarcodeScanner {
    fn scan(&mut self, frame: &FrameBuffer) -> Vec<DecodedSymbol> {
        let symbols = self.qr.scan(frame);
        if !symbols.is_empty() {
            return symbols;
        }
        self.linear.scan(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::QrGenerator;
    use rxing::{MultiFormatWriter, Writer};

    fn barcode_frame(contents: &str, format: BarcodeFormat) -> FrameBuffer {
        let matrix = MultiFormatWriter::default()
            .encode(contents, &format, 400, 120)
            .unwrap();
        let mut pixels = Vec::new();
        for y in 0..matrix.getHeight() {
            for x in 0..matrix.getWidth() {
                pixels.push(if matrix.get(x, y) { 0 } else { 255 });
            }
        }
        FrameBuffer::new(
            matrix.getWidth() as u32,
            matrix.getHeight() as u32,
            PixelFormat::Gray8,
            pixels,
        )
        .unwrap()
    }

    #[test]
    fn test_symbol_type_names() {
        assert_eq!(symbol_type_name(&BarcodeFormat::EAN_13), "EAN-13");
        assert_eq!(symbol_type_name(&BarcodeFormat::CODE_128), "CODE-128");
        assert_eq!(symbol_type_name(&BarcodeFormat::QR_CODE), QR_CODE);
    }

    #[test]
    fn test_ean13_decodes() {
        let frame = barcode_frame("5901234123457", BarcodeFormat::EAN_13);
        let symbols = BarcodeScanner::new().scan(&frame);

        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].symbol_type, "EAN-13");
        assert_eq!(symbols[0].payload, "5901234123457");
    }

    #[test]
    fn test_code128_decodes() {
        let frame = barcode_frame("QRSCOPE-42", BarcodeFormat::CODE_128);
        let symbols = LinearScanner::new().scan(&frame);

        assert_eq!(symbols[0].symbol_type, "CODE-128");
        assert_eq!(symbols[0].payload, "QRSCOPE-42");
    }

    #[test]
    fn test_qr_is_tried_first() {
        let image = QrGenerator::new().generate("https://example.com").unwrap();
        let symbols = BarcodeScanner::new().scan(&FrameBuffer::from_gray_image(image));
        assert_eq!(symbols[0].symbol_type, QR_CODE);
        assert_eq!(symbols[0].payload, "https://example.com");
    }

    #[test]
    fn test_blank_frame_yields_nothing() {
        let blank = FrameBuffer::new(64, 48, PixelFormat::Gray8, vec![255; 64 * 48]).unwrap();
        assert!(BarcodeScanner::new().scan(&blank).is_empty());
        let empty = FrameBuffer::new(0, 0, PixelFormat::Gray8, Vec::new()).unwrap();
        assert!(LinearScanner::new().scan(&empty).is_empty());
    }
}
