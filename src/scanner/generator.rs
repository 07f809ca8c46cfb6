//! QR Code Generator
//!
//! Text (or a Wi-Fi record) in, grayscale bitmap out. Bitmaps can be written
//! as PNG or put on the clipboard.

use image::{GrayImage, ImageFormat, Luma};
use log::{debug, info};
use qrcode::render::unicode::Dense1x2;
use qrcode::types::QrError;
use qrcode::{Color, EcLevel, QrCode};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use super::wifi::{serialize_wifi_message, WifiInfo};
use crate::error::EncodeError;

/// Quiet zone width, in modules
pub const DEFAULT_BORDER: u32 = 2;
/// Pixels per module
pub const DEFAULT_MODULE_SIZE: u32 = 10;
/// Largest bitmap side we are willing to allocate
pub const MAX_SIDE: u32 = 16_384;

const DARK: u8 = 0;
const LIGHT: u8 = 255;

/// Deterministic text to QR bitmap encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrGenerator {
    pub border: u32,
    pub module_size: u32,
    pub ec_level: EcLevel,
}

impl Default for QrGenerator {
    fn default() -> Self {
        Self {
            border: DEFAULT_BORDER,
            module_size: DEFAULT_MODULE_SIZE,
            ec_level: EcLevel::M,
        }
    }
}

impl QrGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_border(mut self, border: u32) -> Self {
        self.border = border;
        self
    }

    pub fn with_module_size(mut self, module_size: u32) -> Self {
        self.module_size = module_size.max(1);
        self
    }

    fn encode(&self, text: &str) -> Result<QrCode, EncodeError> {
        QrCode::with_error_correction_level(text.as_bytes(), self.ec_level).map_err(|e| match e {
            QrError::DataTooLong => EncodeError::TextTooLong,
            other => EncodeError::Invalid(other.to_string()),
        })
    }

    /// Encode `text` into a black-on-white bitmap
    pub fn generate(&self, text: &str) -> Result<GrayImage, EncodeError> {
        let code = self.encode(text)?;

        let modules = code.width() as u32;
        let colors = code.to_colors();
        let scale = self.module_size.max(1);
        let side = self
            .border
            .checked_mul(2)
            .and_then(|quiet| quiet.checked_add(modules))
            .and_then(|span| span.checked_mul(scale))
            .filter(|side| *side <= MAX_SIDE)
            .ok_or_else(|| {
                EncodeError::Invalid(format!(
                    "{} modules with border {} at {} px exceed {} px",
                    modules, self.border, scale, MAX_SIDE
                ))
            })?;

        debug!(
            "QR version {:?}, {} modules, {}x{} px",
            code.version(),
            modules,
            side,
            side
        );

        let image = GrayImage::from_fn(side, side, |x, y| {
            let (mx, my) = (x / scale, y / scale);
            let inside = (self.border..self.border + modules).contains(&mx)
                && (self.border..self.border + modules).contains(&my);
            if !inside {
                return Luma([LIGHT]);
            }
            let index = ((my - self.border) * modules + (mx - self.border)) as usize;
            match colors[index] {
                Color::Dark => Luma([DARK]),
                Color::Light => Luma([LIGHT]),
            }
        });
        Ok(image)
    }

    /// Encode a Wi-Fi join record
    pub fn generate_wifi(&self, info: &WifiInfo) -> Result<GrayImage, EncodeError> {
        self.generate(&serialize_wifi_message(info))
    }

    /// Render with half-block characters for a dark terminal
    pub fn to_terminal(&self, text: &str) -> Result<String, EncodeError> {
        let code = self.encode(text)?;
        Ok(code
            .render::<Dense1x2>()
            .dark_color(Dense1x2::Light)
            .light_color(Dense1x2::Dark)
            .quiet_zone(self.border > 0)
            .build())
    }
}

/// Default export name, `qrcode_YYYYmmdd_HHMMSS.png`
pub fn default_file_name() -> String {
    chrono::Local::now()
        .format("qrcode_%Y%m%d_%H%M%S.png")
        .to_string()
}

/// PNG-encode a bitmap
pub fn to_png(image: &GrayImage) -> Result<Vec<u8>, EncodeError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| EncodeError::Image(e.to_string()))?;
    Ok(out.into_inner())
}

/// Write a bitmap as PNG. A directory target gets the default file name.
pub fn save_png(image: &GrayImage, target: &Path) -> Result<PathBuf, EncodeError> {
    let path = if target.is_dir() {
        target.join(default_file_name())
    } else {
        target.to_path_buf()
    };
    std::fs::write(&path, to_png(image)?).map_err(|e| EncodeError::Image(e.to_string()))?;
    info!("Saved QR code to {}", path.display());
    Ok(path)
}

/// Put a bitmap on the system clipboard
pub fn copy_to_clipboard(image: &GrayImage) -> Result<(), EncodeError> {
    let rgba: Vec<u8> = image
        .pixels()
        .flat_map(|Luma([l])| [*l, *l, *l, 255])
        .collect();
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| EncodeError::Image(e.to_string()))?;
    clipboard
        .set_image(arboard::ImageData {
            width: image.width() as usize,
            height: image.height() as usize,
            bytes: rgba.into(),
        })
        .map_err(|e| EncodeError::Image(e.to_string()))?;
    info!("Copied QR code to clipboard");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{invert, FrameBuffer};
    use crate::scanner::decoder::{scan_with_retry, QrScanner, SymbolScanner};
    use crate::scanner::wifi::AuthType;

    #[test]
    fn test_generate_dimensions() {
        let image = QrGenerator::new().generate("hello").unwrap();
        // Version 1 is 21 modules wide
        assert_eq!(image.width(), (21 + 2 * DEFAULT_BORDER) * DEFAULT_MODULE_SIZE);
        assert_eq!(image.width(), image.height());
        assert_eq!(image.get_pixel(0, 0), &Luma([LIGHT]));
        // Top-left finder pattern starts right after the border
        let start = DEFAULT_BORDER * DEFAULT_MODULE_SIZE;
        assert_eq!(image.get_pixel(start, start), &Luma([DARK]));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let generator = QrGenerator::new().with_border(4).with_module_size(3);
        assert_eq!(generator.generate("same").unwrap(), generator.generate("same").unwrap());
    }

    #[test]
    fn test_too_long() {
        let text = "x".repeat(5000);
        assert_eq!(QrGenerator::new().generate(&text), Err(EncodeError::TextTooLong));
    }

    #[test]
    fn test_oversized_bitmap_is_an_error() {
        let huge_border = QrGenerator::new().with_border(u32::MAX / 2);
        assert!(matches!(huge_border.generate("x"), Err(EncodeError::Invalid(_))));

        let huge_modules = QrGenerator::new().with_module_size(u32::MAX);
        assert!(matches!(huge_modules.generate("x"), Err(EncodeError::Invalid(_))));

        // 21 + 4 modules at 656 px is just over the ceiling
        let just_over = QrGenerator::new().with_module_size(656);
        assert!(matches!(just_over.generate("x"), Err(EncodeError::Invalid(_))));
    }

    #[test]
    fn test_generated_code_decodes() {
        let image = QrGenerator::new().generate("https://example.com/qr").unwrap();
        let mut scanner = QrScanner::new();
        let symbols = scanner.scan(&FrameBuffer::from_gray_image(image));

        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].payload, "https://example.com/qr");
    }

    #[test]
    fn test_wifi_code_decodes() {
        let info = WifiInfo::new("Wikipedia", Some(AuthType::Wpa), Some("Password1!".to_string()));
        let image = QrGenerator::new().generate_wifi(&info).unwrap();
        let symbols = QrScanner::new().scan(&FrameBuffer::from_gray_image(image));
        assert_eq!(symbols[0].payload, "WIFI:S:Wikipedia;T:WPA;P:Password1!;;");
    }

    #[test]
    fn test_inverted_code_needs_retry() {
        let image = QrGenerator::new().generate("light on dark").unwrap();
        let inverted = invert(&FrameBuffer::from_gray_image(image));
        let mut scanner = QrScanner::new();

        let symbols = scan_with_retry(&mut scanner, &inverted, true);
        assert_eq!(symbols[0].payload, "light on dark");
    }

    #[test]
    fn test_png_export() {
        let image = QrGenerator::new().generate("png").unwrap();
        let png = to_png(&image).unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);

        let dir = std::env::temp_dir().join(format!("qrscope-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = save_png(&image, &dir).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("qrcode_"));
        assert!(path.exists());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_terminal_rendering() {
        let art = QrGenerator::new().to_terminal("hi").unwrap();
        assert!(art.lines().count() > 10);
        assert!(art.contains('\u{2588}') || art.contains('\u{2580}') || art.contains('\u{2584}'));
    }

    #[test]
    fn test_default_file_name_shape() {
        let name = default_file_name();
        assert!(name.starts_with("qrcode_"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "qrcode_20240101_120000.png".len());
    }
}
