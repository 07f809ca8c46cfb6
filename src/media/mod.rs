//! Media Pipeline
//!
//! Frame sources (camera, still images, generated bitmaps) and the
//! grayscale normalization that feeds the decoder.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DecodeError;

pub mod capture;
pub mod devices;
pub mod grayscale;
pub mod queue;
pub mod still;

#[cfg(feature = "camera")]
pub mod gstreamer_capture;

pub use capture::{CaptureBackend, CaptureConfig, NullCapture, PreviewSink};
pub use devices::{DeviceEvent, DeviceInfo, DeviceRegistry, DeviceSourceType};
pub use grayscale::{invert, is_almost_black_white, to_grayscale};
pub use queue::{FrameQueue, LeakyQueue};
pub use still::{choose_first_image, ImageLocation};

#[cfg(feature = "camera")]
pub use gstreamer_capture::{enumerate_devices, DeviceMonitor, GstCapture};

/// Global frame ID counter for unique frame identification
static FRAME_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique frame ID
pub fn next_frame_id() -> u64 {
    FRAME_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit RGB with straight (non-premultiplied) alpha
    Rgba8,
    /// 8-bit RGB
    Rgb8,
    /// 8-bit luminance, what the decoder consumes
    #[default]
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// A tightly packed pixel buffer.
///
/// Buffers are never mutated in place; every transformation produces a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    frame_id: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// Wrap a packed pixel buffer, checking its length against the dimensions
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self, DecodeError> {
        let expected = width as usize * height as usize * format.channels();
        if pixels.len() != expected {
            return Err(DecodeError::InvalidFrame {
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            frame_id: next_frame_id(),
            width,
            height,
            format,
            pixels,
        })
    }

    /// Copy a luminance plane that may carry row padding.
    /// `stride` is the number of bytes per row in `plane` (>= width).
    pub fn from_strided_gray(
        plane: &[u8],
        width: u32,
        height: u32,
        stride: u32,
    ) -> Result<Self, DecodeError> {
        let (w, h, stride) = (width as usize, height as usize, stride as usize);
        if stride < w || plane.len() < stride * h.saturating_sub(1) + w {
            return Err(DecodeError::InvalidFrame {
                expected: stride * h,
                actual: plane.len(),
            });
        }

        let pixels = if stride == w {
            plane[..w * h].to_vec()
        } else {
            let mut packed = Vec::with_capacity(w * h);
            for row in 0..h {
                let start = row * stride;
                packed.extend_from_slice(&plane[start..start + w]);
            }
            packed
        };

        Self::new(width, height, PixelFormat::Gray8, pixels)
    }

    /// Convert a decoded image, keeping alpha only when the source has it
    pub fn from_dynamic(img: image::DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let (format, pixels) = if img.color().has_alpha() {
            (PixelFormat::Rgba8, img.into_rgba8().into_raw())
        } else if img.color().has_color() {
            (PixelFormat::Rgb8, img.into_rgb8().into_raw())
        } else {
            (PixelFormat::Gray8, img.into_luma8().into_raw())
        };

        Self {
            frame_id: next_frame_id(),
            width,
            height,
            format,
            pixels,
        }
    }

    /// Wrap a generated grayscale bitmap
    pub fn from_gray_image(img: image::GrayImage) -> Self {
        Self {
            frame_id: next_frame_id(),
            width: img.width(),
            height: img.height(),
            format: PixelFormat::Gray8,
            pixels: img.into_raw(),
        }
    }

    /// Build a GRAY8 frame from pixels produced by a conversion of a frame
    /// with the same dimensions
    pub(crate) fn gray_from_conversion(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize);
        Self {
            frame_id: next_frame_id(),
            width,
            height,
            format: PixelFormat::Gray8,
            pixels,
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels (not bytes)
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_invariant() {
        assert!(FrameBuffer::new(2, 2, PixelFormat::Rgba8, vec![0; 16]).is_ok());

        let err = FrameBuffer::new(2, 2, PixelFormat::Rgb8, vec![0; 16]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidFrame {
                expected: 12,
                actual: 16
            }
        );
    }

    #[test]
    fn test_strided_copy_drops_padding() {
        // 3x2 image, rows padded to 4 bytes
        let plane = [1, 2, 3, 0, 4, 5, 6, 0];
        let frame = FrameBuffer::from_strided_gray(&plane, 3, 2, 4).unwrap();

        assert_eq!(frame.format(), PixelFormat::Gray8);
        assert_eq!(frame.pixels(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_strided_copy_rejects_short_plane() {
        let plane = [1, 2, 3, 0, 4];
        assert!(FrameBuffer::from_strided_gray(&plane, 3, 2, 4).is_err());
    }

    #[test]
    fn test_frame_ids_are_unique() {
        let a = FrameBuffer::new(1, 1, PixelFormat::Gray8, vec![0]).unwrap();
        let b = FrameBuffer::new(1, 1, PixelFormat::Gray8, vec![0]).unwrap();
        assert_ne!(a.frame_id(), b.frame_id());
    }

    #[test]
    fn test_from_dynamic_keeps_alpha() {
        let rgba = image::RgbaImage::from_pixel(2, 1, image::Rgba([10, 20, 30, 40]));
        let frame = FrameBuffer::from_dynamic(image::DynamicImage::ImageRgba8(rgba));
        assert_eq!(frame.format(), PixelFormat::Rgba8);
        assert_eq!(frame.pixels().len(), 8);

        let luma = image::GrayImage::from_pixel(2, 1, image::Luma([7]));
        let frame = FrameBuffer::from_dynamic(image::DynamicImage::ImageLuma8(luma));
        assert_eq!(frame.format(), PixelFormat::Gray8);
        assert_eq!(frame.pixels(), &[7, 7]);
    }
}
