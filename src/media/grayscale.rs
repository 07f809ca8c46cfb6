//! Grayscale Normalizer
//!
//! The decoder wants opaque 8-bit luminance. Transparent pixels are
//! composited over white so they read as background, not as ink.

use super::{FrameBuffer, PixelFormat};

/// Bins at each end of the histogram counted as "black" or "white"
const EXTREME_BINS: usize = 10;

/// Share of pixels that must sit in the extreme bins, per channel
const BILEVEL_MASS: f64 = 0.9;

/// ITU-R 601-2 luma, fixed point with rounding
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

/// Blend luminance over an opaque white canvas using alpha as weight
#[inline]
fn over_white(lum: u8, alpha: u8) -> u8 {
    let (l, a) = (lum as u32, alpha as u32);
    ((l * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Convert any supported frame into a GRAY8 frame
pub fn to_grayscale(frame: &FrameBuffer) -> FrameBuffer {
    let pixels: Vec<u8> = match frame.format() {
        PixelFormat::Gray8 => return frame.clone(),
        PixelFormat::Rgb8 => frame
            .pixels()
            .chunks_exact(3)
            .map(|p| luma(p[0], p[1], p[2]))
            .collect(),
        PixelFormat::Rgba8 => frame
            .pixels()
            .chunks_exact(4)
            .map(|p| over_white(luma(p[0], p[1], p[2]), p[3]))
            .collect(),
    };

    FrameBuffer::gray_from_conversion(frame.width(), frame.height(), pixels)
}

/// Grayscale then flip polarity (255 - value), for light-on-dark codes
pub fn invert(frame: &FrameBuffer) -> FrameBuffer {
    let gray = to_grayscale(frame);
    let pixels = gray.pixels().iter().map(|v| 255 - v).collect();
    FrameBuffer::gray_from_conversion(gray.width(), gray.height(), pixels)
}

/// Histogram test: does every color channel keep more than 90% of its
/// pixels in the 10 darkest or 10 brightest bins?
///
/// Alpha is ignored. A gray frame counts its single channel three times.
pub fn is_almost_black_white(frame: &FrameBuffer) -> bool {
    let total = frame.pixel_count();
    if total == 0 {
        return false;
    }

    let channels = frame.format().channels();
    let color_channels = channels.min(3);
    let mut histograms = [[0usize; 256]; 3];
    for px in frame.pixels().chunks_exact(channels) {
        for (c, hist) in histograms.iter_mut().enumerate().take(color_channels) {
            hist[px[c] as usize] += 1;
        }
    }

    histograms[..color_channels].iter().all(|hist| {
        let extreme: usize =
            hist[..EXTREME_BINS].iter().sum::<usize>() + hist[256 - EXTREME_BINS..].iter().sum::<usize>();
        extreme as f64 / total as f64 > BILEVEL_MASS
    })
}
