//! Still Image Sources
//!
//! Files, remote URIs, clipboard contents and command-line arguments all end
//! up here: read the bytes, check that they are an image, decode the
//! container (SVG is rasterized) and hand back one `FrameBuffer`.

use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use super::FrameBuffer;
use crate::error::DecodeError;

/// Extensions accepted for remote images we cannot sniff before fetching
const WELL_KNOWN_IMAGE_EXTS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "tif", "tiff", "ico",
];

const SVG_MIME: &str = "image/svg+xml";

/// Ceiling for a rasterized image, in RGBA bytes (same as `image`'s default limit)
#[cfg(feature = "svg")]
const MAX_DECODED_BYTES: u64 = 512 * 1024 * 1024;

/// Remote fetches give up after this long
const REMOTE_TIMEOUT: Duration = Duration::from_secs(20);

/// Where a still image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    Local(PathBuf),
    Remote(Url),
}

impl ImageLocation {
    /// Interpret a command-line argument, clipboard text or dropped URI.
    /// Plain paths and `file://` URIs are local; `http(s)` URIs are remote.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        match Url::parse(input) {
            Ok(url) if url.scheme() == "file" => url.to_file_path().ok().map(ImageLocation::Local),
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(ImageLocation::Remote(url)),
            // Windows drive letters parse as a one-letter scheme
            Ok(url) if url.scheme().len() > 1 => None,
            _ => Some(ImageLocation::Local(PathBuf::from(input))),
        }
    }
}

impl std::fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageLocation::Local(path) => write!(f, "{}", path.display()),
            ImageLocation::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Raw image bytes plus a content-type guess
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Guess a MIME type from an extension
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => SVG_MIME,
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

/// Guess a MIME type from magic bytes
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type());
    }
    if looks_like_svg(bytes) {
        return Some(SVG_MIME);
    }
    None
}

/// Cheap check that a local file holds a decodable image
fn is_local_real_image(path: &Path) -> bool {
    let Ok(reader) = image::ImageReader::open(path) else {
        return false;
    };
    match reader.with_guessed_format() {
        Ok(reader) if reader.format().is_some() => true,
        _ => std::fs::read(path).map(|b| looks_like_svg(&b)).unwrap_or(false),
    }
}

/// Remote images are judged by their extension only
fn maybe_remote_image(url: &Url) -> bool {
    extension_of(url.path())
        .map(|ext| WELL_KNOWN_IMAGE_EXTS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Pick the first input that is a local image or looks like a remote one
pub fn choose_first_image<S: AsRef<str>>(inputs: &[S]) -> Option<ImageLocation> {
    inputs.iter().find_map(|input| {
        let location = ImageLocation::parse(input.as_ref())?;
        let usable = match &location {
            ImageLocation::Local(path) => is_local_real_image(path),
            ImageLocation::Remote(url) => maybe_remote_image(url),
        };
        if !usable {
            debug!("Skipping {}: not an image", input.as_ref());
        }
        usable.then_some(location)
    })
}

/// Read the bytes behind a location without blocking the runtime
pub async fn read_location(location: &ImageLocation) -> Result<ImageBytes, DecodeError> {
    let read_error = |reason: String| DecodeError::Read {
        location: location.to_string(),
        reason,
    };

    match location {
        ImageLocation::Local(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| read_error(e.to_string()))?;
            // Local data: magic bytes first, extension as a fallback
            let mime = sniff_mime(&bytes)
                .or_else(|| extension_of(&path.to_string_lossy()).and_then(|e| mime_from_extension(&e)))
                .map(str::to_string);
            Ok(ImageBytes { bytes, mime })
        }
        ImageLocation::Remote(url) => {
            info!("Fetching remote image {}", url);
            let client = reqwest::Client::builder()
                .timeout(REMOTE_TIMEOUT)
                .build()
                .map_err(|e| read_error(e.to_string()))?;
            let response = client
                .get(url.clone())
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| read_error(e.to_string()))?;
            let header_mime = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
            let bytes = response
                .bytes()
                .await
                .map_err(|e| read_error(e.to_string()))?
                .to_vec();
            let mime = header_mime.or_else(|| {
                extension_of(url.path())
                    .and_then(|e| mime_from_extension(&e))
                    .map(str::to_string)
            });
            Ok(ImageBytes { bytes, mime })
        }
    }
}

/// Decode image bytes into a frame. `mime` is a hint; when it names a
/// non-image type the data is rejected without decoding.
pub fn decode_image(bytes: &[u8], mime: Option<&str>) -> Result<FrameBuffer, DecodeError> {
    if let Some(mime) = mime {
        if !mime.starts_with("image/") && sniff_mime(bytes).is_none() {
            return Err(DecodeError::NotAnImage(mime.to_string()));
        }
    }

    if mime == Some(SVG_MIME) || looks_like_svg(bytes) {
        return rasterize_svg(bytes);
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| DecodeError::UnreadableImage(e.to_string()))?;
    debug!("Decoded image {}x{} ({:?})", img.width(), img.height(), img.color());
    Ok(FrameBuffer::from_dynamic(img))
}

#[cfg(feature = "svg")]
fn rasterize_svg(bytes: &[u8]) -> Result<FrameBuffer, DecodeError> {
    use resvg::{tiny_skia, usvg};

    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|e| DecodeError::UnreadableImage(format!("svg: {}", e)))?;
    let size = tree.size().to_int_size();
    let needed = u64::from(size.width()) * u64::from(size.height()) * 4;
    if needed > MAX_DECODED_BYTES {
        return Err(DecodeError::UnreadableImage(format!(
            "svg is too large to rasterize: {}x{}",
            size.width(),
            size.height()
        )));
    }
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| DecodeError::UnreadableImage("svg has zero size".to_string()))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    // tiny-skia keeps premultiplied alpha; frames carry straight alpha
    let pixels: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();

    FrameBuffer::new(size.width(), size.height(), super::PixelFormat::Rgba8, pixels)
}

#[cfg(not(feature = "svg"))]
fn rasterize_svg(_bytes: &[u8]) -> Result<FrameBuffer, DecodeError> {
    Err(DecodeError::UnreadableImage(
        "SVG support is not enabled".to_string(),
    ))
}

/// Read and decode an image location
pub async fn load(location: &ImageLocation) -> Result<FrameBuffer, DecodeError> {
    let data = read_location(location).await?;
    info!("MIME type of {}: {:?}", location, data.mime);
    decode_image(&data.bytes, data.mime.as_deref())
}

/// What the clipboard offered
#[derive(Debug)]
pub enum ClipboardImage {
    /// Pixels copied directly
    Frame(FrameBuffer),
    /// Text naming an image file or URI
    Location(ImageLocation),
}

/// Read an image from the system clipboard: pixels first, then a path or
/// URI held as text.
pub fn read_clipboard() -> Result<ClipboardImage, DecodeError> {
    let clipboard_error = |e: arboard::Error| DecodeError::Read {
        location: "clipboard".to_string(),
        reason: e.to_string(),
    };
    let mut clipboard = arboard::Clipboard::new().map_err(clipboard_error)?;

    match clipboard.get_image() {
        Ok(img) => {
            info!("Clipboard image: {}x{}", img.width, img.height);
            let frame = FrameBuffer::new(
                img.width as u32,
                img.height as u32,
                super::PixelFormat::Rgba8,
                img.bytes.into_owned(),
            )?;
            return Ok(ClipboardImage::Frame(frame));
        }
        Err(e) => debug!("No image in clipboard: {}", e),
    }

    let text = clipboard.get_text().map_err(clipboard_error)?;
    let location = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(ImageLocation::parse)
        .ok_or_else(|| DecodeError::NotAnImage("text/plain".to_string()))?;
    Ok(ClipboardImage::Location(location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([0, 0, 0, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("qrscope-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_parse_locations() {
        assert_eq!(
            ImageLocation::parse("/tmp/code.png"),
            Some(ImageLocation::Local(PathBuf::from("/tmp/code.png")))
        );
        assert_eq!(
            ImageLocation::parse("file:///tmp/code.png"),
            Some(ImageLocation::Local(PathBuf::from("/tmp/code.png")))
        );
        assert!(matches!(
            ImageLocation::parse("https://example.com/qr.png"),
            Some(ImageLocation::Remote(_))
        ));
        assert_eq!(ImageLocation::parse("mailto:someone@example.com"), None);
        assert_eq!(ImageLocation::parse("   "), None);
    }

    #[test]
    fn test_remote_extension_check() {
        let url = Url::parse("https://example.com/a/b/QR.PNG?size=2").unwrap();
        assert!(maybe_remote_image(&url));
        let url = Url::parse("https://example.com/page.html").unwrap();
        assert!(!maybe_remote_image(&url));
    }

    #[test]
    fn test_choose_first_image_skips_non_images() {
        let text_file = temp_path("notes.txt");
        let image_file = temp_path("code.png");
        std::fs::write(&text_file, b"hello").unwrap();
        std::fs::write(&image_file, png_bytes()).unwrap();

        let inputs = [
            text_file.to_string_lossy().into_owned(),
            "https://example.com/index.html".to_string(),
            image_file.to_string_lossy().into_owned(),
        ];
        assert_eq!(
            choose_first_image(&inputs),
            Some(ImageLocation::Local(image_file.clone()))
        );

        let remote_first = ["https://example.com/qr.webp", inputs[2].as_str()];
        assert!(matches!(
            choose_first_image(&remote_first),
            Some(ImageLocation::Remote(_))
        ));

        std::fs::remove_file(text_file).ok();
        std::fs::remove_file(image_file).ok();
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(&png_bytes()), Some("image/png"));
        assert_eq!(
            sniff_mime(b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"/>"),
            Some(SVG_MIME)
        );
        assert_eq!(sniff_mime(b"just text"), None);
    }

    #[test]
    fn test_decode_png() {
        let frame = decode_image(&png_bytes(), Some("image/png")).unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert_eq!(frame.format(), super::super::PixelFormat::Rgba8);
    }

    #[test]
    fn test_decode_rejects_non_image_mime() {
        assert_eq!(
            decode_image(b"hello", Some("text/plain")).unwrap_err(),
            DecodeError::NotAnImage("text/plain".to_string())
        );
    }

    #[test]
    fn test_decode_garbage_is_unreadable() {
        assert!(matches!(
            decode_image(&[0x89, b'P', b'N', b'G', 0, 1, 2], None),
            Err(DecodeError::UnreadableImage(_))
        ));
    }

    #[cfg(feature = "svg")]
    #[test]
    fn test_decode_svg() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="6"><rect width="8" height="6" fill="black"/></svg>"#;
        let frame = decode_image(svg, Some(SVG_MIME)).unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert_eq!(&frame.pixels()[..4], &[0, 0, 0, 255]);
    }

    #[cfg(feature = "svg")]
    #[test]
    fn test_oversized_svg_is_rejected() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="200000" height="200000"><rect width="10" height="10"/></svg>"#;
        match decode_image(svg, Some(SVG_MIME)) {
            Err(DecodeError::UnreadableImage(reason)) => assert!(reason.contains("too large")),
            other => panic!("expected an unreadable image, got {:?}", other.map(|f| f.width())),
        }
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let path = temp_path("load.png");
        std::fs::write(&path, png_bytes()).unwrap();

        let frame = load(&ImageLocation::Local(path.clone())).await.unwrap();
        assert_eq!(frame.width(), 4);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load(&ImageLocation::Local(temp_path("missing.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::Read { .. }));
    }
}
