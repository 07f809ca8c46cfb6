//! Capture Backend
//!
//! The seam between the session controller and whatever produces camera
//! frames. The GStreamer implementation lives in `gstreamer_capture`; tests
//! and camera-less builds use their own implementations.

use crate::error::{CaptureError, DeviceError};

use super::devices::DeviceInfo;

/// Name of the camera source element in the capture graph
pub const SOURCE_ELEMENT_NAME: &str = "webcam_source";
/// Name of the mirroring element
pub const FLIP_ELEMENT_NAME: &str = "videoflip";
/// Name of the appsink that hands GRAY8 frames to the decoder
pub const APP_SINK_NAME: &str = "app_sink";

/// Local preview window sink, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewSink {
    /// GPU accelerated
    Gl,
    /// Plain X11 software rendering
    Software,
}

impl PreviewSink {
    /// Fallback order when building a graph with preview
    pub const FALLBACK_ORDER: [PreviewSink; 2] = [PreviewSink::Gl, PreviewSink::Software];

    pub fn element_name(&self) -> &'static str {
        match self {
            PreviewSink::Gl => "glimagesink",
            PreviewSink::Software => "ximagesink",
        }
    }
}

/// How the capture graph is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Flip the picture horizontally (selfie view)
    pub mirror: bool,
    /// Show a local preview window next to the decode branch
    pub preview: bool,
    /// Depth of the leaky queue in front of the appsink
    pub max_buffers: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mirror: false,
            preview: true,
            max_buffers: super::queue::FRAME_QUEUE_DEPTH as u32,
        }
    }
}

/// Build a `gst-launch` style description of the capture graph.
///
/// The decode branch always ends in a GRAY8 appsink behind a leaky queue that
/// drops old buffers, so the decoder only sees recent frames.
pub fn pipeline_description(
    device: &DeviceInfo,
    config: &CaptureConfig,
    preview: Option<PreviewSink>,
) -> String {
    let source = format!(
        "{} name={} {}={}",
        device.source_type.element_name(),
        SOURCE_ELEMENT_NAME,
        device.source_type.selector_property(),
        quote_value(&device.path_or_serial),
    );
    let flip = format!(
        "videoflip name={} method={}",
        FLIP_ELEMENT_NAME,
        if config.mirror { "horizontal-flip" } else { "none" }
    );
    let decode_branch = format!(
        "queue leaky=downstream max-size-buffers={n} ! videoconvert ! video/x-raw,format=GRAY8 ! \
         appsink name={sink} max-buffers={n} drop=true sync=false",
        n = config.max_buffers.max(1),
        sink = APP_SINK_NAME,
    );

    match preview {
        Some(sink) => format!(
            "{source} ! {flip} ! videoconvert ! tee name=t ! queue ! videoconvert ! {} sync=false t. ! {decode_branch}",
            sink.element_name()
        ),
        None => format!("{source} ! {flip} ! {decode_branch}"),
    }
}

/// Quote a property value when it contains characters the launch parser splits on
fn quote_value(value: &str) -> String {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-:".contains(c))
    {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// A camera capture graph the session controller can drive.
///
/// `open` tears down any previous graph. Frames are delivered out of band
/// (into a `FrameQueue`) and only while consumption is enabled.
pub trait CaptureBackend: Send {
    /// Build the capture graph for `device`
    fn open(&mut self, device: &DeviceInfo) -> Result<(), CaptureError>;

    /// Start or resume the stream
    fn play(&mut self) -> Result<(), CaptureError>;

    /// Pause the stream, keeping the graph
    fn pause(&mut self);

    /// Tear the graph down
    fn stop(&mut self);

    /// Enable or disable frame delivery to the decoder
    fn set_consuming(&mut self, enabled: bool);

    /// Whether a graph is currently built
    fn is_open(&self) -> bool;

    /// Path or serial of the device the graph was built for
    fn device(&self) -> Option<&str>;
}

/// Backend for builds without camera support: every open fails
#[derive(Debug, Default)]
pub struct NullCapture;

impl CaptureBackend for NullCapture {
    fn open(&mut self, device: &DeviceInfo) -> Result<(), CaptureError> {
        Err(DeviceError::Unavailable(format!(
            "{} (built without camera support)",
            device.display_name
        ))
        .into())
    }

    fn play(&mut self) -> Result<(), CaptureError> {
        Err(DeviceError::Unavailable("no capture graph".to_string()).into())
    }

    fn pause(&mut self) {}

    fn stop(&mut self) {}

    fn set_consuming(&mut self, _enabled: bool) {}

    fn is_open(&self) -> bool {
        false
    }

    fn device(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::devices::DeviceSourceType;

    #[test]
    fn test_v4l2_description_without_preview() {
        let device = DeviceInfo::new(DeviceSourceType::V4L2, "/dev/video0", "Webcam");
        let desc = pipeline_description(&device, &CaptureConfig::default(), None);

        assert_eq!(
            desc,
            "v4l2src name=webcam_source device=/dev/video0 ! videoflip name=videoflip method=none ! \
             queue leaky=downstream max-size-buffers=2 ! videoconvert ! video/x-raw,format=GRAY8 ! \
             appsink name=app_sink max-buffers=2 drop=true sync=false"
        );
    }

    #[test]
    fn test_pipewire_description_with_preview_and_mirror() {
        let device = DeviceInfo::new(DeviceSourceType::PipeWire, "93", "Integrated Camera");
        let config = CaptureConfig {
            mirror: true,
            ..Default::default()
        };
        let desc = pipeline_description(&device, &config, Some(PreviewSink::Gl));

        assert!(desc.starts_with("pipewiresrc name=webcam_source target-object=93 ! "));
        assert!(desc.contains("method=horizontal-flip"));
        assert!(desc.contains("tee name=t"));
        assert!(desc.contains("glimagesink"));
        assert!(desc.ends_with("appsink name=app_sink max-buffers=2 drop=true sync=false"));
    }

    #[test]
    fn test_odd_paths_are_quoted() {
        let device = DeviceInfo::new(DeviceSourceType::V4L2, "/dev/v4l/by-id/usb cam", "Cam");
        let desc = pipeline_description(&device, &CaptureConfig::default(), None);
        assert!(desc.contains("device=\"/dev/v4l/by-id/usb cam\""));
    }

    #[test]
    fn test_null_capture_reports_unavailable() {
        let mut capture = NullCapture;
        let device = DeviceInfo::new(DeviceSourceType::V4L2, "/dev/video0", "Webcam");
        assert!(matches!(
            capture.open(&device),
            Err(CaptureError::Device(DeviceError::Unavailable(_)))
        ));
        assert!(!capture.is_open());
    }
}
