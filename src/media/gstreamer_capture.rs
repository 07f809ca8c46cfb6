//! GStreamer Camera Capture
//!
//! Builds the webcam graph (V4L2 or PipeWire source), copies GRAY8 frames
//! out of the appsink into the shared `FrameQueue`, and watches the device
//! monitor bus for hot-plug events.

use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use gst::prelude::*;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

use super::capture::{pipeline_description, CaptureBackend, CaptureConfig, PreviewSink, APP_SINK_NAME};
use super::devices::{DeviceEvent, DeviceInfo, DeviceSourceType};
use super::queue::FrameQueue;
use super::FrameBuffer;
use crate::error::{CaptureError, DeviceError, PipelineBuildError};

/// Device monitor class filter
const VIDEO_SOURCE_CLASS: &str = "Video/Source";

/// How often the monitor thread checks for shutdown
const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn init() -> Result<(), PipelineBuildError> {
    gst::init().map_err(|e| PipelineBuildError::Init(e.to_string()))
}

/// Classify a GStreamer device. Returns None for backends we cannot drive
/// (libcamera and friends) or devices without a usable key.
fn device_info(device: &gst::Device) -> Option<DeviceInfo> {
    let props = device.properties()?;
    let api = props.get::<String>("device.api").ok()?;
    let source_type = match DeviceSourceType::from_device_api(&api) {
        Some(t) => t,
        None => {
            debug!("Unsupported device API {} for {}", api, device.display_name());
            return None;
        }
    };

    let key = match source_type {
        DeviceSourceType::V4L2 => props
            .get::<String>("device.path")
            .ok()
            .or_else(|| string_property(device, "device-path")),
        DeviceSourceType::PipeWire => props
            .get::<String>("object.serial")
            .ok()
            .or_else(|| serial_property(device)),
    }?;

    let name = device.display_name().to_string();
    if name.is_empty() || key.is_empty() {
        return None;
    }

    Some(DeviceInfo::new(source_type, key, name))
}

fn string_property(device: &gst::Device, name: &str) -> Option<String> {
    device.find_property(name)?;
    device.property_value(name).get::<String>().ok()
}

fn serial_property(device: &gst::Device) -> Option<String> {
    device.find_property("serial")?;
    let value = device.property_value("serial");
    value
        .get::<u64>()
        .map(|v| v.to_string())
        .or_else(|_| value.get::<i64>().map(|v| v.to_string()))
        .ok()
}

fn new_monitor() -> Result<gst::DeviceMonitor, PipelineBuildError> {
    init()?;
    let monitor = gst::DeviceMonitor::new();
    let caps = gst::Caps::new_empty_simple("video/x-raw");
    monitor.add_filter(Some(VIDEO_SOURCE_CLASS), Some(&caps));
    Ok(monitor)
}

/// One-shot enumeration of the cameras currently present
pub fn enumerate_devices() -> Result<Vec<DeviceInfo>, CaptureError> {
    let monitor = new_monitor()?;
    monitor
        .start()
        .map_err(|e| DeviceError::Unavailable(format!("device monitor: {}", e)))?;

    let devices: Vec<DeviceInfo> = monitor
        .devices()
        .into_iter()
        .filter_map(|d| device_info(&d))
        .collect();
    monitor.stop();

    info!("Found {} camera(s)", devices.len());
    Ok(devices)
}

/// Background watcher turning monitor bus messages into `DeviceEvent`s
pub struct DeviceMonitor {
    monitor: gst::DeviceMonitor,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceMonitor {
    /// Start monitoring. The devices present at start are returned directly;
    /// later changes arrive on `events`.
    pub fn start(
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<(Self, Vec<DeviceInfo>), CaptureError> {
        let monitor = new_monitor()?;
        let bus = monitor.bus();
        monitor
            .start()
            .map_err(|e| DeviceError::Unavailable(format!("device monitor: {}", e)))?;

        let initial: Vec<DeviceInfo> = monitor
            .devices()
            .into_iter()
            .filter_map(|d| device_info(&d))
            .collect();

        // Drop the DeviceAdded messages for devices we already reported
        while bus.pop().is_some() {}

        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let running = running.clone();
            std::thread::Builder::new()
                .name("device-monitor".into())
                .spawn(move || {
                    while running.load(Ordering::Acquire) {
                        let Some(msg) = bus.timed_pop(gst::ClockTime::from_mseconds(
                            MONITOR_POLL_INTERVAL.as_millis() as u64,
                        )) else {
                            continue;
                        };

                        let event = match msg.view() {
                            gst::MessageView::DeviceAdded(m) => {
                                device_info(&m.device()).map(DeviceEvent::Added)
                            }
                            gst::MessageView::DeviceRemoved(m) => {
                                device_info(&m.device()).map(|d| DeviceEvent::Removed(d.path_or_serial))
                            }
                            _ => None,
                        };

                        if let Some(event) = event {
                            debug!("Device event: {:?}", event);
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    debug!("Device monitor thread exiting");
                })
                .map_err(|e| DeviceError::Unavailable(format!("monitor thread: {}", e)))?
        };

        info!("Device monitoring started with {} camera(s)", initial.len());
        Ok((
            Self {
                monitor,
                running,
                thread: Some(thread),
            },
            initial,
        ))
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.monitor.stop();
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Webcam capture through a GStreamer pipeline
pub struct GstCapture {
    config: CaptureConfig,
    frames: Arc<FrameQueue>,
    consuming: Arc<AtomicBool>,
    pipeline: Option<gst::Pipeline>,
    device: Option<String>,
}

impl GstCapture {
    pub fn new(config: CaptureConfig, frames: Arc<FrameQueue>) -> Self {
        Self {
            config,
            frames,
            consuming: Arc::new(AtomicBool::new(false)),
            pipeline: None,
            device: None,
        }
    }

    fn launch(description: &str) -> Result<gst::Pipeline, PipelineBuildError> {
        info!("To build pipeline: {}", description);
        let element = gst::parse::launch(description).map_err(|e| PipelineBuildError::Launch {
            description: description.to_string(),
            reason: e.to_string(),
        })?;
        element
            .downcast::<gst::Pipeline>()
            .map_err(|_| PipelineBuildError::Launch {
                description: description.to_string(),
                reason: "top-level element is not a pipeline".to_string(),
            })
    }

    /// Build the graph, falling back from GPU to software preview
    fn build(&self, device: &DeviceInfo) -> Result<gst::Pipeline, PipelineBuildError> {
        if !self.config.preview {
            return Self::launch(&pipeline_description(device, &self.config, None));
        }

        let mut last_error = None;
        for sink in PreviewSink::FALLBACK_ORDER {
            match Self::launch(&pipeline_description(device, &self.config, Some(sink))) {
                Ok(pipeline) => return Ok(pipeline),
                Err(e) => {
                    warn!("Preview sink {} unusable: {}", sink.element_name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(PipelineBuildError::MissingElement("preview sink")))
    }

    fn attach_appsink(&self, pipeline: &gst::Pipeline) -> Result<(), PipelineBuildError> {
        let appsink = pipeline
            .by_name(APP_SINK_NAME)
            .and_then(|e| e.downcast::<gst_app::AppSink>().ok())
            .ok_or(PipelineBuildError::MissingElement(APP_SINK_NAME))?;

        let frames = self.frames.clone();
        let consuming = self.consuming.clone();
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    if !consuming.load(Ordering::Acquire) {
                        return Ok(gst::FlowSuccess::Ok);
                    }

                    let Some(caps) = sample.caps() else {
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    let video_info = gst_video::VideoInfo::from_caps(caps).map_err(|_| {
                        error!("Failed to read video info from caps");
                        gst::FlowError::Error
                    })?;
                    let Some(buffer) = sample.buffer() else {
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    let map = buffer.map_readable().map_err(|_| {
                        error!("Failed to map appsink buffer");
                        gst::FlowError::Error
                    })?;

                    let stride = video_info.stride()[0].max(0) as u32;
                    match FrameBuffer::from_strided_gray(
                        map.as_slice(),
                        video_info.width(),
                        video_info.height(),
                        stride,
                    ) {
                        Ok(frame) => {
                            frames.push(frame);
                        }
                        Err(e) => warn!("Dropping malformed frame: {}", e),
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
        Ok(())
    }
}

impl CaptureBackend for GstCapture {
    fn open(&mut self, device: &DeviceInfo) -> Result<(), CaptureError> {
        self.stop();
        init()?;

        let pipeline = self.build(device)?;
        self.attach_appsink(&pipeline)?;
        self.pipeline = Some(pipeline);
        self.device = Some(device.path_or_serial.clone());
        info!("Capture graph ready for {}", device.display_name);
        Ok(())
    }

    fn play(&mut self) -> Result<(), CaptureError> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| DeviceError::Unavailable("no capture graph".to_string()))?;

        info!("Playing webcam");
        pipeline.set_state(gst::State::Playing).map_err(|e| {
            PipelineBuildError::StateChange(format!(
                "{}: {}",
                self.device.as_deref().unwrap_or("camera"),
                e
            ))
        })?;
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            debug!("Pausing webcam");
            if let Err(e) = pipeline.set_state(gst::State::Paused) {
                warn!("Failed to pause pipeline: {}", e);
            }
        }
    }

    fn stop(&mut self) {
        self.consuming.store(false, Ordering::Release);
        if let Some(pipeline) = self.pipeline.take() {
            info!("Stopping webcam");
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                warn!("Failed to stop pipeline: {}", e);
            }
        }
        self.device = None;
        self.frames.clear();
    }

    fn set_consuming(&mut self, enabled: bool) {
        self.consuming.store(enabled, Ordering::Release);
        if !enabled {
            self.frames.clear();
        }
    }

    fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }

    fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

impl Drop for GstCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_play_is_a_state_change_error() {
        if init().is_err() {
            return;
        }
        let mut capture = GstCapture::new(CaptureConfig::default(), Arc::new(FrameQueue::default()));
        capture.pipeline = Some(
            GstCapture::launch("filesrc location=/nonexistent/qrscope.yuv ! fakesink").unwrap(),
        );
        capture.device = Some("/dev/video9".to_string());

        match capture.play() {
            Err(CaptureError::Pipeline(PipelineBuildError::StateChange(reason))) => {
                assert!(reason.starts_with("/dev/video9"));
            }
            other => panic!("unexpected play outcome: {:?}", other),
        }
        capture.stop();
        assert!(!capture.is_open());
    }

    #[test]
    fn test_play_without_graph_is_unavailable() {
        let mut capture = GstCapture::new(CaptureConfig::default(), Arc::new(FrameQueue::default()));
        assert!(matches!(
            capture.play(),
            Err(CaptureError::Device(DeviceError::Unavailable(_)))
        ));
    }
}
