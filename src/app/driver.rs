//! Session Driver
//!
//! Async event loop around a `ScanSession`. It waits on caller commands,
//! camera hot-plug events, webcam frames and finished background work, and
//! hands each one to the session on a single task, so the decoder is never
//! shared between threads. Image fetches and connection manager calls run
//! on their own tasks and report back here.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::{ScanSource, SessionCommand};
use super::ScanSession;
use crate::error::DecodeError;
use crate::media::{still, DeviceEvent, FrameBuffer, FrameQueue};
use crate::net::{self, NetworkReply};

/// Background work finished
enum Completion {
    /// A still image finished loading; `load_id` tells stale loads apart
    Image {
        load_id: u64,
        frame: Result<FrameBuffer, DecodeError>,
    },
    Network(NetworkReply),
}

/// Cloneable command sender for a running driver
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Queue a command. Returns false once the driver has stopped.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn select_source(&self, source: ScanSource) -> bool {
        self.send(SessionCommand::SelectSource(source))
    }

    pub fn resume(&self) -> bool {
        self.send(SessionCommand::Resume)
    }

    pub fn shutdown(&self) -> bool {
        self.send(SessionCommand::Shutdown)
    }
}

pub struct SessionDriver {
    session: ScanSession,
    frames: Arc<FrameQueue>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    device_events: Option<mpsc::UnboundedReceiver<DeviceEvent>>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    /// Still image being read, if any
    loading: Option<(u64, JoinHandle<()>)>,
    next_load_id: u64,
}

impl SessionDriver {
    /// `frames` must be the queue the session's capture backend pushes into
    pub fn new(session: ScanSession, frames: Arc<FrameQueue>) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        (
            Self {
                session,
                frames,
                commands: rx,
                device_events: None,
                completions_tx,
                completions,
                loading: None,
                next_load_id: 0,
            },
            SessionHandle { commands: tx },
        )
    }

    /// Feed hot-plug events from a device monitor
    pub fn with_device_events(mut self, events: mpsc::UnboundedReceiver<DeviceEvent>) -> Self {
        self.device_events = Some(events);
        self
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Run until `Shutdown` or until every handle is dropped. Returns the
    /// session so callers can inspect its final state.
    pub async fn run(mut self) -> ScanSession {
        info!("Session driver started");
        loop {
            tokio::select! {
                // Commands first: a reset must win over a frame already queued
                biased;

                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = next_device_event(&mut self.device_events) => {
                    self.handle_device_event(event);
                }
                Some(done) = self.completions.recv() => self.handle_completion(done),
                frame = self.frames.pop() => {
                    self.session.on_frame(&frame);
                }
            }
            self.dispatch_network();
        }
        self.cancel_load();
        info!("Session driver stopped");
        self.session
    }

    fn handle_command(&mut self, command: SessionCommand) {
        debug!("Session command: {:?}", command);
        if matches!(
            command,
            SessionCommand::SelectSource(_)
                | SessionCommand::SelectDevice(_)
                | SessionCommand::Reset
                | SessionCommand::ScanImage(_)
                | SessionCommand::ScanFrame(_)
        ) {
            self.cancel_load();
        }
        match command {
            SessionCommand::SelectSource(source) => {
                if let Err(e) = self.session.select_source(source) {
                    warn!("Cannot switch to {:?}: {}", source, e);
                }
            }
            SessionCommand::SelectDevice(key) => {
                if let Err(e) = self.session.select_device(&key) {
                    warn!("Cannot use camera {}: {}", key, e);
                }
            }
            SessionCommand::Pause => self.session.pause(),
            SessionCommand::Resume => {
                if let Err(e) = self.session.resume() {
                    warn!("Cannot resume: {}", e);
                }
            }
            SessionCommand::Reset => self.session.reset(),
            SessionCommand::ScanImage(location) => {
                self.session.begin_still();
                self.next_load_id += 1;
                let load_id = self.next_load_id;
                let done = self.completions_tx.clone();
                let task = tokio::spawn(async move {
                    let frame = still::load(&location).await;
                    let _ = done.send(Completion::Image { load_id, frame });
                });
                self.loading = Some((load_id, task));
            }
            SessionCommand::ScanFrame(frame) => {
                self.session.scan_still(&frame);
            }
            SessionCommand::ConnectWifi => {
                // Failure is already reported as a session event
                let _ = self.session.connect_wifi();
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn cancel_load(&mut self) {
        if let Some((load_id, task)) = self.loading.take() {
            debug!("Abandoning image load {}", load_id);
            task.abort();
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Image { load_id, frame } => {
                match &self.loading {
                    Some((current, _)) if *current == load_id => self.loading = None,
                    _ => {
                        debug!("Dropping stale image load {}", load_id);
                        return;
                    }
                }
                match frame {
                    Ok(frame) => {
                        self.session.scan_still(&frame);
                    }
                    Err(e) => self.session.report_decode_error(e),
                }
            }
            Completion::Network(reply) => self.session.on_network_reply(reply),
        }
    }

    /// Start whatever connection manager work the session queued
    fn dispatch_network(&mut self) {
        let requests = self.session.take_network_requests();
        let Some(network) = self.session.network() else {
            return;
        };
        for request in requests {
            let network = network.clone();
            let done = self.completions_tx.clone();
            tokio::spawn(async move {
                let reply = net::execute(network, request).await;
                let _ = done.send(Completion::Network(reply));
            });
        }
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Added(device) => self.session.device_added(device),
            DeviceEvent::Removed(key) => self.session.device_removed(&key),
        }
    }
}

async fn next_device_event(
    events: &mut Option<mpsc::UnboundedReceiver<DeviceEvent>>,
) -> Option<DeviceEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
