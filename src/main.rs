//! qrscope - QR code scanner and generator
//!
//! Scans QR codes and barcodes from image files, URIs, the clipboard or a
//! webcam, and generates QR codes for text and Wi-Fi networks.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use image::GrayImage;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use qrscope::app::{ScanSession, Settings, SessionEvent};
use qrscope::media::{self, still, ImageLocation, NullCapture};
use qrscope::net::{NmcliNetworks, WifiNetworks};
use qrscope::scanner::generator::{copy_to_clipboard, save_png};
use qrscope::scanner::{
    AuthType, BarcodeScanner, DecodedSymbol, QrGenerator, ScanResult, WifiInfo,
};

#[derive(Parser)]
#[command(name = "qrscope")]
#[command(version)]
#[command(about = "Scan QR codes and barcodes, generate QR codes", long_about = None)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log through tracing-subscriber instead of env_logger
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the first usable image among files and URIs
    Scan {
        /// Image files, file:// or http(s):// URIs
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Join the network when a Wi-Fi code is found
        #[arg(long)]
        connect: bool,
    },

    /// Scan an image (or an image path/URI) from the clipboard
    Paste {
        /// Join the network when a Wi-Fi code is found
        #[arg(long)]
        connect: bool,
    },

    /// Scan from a webcam
    Webcam(WebcamArgs),

    /// List cameras
    Devices,

    /// Generate a QR code for text
    Generate {
        text: String,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Generate a Wi-Fi join QR code
    Wifi {
        #[arg(long)]
        ssid: String,

        #[arg(long)]
        password: Option<String>,

        #[arg(long, value_enum, default_value_t = AuthArg::Wpa)]
        auth: AuthArg,

        /// The network does not broadcast its SSID
        #[arg(long)]
        hidden: bool,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// List saved Wi-Fi networks, or generate a QR code for one
    SavedWifi {
        /// Profile name or SSID
        name: Option<String>,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Show or change persistent settings
    Settings(SettingsArgs),
}

#[derive(Args)]
struct WebcamArgs {
    /// Camera path (V4L2) or serial (PipeWire)
    #[arg(long)]
    device: Option<String>,

    /// Flip the image horizontally
    #[arg(long)]
    mirror: bool,

    /// Do not open a preview window
    #[arg(long)]
    no_preview: bool,

    /// Keep scanning after each result
    #[arg(long)]
    continuous: bool,

    /// Join the network when a Wi-Fi code is found
    #[arg(long)]
    connect: bool,
}

#[derive(Args)]
struct ExportArgs {
    /// Write a PNG file (a directory gets a timestamped name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Copy the image to the clipboard
    #[arg(long)]
    copy: bool,

    /// Quiet zone in modules
    #[arg(long)]
    border: Option<u32>,

    /// Pixels per module
    #[arg(long)]
    module_size: Option<u32>,
}

#[derive(Args)]
struct SettingsArgs {
    #[arg(long)]
    mirror: Option<bool>,

    #[arg(long)]
    preview: Option<bool>,

    /// Preferred camera path or serial ("" to clear)
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    invert_retry: Option<bool>,

    #[arg(long)]
    border: Option<u32>,

    #[arg(long)]
    module_size: Option<u32>,

    #[arg(long)]
    log_filter: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum AuthArg {
    Nopass,
    Wep,
    Wpa,
    Wpa2,
    Wpa2Eap,
}

impl AuthArg {
    fn auth_type(self) -> Option<AuthType> {
        match self {
            AuthArg::Nopass => None,
            AuthArg::Wep => Some(AuthType::Wep),
            AuthArg::Wpa => Some(AuthType::Wpa),
            AuthArg::Wpa2 => Some(AuthType::Wpa2),
            AuthArg::Wpa2Eap => Some(AuthType::Wpa2Eap),
        }
    }
}

fn init_logging(trace: bool, default_filter: &str) {
    if trace {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Settings::load();
    let settings = loaded.as_ref().cloned().unwrap_or_default();
    init_logging(cli.trace, &settings.log_filter);

    info!("qrscope v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = &loaded {
        warn!("Failed to load settings, using defaults: {}", e);
    }

    // Create tokio runtime for async operations
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(cli, settings))
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Command::Scan { inputs, connect } => {
            let location = media::choose_first_image(&inputs)
                .ok_or_else(|| anyhow!("none of the inputs is a readable image"))?;
            info!("Scanning {}", location);
            scan_location(location, &settings, connect, json).await
        }
        Command::Paste { connect } => match still::read_clipboard()? {
            still::ClipboardImage::Frame(frame) => {
                let (mut session, mut events) = still_session(&settings);
                session.scan_still(&frame);
                finish_still(&mut session, &mut events, connect, json).await
            }
            still::ClipboardImage::Location(location) => {
                info!("Clipboard names {}", location);
                scan_location(location, &settings, connect, json).await
            }
        },
        Command::Webcam(args) => webcam::run(args, &settings, json).await,
        Command::Devices => webcam::list_devices(json),
        Command::Generate { text, export } => {
            let generator = generator_for(&settings, &export);
            let image = generator.generate(&text)?;
            export_image(&generator, &text, &image, &export)
        }
        Command::Wifi {
            ssid,
            password,
            auth,
            hidden,
            export,
        } => {
            let mut info = WifiInfo::new(ssid, auth.auth_type(), password);
            info.hidden = hidden;
            if !info.is_open() && info.password.is_none() {
                warn!("No password given for a secured network");
            }
            let text = qrscope::scanner::serialize_wifi_message(&info);
            let generator = generator_for(&settings, &export);
            let image = generator.generate(&text)?;
            export_image(&generator, &text, &image, &export)
        }
        Command::SavedWifi { name, export } => saved_wifi(name, &export, &settings, json),
        Command::Settings(args) => update_settings(settings, args),
    }
}

fn still_session(settings: &Settings) -> (ScanSession, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = ScanSession::new(Box::new(BarcodeScanner::new()), Box::new(NullCapture), tx)
        .with_network(Arc::new(NmcliNetworks::new()))
        .with_invert_retry(settings.invert_retry);
    (session, rx)
}

async fn scan_location(
    location: ImageLocation,
    settings: &Settings,
    connect: bool,
    json: bool,
) -> Result<()> {
    let (mut session, mut events) = still_session(settings);
    session.begin_still();
    match still::load(&location).await {
        Ok(frame) => {
            session.scan_still(&frame);
        }
        Err(e) => session.report_decode_error(e),
    }
    finish_still(&mut session, &mut events, connect, json).await
}

async fn finish_still(
    session: &mut ScanSession,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    connect: bool,
    json: bool,
) -> Result<()> {
    // Fills in whether a scanned network is the active one
    session.settle_network().await?;

    let mut symbol = None;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Decoded(s) => symbol = Some(s),
            SessionEvent::DecodeFailed(e) => return Err(e.into()),
            _ => {}
        }
    }

    let result = session.result().clone();
    if result.is_none() {
        bail!("No QR code or barcode found");
    }
    print_result(symbol.as_ref(), &result, json)?;

    if connect && matches!(result, ScanResult::Wifi(_)) {
        session.connect_wifi()?;
        session.settle_network().await?;
        println!("Connected.");
    }
    Ok(())
}

fn print_result(symbol: Option<&DecodedSymbol>, result: &ScanResult, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({ "symbol": symbol, "result": result });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match result {
        ScanResult::None => println!("No QR code or barcode found"),
        ScanResult::Url { full, .. } => println!("URL: {}", full),
        ScanResult::Wifi(info) => {
            println!("Wi-Fi network: {}", info.ssid);
            println!("Security: {}", info.auth_str());
            if let Some(password) = &info.password {
                println!("Password: {}", password);
            }
            if info.hidden {
                println!("Hidden: yes");
            }
            if info.connected {
                println!("(currently connected)");
            }
        }
        ScanResult::Text { raw } => println!("{}", raw),
    }
    Ok(())
}

fn generator_for(settings: &Settings, export: &ExportArgs) -> QrGenerator {
    let mut generator = settings.generator();
    if let Some(border) = export.border {
        generator = generator.with_border(border);
    }
    if let Some(size) = export.module_size {
        generator = generator.with_module_size(size);
    }
    generator
}

fn export_image(
    generator: &QrGenerator,
    text: &str,
    image: &GrayImage,
    export: &ExportArgs,
) -> Result<()> {
    if let Some(target) = &export.output {
        let path = save_png(image, target)?;
        println!("Saved {}", path.display());
    }
    if export.copy {
        copy_to_clipboard(image)?;
        println!("Copied to clipboard");
    }
    if export.output.is_none() && !export.copy {
        print!("{}", generator.to_terminal(text)?);
        println!();
    }
    Ok(())
}

fn saved_wifi(name: Option<String>, export: &ExportArgs, settings: &Settings, json: bool) -> Result<()> {
    let networks = NmcliNetworks::new()
        .saved_networks()
        .context("listing saved Wi-Fi networks")?;

    let Some(name) = name else {
        if json {
            let names: Vec<_> = networks.iter().map(|n| (&n.name, &n.ssid)).collect();
            println!("{}", serde_json::to_string_pretty(&names)?);
        } else {
            for network in &networks {
                println!("{}\t{}", network.name, network.ssid);
            }
        }
        return Ok(());
    };

    let network = networks
        .iter()
        .find(|n| n.name == name)
        .or_else(|| networks.iter().find(|n| n.ssid == name))
        .ok_or_else(|| anyhow!("no saved Wi-Fi network named {}", name))?;

    let text = qrscope::scanner::serialize_wifi_message(&network.to_wifi_info());
    let generator = generator_for(settings, export);
    let image = generator.generate(&text)?;
    export_image(&generator, &text, &image, export)
}

fn update_settings(mut settings: Settings, args: SettingsArgs) -> Result<()> {
    let before = settings.clone();
    if let Some(v) = args.mirror {
        settings.mirror = v;
    }
    if let Some(v) = args.preview {
        settings.preview = v;
    }
    if let Some(v) = args.device {
        settings.preferred_device = (!v.is_empty()).then_some(v);
    }
    if let Some(v) = args.invert_retry {
        settings.invert_retry = v;
    }
    if let Some(v) = args.border {
        settings.qr_border = v;
    }
    if let Some(v) = args.module_size {
        settings.qr_module_size = v.max(1);
    }
    if let Some(v) = args.log_filter {
        settings.log_filter = v;
    }

    if settings != before {
        settings.save()?;
        info!("Settings saved");
    }
    if let Some(path) = Settings::file_path() {
        eprintln!("{}", path.display());
    }
    println!("{}", settings.to_json()?);
    Ok(())
}

#[cfg(feature = "camera")]
mod webcam {
    use anyhow::{anyhow, Result};
    use log::{info, warn};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use qrscope::app::{ScanSession, SessionCommand, SessionDriver, SessionEvent, Settings};
    use qrscope::media::{self, CaptureConfig, DeviceMonitor, FrameQueue, GstCapture};
    use qrscope::net::NmcliNetworks;
    use qrscope::scanner::{BarcodeScanner, ScanResult};

    use super::{print_result, WebcamArgs};

    pub fn list_devices(json: bool) -> Result<()> {
        let devices = media::enumerate_devices()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&devices)?);
        } else if devices.is_empty() {
            println!("No camera found");
        } else {
            for device in devices {
                println!(
                    "{:?}\t{}\t{}",
                    device.source_type, device.path_or_serial, device.display_name
                );
            }
        }
        Ok(())
    }

    pub async fn run(args: WebcamArgs, settings: &Settings, json: bool) -> Result<()> {
        let frames = Arc::new(FrameQueue::default());
        let config = CaptureConfig {
            mirror: args.mirror || settings.mirror,
            preview: settings.preview && !args.no_preview,
            ..Default::default()
        };

        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (_monitor, devices) = DeviceMonitor::start(device_tx)?;

        let (tx, mut events) = mpsc::unbounded_channel();
        let mut session = ScanSession::new(
            Box::new(BarcodeScanner::new()),
            Box::new(GstCapture::new(config, frames.clone())),
            tx,
        )
        .with_network(Arc::new(NmcliNetworks::new()))
        .with_invert_retry(settings.invert_retry);
        session.set_devices(devices);

        let (driver, handle) = SessionDriver::new(session, frames);
        let task = tokio::spawn(driver.with_device_events(device_rx).run());

        match args.device.or_else(|| settings.preferred_device.clone()) {
            Some(device) => handle.send(SessionCommand::SelectDevice(device)),
            None => handle.select_source(qrscope::app::ScanSource::Webcam),
        };

        let mut outcome = Ok(());
        let mut last_symbol = None;
        let mut connecting = false;
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        SessionEvent::Decoded(symbol) => last_symbol = Some(symbol),
                        SessionEvent::Result(result) if !result.is_none() => {
                            print_result(last_symbol.take().as_ref(), &result, json)?;
                            if args.connect && matches!(result, ScanResult::Wifi(_)) {
                                connecting = true;
                                handle.send(SessionCommand::ConnectWifi);
                            } else if args.continuous {
                                handle.resume();
                            } else {
                                break;
                            }
                        }
                        SessionEvent::WifiConnectivity { ssid, connected } => {
                            if connected && !json {
                                println!("Already connected to {}", ssid);
                            }
                        }
                        SessionEvent::WifiConnected(ssid) => {
                            println!("Connected to {}", ssid);
                            connecting = false;
                            if !args.continuous {
                                break;
                            }
                            handle.resume();
                        }
                        SessionEvent::WifiConnectFailed(e) => {
                            warn!("Could not join network: {}", e);
                            connecting = false;
                            if !args.continuous {
                                outcome = Err(e.into());
                                break;
                            }
                            handle.resume();
                        }
                        SessionEvent::CaptureFailed(e) => {
                            outcome = Err(anyhow!(e));
                            break;
                        }
                        SessionEvent::DevicesChanged(list) => {
                            info!("{} camera(s) available", list.len());
                        }
                        SessionEvent::StateChanged(state) => info!("State: {:?}", state),
                        _ => {}
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    if connecting {
                        warn!("Interrupted while joining a network");
                    }
                    break;
                }
            }
        }

        handle.shutdown();
        if let Err(e) = task.await {
            warn!("Session driver ended abnormally: {}", e);
        }
        outcome
    }
}

#[cfg(not(feature = "camera"))]
mod webcam {
    use anyhow::{bail, Result};

    use qrscope::app::Settings;

    use super::WebcamArgs;

    const NO_CAMERA: &str = "built without camera support; rebuild with `--features camera`";

    pub fn list_devices(_json: bool) -> Result<()> {
        bail!(NO_CAMERA)
    }

    pub async fn run(_args: WebcamArgs, _settings: &Settings, _json: bool) -> Result<()> {
        bail!(NO_CAMERA)
    }
}
