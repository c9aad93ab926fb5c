// src/main.rs
//! Media key tap demo
//!
//! Installs an arbitrated media key tap and prints every key it receives while
//! this process holds the keys. Start a whitelisted player (or a second copy of
//! this demo) and activate it to watch the keys move over.

#![deny(unsafe_op_in_unsafe_fn)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use media_key_tap::{
    ApplicationIdentity, CaptureError, KeyEvent, KeyPressMode, MediaKey, MediaKeyTapDelegate,
    TapConfig,
};

/// Command line interface for the media key tap demo
#[derive(Debug, Parser)]
#[command(
    name = "media-key-tap",
    about = "Intercept macOS media keys while this process is the active media application"
)]
struct Args {
    /// Which key transitions to report (overrides the config file)
    #[arg(long, value_enum)]
    mode: Option<PressModeArg>,

    /// Output format for key events
    #[arg(long, default_value = "human", value_enum)]
    format: OutputFormat,

    /// JSON file with a tap configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Identity announced to other taps (defaults to the bundle identifier)
    #[arg(long)]
    app_id: Option<String>,

    /// Verbosity level for logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PressModeArg {
    KeyDown,
    KeyUp,
    KeyDownAndUp,
}

impl From<PressModeArg> for KeyPressMode {
    fn from(mode: PressModeArg) -> Self {
        match mode {
            PressModeArg::KeyDown => KeyPressMode::KeyDown,
            PressModeArg::KeyUp => KeyPressMode::KeyUp,
            PressModeArg::KeyDownAndUp => KeyPressMode::KeyDownAndUp,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    /// One line per key
    Human,
    /// One JSON object per key
    Json,
}

#[derive(Debug, Serialize)]
struct KeyReport {
    timestamp: DateTime<Utc>,
    key: MediaKey,
    pressed: bool,
    repeat: bool,
}

impl KeyReport {
    fn new(key: MediaKey, event: &KeyEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            key,
            pressed: event.pressed,
            repeat: event.is_repeat,
        }
    }

    fn human(&self) -> String {
        let label = match self.key {
            MediaKey::PlayPause => "Play/pause",
            MediaKey::Previous => "Previous",
            MediaKey::Rewind => "Rewind",
            MediaKey::Next => "Next",
            MediaKey::FastForward => "Fast forward",
        };
        let action = if self.pressed { "pressed" } else { "released" };
        if self.repeat {
            format!("{label} {action} (repeat)")
        } else {
            format!("{label} {action}")
        }
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
struct PrintingDelegate {
    format: OutputFormat,
}

impl MediaKeyTapDelegate for PrintingDelegate {
    fn on_media_key(&self, key: MediaKey, event: KeyEvent) {
        let report = KeyReport::new(key, &event);
        match self.format {
            OutputFormat::Human => println!("{}", report.human()),
            OutputFormat::Json => match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("could not serialize key report: {}", e),
            },
        }
    }

    fn on_active_state_changed(&self, active: bool) {
        if active {
            info!("media keys are routed to this process");
        } else {
            info!("another media application holds the media keys");
        }
    }

    fn on_whitelisted_app_started(&self) {
        debug!("a media application launched; reinstalling the tap");
    }

    fn on_tap_failed(&self, error: &CaptureError) {
        error!("media key tap failed: {}", error);
        #[cfg(target_os = "macos")]
        core_foundation::runloop::CFRunLoop::get_main().stop();
    }
}

fn setup_logging(args: &Args) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(args.verbose > 1)
        .with_thread_ids(args.verbose > 2)
        .init();
}

fn load_config(args: &Args) -> Result<TapConfig> {
    let mut config = match &args.config {
        Some(path) => TapConfig::from_json_file(path)?,
        None => TapConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.press_mode = mode.into();
    }
    if let Some(id) = &args.app_id {
        config.application_id = Some(ApplicationIdentity::new(id.as_str()));
    }
    Ok(config)
}

#[cfg(target_os = "macos")]
async fn run(args: Args, config: TapConfig) -> Result<()> {
    use std::sync::Arc;

    use core_foundation::runloop::{CFRunLoop, CFRunLoopRun};
    use objc2::MainThreadMarker;
    use objc2_app_kit::{NSApplication, NSApplicationActivationPolicy};
    use objc2_foundation::NSAutoreleasePool;

    use media_key_tap::platform::macos::native_services;
    use media_key_tap::MediaKeyTap;

    let mtm = MainThreadMarker::new()
        .context("Must run on the main thread to receive workspace notifications")?;
    let app = NSApplication::sharedApplication(mtm);
    app.setActivationPolicy(NSApplicationActivationPolicy::Prohibited);

    let delegate = Arc::new(PrintingDelegate {
        format: args.format,
    });
    let tap = MediaKeyTap::new(delegate, &config, native_services());
    tap.start().context(
        "Failed to install the media key tap (grant Input Monitoring in System Settings)",
    )?;
    info!(press_mode = ?tap.press_mode(), "Listening for media keys. Press Ctrl+C to stop.");

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            CFRunLoop::get_main().stop();
        }
    });

    // Workspace and distributed notifications plus forwarded keys all arrive on the main run loop
    let _pool = unsafe { NSAutoreleasePool::new() };
    unsafe { CFRunLoopRun() };

    info!(peers = tap.peers().len(), "Shutting down");
    tap.stop();
    Ok(())
}

#[cfg(not(target_os = "macos"))]
async fn run(_args: Args, _config: TapConfig) -> Result<()> {
    Err(anyhow::anyhow!("This application only runs on macOS"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args);

    let config = load_config(&args).context("Failed to load configuration")?;
    debug!(?config, "configuration loaded");

    run(args, config).await.context("Application runtime error")?;
    Ok(())
}
