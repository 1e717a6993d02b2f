#[macro_use]
pub mod logging;

pub mod checksums;
pub mod cli;
pub mod direction;
pub mod display;
pub mod error;
pub mod event;
pub mod io;
pub mod queue;
pub mod session;
pub mod settings;
pub mod sink;
pub mod stats;
pub mod supervisor;
pub mod writer;

pub use direction::{build_classifier, DirectionClassifier, DirectionLabel};
pub use error::{LinkError, SinkError, TapError};
pub use event::{Event, EventKind};
pub use io::serial::{Frame, FrameAssembler, LinkOpener, SerialLink};
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub use io::serial::SystemPorts;
pub use settings::{DetectionConfig, DetectionMode, PortConfig, TapSettings};
pub use sink::{EventSink, FileSink, MemorySink};
pub use stats::Statistics;
pub use supervisor::Supervisor;

use chrono::Local;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use cli::Cli;
use display::ConsoleDisplay;

/// How long the runtime waits for reader threads after the supervisor has
/// given up on them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

// ============================================================================
// Entry Point
// ============================================================================

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
pub fn run() -> ExitCode {
    let _ = Cli::parse();
    eprintln!("Error: serial ports are not supported on this platform");
    ExitCode::FAILURE
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if cli.list {
        return list_ports(cli.json);
    }

    if let Some(dir) = cli.diag_log_dir() {
        if let Err(e) = logging::init_file_logging(&dir) {
            eprintln!("Warning: {}", e);
        }
    }

    let settings = match cli.to_settings(Local::now()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --list to see available ports, -h for help");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let show_direction = settings.detection.mode != DetectionMode::None;
    let log_file = settings.log_file.clone();
    let result = runtime.block_on(tap(settings, cli.quiet, cli.keep_awake));
    // A reader stuck in a driver call must not hold the process open
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    let code = match result {
        Ok(stats) => {
            println!("{}", stats.render(show_direction));
            if let Some(path) = log_file {
                println!("Log saved to: {}", path);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    };
    logging::stop_file_logging();
    code
}

/// Run until Ctrl-C, then stop gracefully and hand back the statistics.
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
async fn tap(settings: TapSettings, quiet: bool, keep_awake: bool) -> Result<Statistics, TapError> {
    let show_direction = settings.detection.mode != DetectionMode::None;
    let strategy = format!("{:?}", settings.detection.mode).to_lowercase();
    match io::serial::list_serial_ports() {
        Ok(ports) => println!("{}\n", display::available_ports(&ports)),
        Err(e) => tlog!("[main] {}", e),
    }
    println!(
        "{}",
        display::banner(&settings.ports, &strategy, settings.log_file.as_deref())
    );
    if show_direction && !quiet {
        println!("{}", display::direction_legend());
    }

    let sink = settings
        .log_file
        .as_ref()
        .map(|path| Box::new(FileSink::new(path)) as Box<dyn EventSink>);
    let display = if quiet {
        None
    } else {
        Some(ConsoleDisplay::new(
            &settings.ports,
            settings.display_mode,
            show_direction,
        ))
    };

    let _wake_lock = if keep_awake { acquire_wake_lock() } else { None };

    let supervisor = Supervisor::start(settings, Arc::new(SystemPorts), sink, display).await?;
    tokio::signal::ctrl_c().await?;
    println!();
    tlog!("[main] Interrupted, stopping");
    Ok(supervisor.stop().await)
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
fn acquire_wake_lock() -> Option<keepawake::KeepAwake> {
    match keepawake::Builder::default()
        .idle(true)
        .display(false)
        .reason("serialtap capture running")
        .app_name("serialtap")
        .app_reverse_domain("io.serialtap")
        .create()
    {
        Ok(lock) => {
            tlog!("[wake] Acquired wake lock");
            Some(lock)
        }
        Err(e) => {
            tlog!("[wake] Failed to acquire wake lock: {:?}", e);
            None
        }
    }
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
fn list_ports(json: bool) -> ExitCode {
    let ports = match io::serial::list_serial_ports() {
        Ok(ports) => ports,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&ports) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", display::available_ports(&ports));
    }
    ExitCode::SUCCESS
}
