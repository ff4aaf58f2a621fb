//! `volumetra` – measure a sphere's volume from a live camera feed.
//!
//! 1. Loads `~/.volumetra/config.toml`, running first-run setup when it is
//!    absent.
//! 2. Opens the configured frame source (synthetic, image directory or
//!    webcam).
//! 3. Starts the operator console on its own thread and an alert printer on
//!    a Tokio runtime.
//! 4. Runs the measurement loop on the main thread until the operator quits,
//!    Ctrl-C is pressed, the source runs dry or the camera is lost.

mod alerts;
mod config;
mod console;
mod presenter;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, warn};

use volumetra_hal::SourceKind;
use volumetra_middleware::{EventBus, Topic};
use volumetra_runtime::{FanOut, MeasurementLoop, SnapshotPresenter};

use crate::presenter::ConsolePresenter;

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); VOLUMETRA_LOG_FORMAT=json switches
    // to JSON lines. User-facing output still uses println!.
    let _tracing = volumetra_runtime::init_tracing("volumetra");

    print_banner();

    let cfg = match config::resolve(config::load(), run_first_run_setup) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Configuration error".red().bold(), e);
            eprintln!(
                "  Fix or remove {} and start again.",
                config::config_path().display().to_string().bold()
            );
            return ExitCode::from(2);
        }
    };
    let bus = EventBus::default();

    let mut mloop = match MeasurementLoop::new(cfg.loop_config(), bus.clone()) {
        Ok(mloop) => mloop,
        Err(e) => {
            eprintln!("{}: {}", "Configuration error".red().bold(), e);
            return ExitCode::from(2);
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = mloop.shutdown_flag();
    let shutdown_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after this frame …".yellow().bold());
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use 'q' to stop");
    }

    // ── Frame source ──────────────────────────────────────────────────────
    let mut source = match volumetra_hal::open_source(&cfg.source) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: {}", "Cannot open frame source".red().bold(), e);
            return ExitCode::from(if e.is_fatal() { 1 } else { 2 });
        }
    };
    println!(
        "  Source: {} ({}×{})",
        source.id().bold(),
        cfg.source.width,
        cfg.source.height
    );

    // ── Presenters ────────────────────────────────────────────────────────
    let mut presenter = FanOut::new().with(ConsolePresenter::new(cfg.output.status_every));
    if let Some(dir) = &cfg.output.snapshot_dir {
        match SnapshotPresenter::new(dir, cfg.output.snapshot_every) {
            Ok(snapshots) => presenter = presenter.with(snapshots),
            Err(e) => warn!(error = %e, "snapshots disabled"),
        }
    }

    // ── Alerts & operator console ─────────────────────────────────────────
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => Some(rt),
        Err(e) => {
            warn!(error = %e, "alert printer unavailable");
            None
        }
    };
    if let Some(rt) = &runtime {
        rt.spawn(alerts::watch(bus.subscribe_to(Topic::SystemAlerts)));
    }

    let console_bus = bus.clone();
    let reader = mloop.calibration_reader();
    let console_shutdown = shutdown.clone();
    let spawned = std::thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || console::run(console_bus, reader, console_shutdown));
    if let Err(e) = spawned {
        warn!(error = %e, "operator console unavailable");
    }

    println!(
        "\n  Type {} for commands, {} to calibrate.\n",
        "h".bold().cyan(),
        "c".bold().cyan()
    );

    // ── Measurement loop ──────────────────────────────────────────────────
    let result = mloop.run(&mut source, &mut presenter);
    if let Some(rt) = runtime {
        rt.shutdown_background();
    }
    match result {
        Ok(cycles) => {
            println!("\n  {} Processed {} frame(s).", "✓".green().bold(), cycles);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "measurement loop aborted");
            eprintln!("\n{}: {}", "Fatal".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

const DEFAULT_STREAM_URL: &str = "http://192.168.0.106:4747/video";

fn run_first_run_setup() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Volumetra First-Run Setup      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Volumetra.\n");

    let mut cfg = config::Config::default();

    println!("  Where should frames come from?");
    println!("    1) Synthetic test ball  (default, no camera needed)");
    println!("    2) Directory of PNG/JPEG images");
    println!("    3) Webcam");
    println!("    4) Network MJPEG stream (IP camera or phone app)");
    match prompt_line("  Enter choice [1]: ", "1").as_str() {
        "2" => {
            cfg.source.kind = SourceKind::Images;
            let default_dir = cfg.source.image_dir.display().to_string();
            let dir = prompt_line(&format!("  Image directory [{default_dir}]: "), &default_dir);
            cfg.source.image_dir = dir.into();
        }
        "3" => {
            cfg.source.kind = SourceKind::Webcam;
            let index = prompt_line("  Camera index [0]: ", "0");
            if let Ok(i) = index.parse::<u32>() {
                cfg.source.camera_index = i;
            }
        }
        "4" => {
            cfg.source.kind = SourceKind::Stream;
            let url = prompt_line(
                &format!("  Stream URL [{DEFAULT_STREAM_URL}]: "),
                DEFAULT_STREAM_URL,
            );
            cfg.source.url = Some(url);
        }
        _ => cfg.source.kind = SourceKind::Synthetic,
    }

    let density = prompt_line("  Material density in g/cm³ (blank to skip): ", "");
    if let Ok(d) = console::parse_number(&density)
        && d.is_finite()
        && d > 0.0
    {
        cfg.measurement.density_g_per_cm3 = Some(d);
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" _   __     __                    __"#.bold().cyan());
    println!("{}", r#"| | / /__  / /_ ____ _  ___ ____/ /_______ _"#.bold().cyan());
    println!("{}", r#"| |/ / _ \/ / // /  ' \/ -_)_  _/ __/ __/ _ `/"#.bold().cyan());
    println!("{}", r#"|___/\___/_/\_,_/_/_/_/\__/ /_/ \__/_/  \_,_/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Volumetra".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Sphere volume from a single camera");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
