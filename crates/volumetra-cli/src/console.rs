//! Operator console – line-based commands read on their own thread.
//!
//! Commands:
//!   c, calibrate [mm]  – calibrate against the sphere in view (prompts for
//!                        its true diameter unless given)
//!   d, density [g/cm³] – set the material density for the weight readout
//!   s, status          – show calibration state
//!   h, help            – show this list
//!   q, quit            – stop measuring and exit
//!
//! Requests are published on [`Topic::OperatorInput`]; the measurement loop
//! picks them up at the start of its next cycle.

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use volumetra_measure::CalibrationReader;
use volumetra_middleware::{EventBus, Topic};
use volumetra_types::{CalibrationState, Event, EventPayload, OperatorCommand};

const EVENT_SOURCE: &str = "volumetra-cli::console";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Calibrate, with the diameter if it was typed inline.
    Calibrate(Option<String>),
    /// Set density, with the value if it was typed inline.
    Density(Option<String>),
    Status,
    Help,
    Quit,
    Unknown(String),
}

/// Parse one input line; `None` for blank lines.
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let mut parts = line.split_whitespace();
    let head = parts.next()?.to_ascii_lowercase();
    let arg = parts.next().map(str::to_string);
    Some(match head.as_str() {
        "c" | "calibrate" => ConsoleCommand::Calibrate(arg),
        "d" | "density" => ConsoleCommand::Density(arg),
        "s" | "status" => ConsoleCommand::Status,
        "h" | "help" | "?" => ConsoleCommand::Help,
        "q" | "quit" | "exit" => ConsoleCommand::Quit,
        _ => ConsoleCommand::Unknown(line.trim().to_string()),
    })
}

/// Parse a number typed by the operator. Range checks are left to the
/// measurement loop so that rejections are reported in one place.
pub fn parse_number(input: &str) -> Result<f64, String> {
    let trimmed = input.trim().replace(',', ".");
    trimmed
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", input.trim()))
}

/// Run the console until the operator quits, input closes or `shutdown` is
/// set. Blocks the calling thread.
pub fn run(bus: EventBus, calibration: CalibrationReader, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            warn!(error = %e, "operator console unavailable");
            return;
        }
    };

    while !shutdown.load(Ordering::SeqCst) {
        let line = match editor.readline(&format!("{} ", "volumetra>".bold().cyan())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                request_stop(&bus, &shutdown);
                break;
            }
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };
        let _ = editor.add_history_entry(line.as_str());

        match command {
            ConsoleCommand::Calibrate(arg) => {
                let value = match arg {
                    Some(arg) => parse_number(&arg).ok(),
                    None => request_known_diameter(&mut editor),
                };
                match value {
                    Some(known_diameter_mm) => {
                        send(&bus, OperatorCommand::Calibrate { known_diameter_mm });
                        println!(
                            "  Calibrating against {} mm on the next frame …",
                            known_diameter_mm.to_string().bold()
                        );
                    }
                    None => println!("{}", "  Calibration cancelled: invalid diameter.".red()),
                }
            }
            ConsoleCommand::Density(arg) => {
                let value = match arg {
                    Some(arg) => parse_number(&arg).ok(),
                    None => prompt_number(&mut editor, "  Density (g/cm³): "),
                };
                match value {
                    Some(g_per_cm3) => send(&bus, OperatorCommand::SetDensity { g_per_cm3 }),
                    None => println!("{}", "  Density unchanged: invalid value.".red()),
                }
            }
            ConsoleCommand::Status => print_status(&calibration),
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Quit => {
                println!("{}", "Goodbye.".green());
                request_stop(&bus, &shutdown);
                break;
            }
            ConsoleCommand::Unknown(other) => println!(
                "{} '{}'. Type {} for available commands.",
                "Unknown command:".red(),
                other.yellow(),
                "h".bold()
            ),
        }
    }
}

/// Ask for the reference sphere's true diameter. `None` if the answer is
/// not a number or input was interrupted.
fn request_known_diameter(editor: &mut DefaultEditor) -> Option<f64> {
    prompt_number(editor, "  Reference diameter (mm): ")
}

fn prompt_number(editor: &mut DefaultEditor, prompt: &str) -> Option<f64> {
    let answer = editor.readline(prompt).ok()?;
    match parse_number(&answer) {
        Ok(v) => Some(v),
        Err(e) => {
            println!("  {}", e.red());
            None
        }
    }
}

fn send(bus: &EventBus, command: OperatorCommand) {
    let event = Event::new(EVENT_SOURCE, EventPayload::Operator(command));
    if let Err(e) = bus.publish_to(Topic::OperatorInput, event) {
        warn!(error = %e, "operator command not delivered");
    }
}

fn request_stop(bus: &EventBus, shutdown: &AtomicBool) {
    send(bus, OperatorCommand::Stop);
    shutdown.store(true, Ordering::SeqCst);
}

fn print_status(calibration: &CalibrationReader) {
    match (calibration.state(), calibration.ratio()) {
        (CalibrationState::Calibrated, Some(ratio)) => println!(
            "  State: {}  ({:.3} px/mm)",
            "calibrated".green().bold(),
            ratio.pixels_per_mm()
        ),
        _ => println!(
            "  State: {}  – put a reference sphere in view and press {}",
            "uncalibrated".yellow().bold(),
            "c".bold()
        ),
    }
}

fn print_help() {
    println!();
    println!("{}", "Volumetra Commands".bold().underline());
    println!("  {}  – calibrate against the sphere in view", "c, calibrate [mm]".bold().cyan());
    println!("  {} – set density for the weight readout", "d, density [g/cm³]".bold().cyan());
    println!("  {}          – show calibration state", "s, status".bold().cyan());
    println!("  {}            – show this list", "h, help".bold().cyan());
    println!("  {}            – stop and exit", "q, quit".bold().cyan());
    println!();
}
