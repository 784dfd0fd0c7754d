//! Gesture Control - headless entry point
//!
//! Reads commands as text lines on stdin and writes outbound events as JSON
//! lines on stdout. Logs go to stderr.
//!
//! Usage: gesture-control [settings.xml]

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use crossbeam_channel::{select, Sender};

use gesture_control::camera::create_default_backend;
use gesture_control::error::PipelineError;
use gesture_control::landmarks::create_default_provider;
use gesture_control::telemetry::init_logging;
use gesture_control::{AppContext, GesturePipeline, GestureSettings, PipelineCommand};

/// One line of operator input
enum Input {
    Command(PipelineCommand),
    /// Print the current control state
    State,
    /// Write the active settings back to disk
    Save,
    Quit,
}

fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = GestureSettings::load_or_default(settings_path.as_deref());

    let _log_guard = init_logging(&settings.logging)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to initialize logging")?;

    let ctx = AppContext::new(settings);
    let events = ctx.bus.subscribe("stdout");

    let backend = create_default_backend();
    let provider = create_default_provider(ctx.settings.pipeline.max_hands);
    let mut pipeline = GesturePipeline::spawn(&ctx, backend, provider).context("Failed to start gesture pipeline")?;

    let (input_sender, input) = crossbeam_channel::bounded(16);
    std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || read_commands(input_sender))
        .context("Failed to spawn stdin reader")?;

    tracing::info!("Ready. Commands: cycle | pattern [on|off] | control <volume|temperature> | gesture <NAME> | state | save | quit");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    loop {
        select! {
            recv(events) -> event => {
                let Ok(event) = event else { break };
                writeln!(out, "{}", event.to_json_line()?).context("Failed to write event")?;
                out.flush()?;
            }
            recv(input) -> line => match line {
                Ok(Input::Command(command)) => match pipeline.send(command) {
                    Ok(()) => {}
                    Err(PipelineError::CommandQueueFull) => {
                        tracing::warn!("Pipeline busy, dropped command {:?}", command);
                    }
                    Err(e) => return Err(e).context("Pipeline is not running"),
                },
                Ok(Input::State) => {
                    writeln!(out, "{}", serde_json::to_string(&ctx.control.snapshot())?)?;
                    out.flush()?;
                }
                Ok(Input::Save) => save_settings(&ctx.settings, settings_path.as_deref()),
                Ok(Input::Quit) | Err(_) => break,
            }
        }
    }

    pipeline.stop();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Save to the path given on the command line, else the per-user config file
fn save_settings(settings: &GestureSettings, path: Option<&Path>) {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match GestureSettings::default_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Not saving settings: {}", e);
                return;
            }
        },
    };

    match settings.save_to_file(&path) {
        Ok(()) => tracing::info!("Saved settings to {:?}", path),
        Err(e) => tracing::warn!("Failed to save settings to {:?}: {}", path, e),
    }
}

/// Parse stdin lines until `quit` or end of input
fn read_commands(sender: Sender<Input>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        let input = match line.trim() {
            "" => continue,
            "quit" | "exit" => Input::Quit,
            "state" => Input::State,
            "save" => Input::Save,
            text => match text.parse::<PipelineCommand>() {
                Ok(command) => Input::Command(command),
                Err(e) => {
                    tracing::warn!("Ignoring input '{}': {}", text, e);
                    continue;
                }
            },
        };

        let quit = matches!(input, Input::Quit);
        if sender.send(input).is_err() || quit {
            return;
        }
    }

    let _ = sender.send(Input::Quit);
}
