//! Smart doorbell daemon
//!
//! Loads the TOML configuration, installs logging, wires the button and ring
//! cue, and runs the orchestrator until SIGINT/SIGTERM or `quit` on the
//! console.
//!
//! No SIP backend ships with this binary yet: calls are handled by the
//! simulated engine, whose remote parties are played from the console. With
//! `--simulate` the button and the ring cue are simulated too, so the whole
//! doorbell runs on a desk without GPIO or audio hardware.
//!
//! `doorbell button-test` checks the wiring instead: it prints a line for
//! every press and plays the ring cue, with no calls involved.

mod button_test;
mod console;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doorbell_core::sim::{RecordingCuePlayer, ScriptedPin, SimulatedEngine};
use doorbell_core::{cue_player, DoorbellConfig, Orchestrator, RingCue, SysfsPin, VERSION};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::button_test::ButtonTest;
use crate::console::Console;
use crate::logging::LoggingConfig;

#[derive(Parser, Debug)]
#[command(name = "doorbell")]
#[command(version, about = "SIP smart doorbell: rings the owner, admits trusted callers")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file
    #[arg(short, long, default_value = "doorbell.toml", global = true)]
    config: PathBuf,

    /// Log level for the doorbell itself (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Log level for every other module
    #[arg(long, global = true)]
    module_log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Simulate the button and ring cue instead of using GPIO and audio hardware
    #[arg(long)]
    simulate: bool,

    /// Do not read console commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Commands {
    /// Print every button press and play the ring cue; no calls are made
    ButtonTest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DoorbellConfig::load(&args.config)
        .with_context(|| format!("cannot load {}", args.config.display()))?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(level) = &args.module_log_level {
        config.logging.module_level = level.clone();
    }

    let mut log_config = LoggingConfig::from_settings(&config.logging)?;
    if args.json {
        log_config = log_config.with_json();
    }
    logging::setup_logging(&log_config)?;
    logging::log_welcome(VERSION);

    if args.command == Some(Commands::ButtonTest) {
        return run_button_test(&config).await;
    }

    let engine = SimulatedEngine::with_settings(config.engine.clone());
    let mut doorbell = Orchestrator::new(&config, engine.clone())?;
    let mut scripted_button = None;

    if args.simulate {
        scripted_button = simulated_button(&config);
        match &scripted_button {
            Some(pin) => doorbell = doorbell.with_button(Box::new(pin.clone())),
            None => warn!("No button_pin configured; the doorbell button is disabled"),
        }
        if let Some(clip) = &config.ring_cue {
            doorbell = doorbell.with_ring_cue(RingCue::new(Arc::new(RecordingCuePlayer::new()), clip.clone()));
        }
    } else {
        match config.button_pin {
            Some(pin) => {
                let button = SysfsPin::open(pin, config.pull)
                    .with_context(|| format!("cannot set up doorbell button on GPIO {}", pin))?;
                doorbell = doorbell.with_button(Box::new(button));
            }
            None => warn!("No button_pin configured; the doorbell button is disabled"),
        }
        if let Some(clip) = &config.ring_cue {
            let player = cue_player(&config.cue_player).context("cannot set up the ring cue player")?;
            doorbell = doorbell.with_ring_cue(RingCue::new(player, clip.clone()));
        }
    }

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    if !args.no_console {
        tokio::spawn(console::print_events(doorbell.subscribe()));
        tokio::spawn(Console::new(engine, scripted_button, shutdown.clone()).run());
    }

    let stats = doorbell.run(shutdown).await;
    info!(
        presses = stats.presses,
        invites = stats.invites,
        admitted = stats.admitted,
        declined = stats.declined,
        errors = stats.contained_errors,
        "Doorbell stopped"
    );
    Ok(())
}

/// Scripted stand-in for the configured button, if there is one
fn simulated_button(config: &DoorbellConfig) -> Option<ScriptedPin> {
    config.button_pin.map(ScriptedPin::new)
}

async fn run_button_test(config: &DoorbellConfig) -> Result<()> {
    let pin = config
        .button_pin
        .context("button-test needs button_pin in the configuration")?;
    let button = SysfsPin::open(pin, config.pull)
        .with_context(|| format!("cannot set up doorbell button on GPIO {}", pin))?;

    let cue = match &config.ring_cue {
        Some(clip) => {
            let player = cue_player(&config.cue_player).context("cannot set up the ring cue player")?;
            Some(RingCue::new(player, clip.clone()))
        }
        None => None,
    };

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let presses = ButtonTest::new(Box::new(button), config.quiet_interval(), cue)
        .run(config.poll_interval(), shutdown)
        .await;
    info!(presses, "Button test finished");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Interrupt received; shutting down");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM; only Ctrl+C will stop the doorbell");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
