//! Main application entry point and high-level flow coordination.
//!
//! The binary only wires things together; all scheduling logic lives in the
//! library. The flow is:
//!
//! 1. Argument parsing and early exit for help/version
//! 2. Configuration loading and validation (fatal on error)
//! 3. Capability setup: solar calculator, switch board, notifiers, timer engine
//! 4. Fail-safe: every switch off, then the controller starts
//! 5. Signal loop until a shutdown signal arrives
//! 6. Graceful cleanup: controller stop, every switch off, timer engine shutdown

#[macro_use]
extern crate terracontrol;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use terracontrol::args::{self, CliAction, ParsedArgs};
use terracontrol::config::Configuration;
use terracontrol::constants::{EXIT_FAILURE, EXIT_SUCCESS};
use terracontrol::controller::{Controller, ControllerParams, local_date};
use terracontrol::geo::SunriseCalculator;
use terracontrol::logger::{Log, LoggerGuard};
use terracontrol::notify::{CommandNotifier, LogNotifier, Notifiers};
use terracontrol::signals::{handle_signal_message, setup_signal_handler};
use terracontrol::switches::SwitchBoard;
use terracontrol::time_source::{RealTimeSource, TimeSource};
use terracontrol::timer::TimerEngine;

fn main() {
    let parsed_args = ParsedArgs::from_env();

    let result = match parsed_args.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(EXIT_SUCCESS)
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(EXIT_SUCCESS)
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            Ok(EXIT_FAILURE)
        }
        CliAction::Run {
            debug_enabled,
            config_path,
            log_file,
        } => run(debug_enabled, config_path, log_file),
        CliAction::Check {
            debug_enabled,
            config_path,
            date,
        } => check(debug_enabled, config_path, date),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log_error_exit!("{e:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn load_config(config_path: Option<String>) -> Result<Configuration> {
    let path = config_path.map(PathBuf::from);
    let config = Configuration::load(path.as_deref())?;
    config.log_config();
    Ok(config)
}

fn build_controller(
    config: Configuration,
    switch_board: Arc<SwitchBoard>,
    scheduler: Arc<TimerEngine>,
) -> Result<Controller> {
    let mut notifiers = Notifiers::new().with(Arc::new(LogNotifier));
    if let Some(notifications) = &config.notifications {
        let command = CommandNotifier::from_config(notifications)
            .context("invalid notification command")?;
        notifiers = notifiers.with(Arc::new(command));
    }

    let controller = Controller::new(ControllerParams {
        config,
        solar: Arc::new(SunriseCalculator),
        actuator: switch_board,
        notifier: Arc::new(notifiers),
        scheduler,
        clock: Arc::new(RealTimeSource),
    })?;
    Ok(controller)
}

/// Validate the configuration and print the plan of one day.
fn check(debug_enabled: bool, config_path: Option<String>, date: Option<NaiveDate>) -> Result<i32> {
    Log::set_debug(debug_enabled);
    log_version!();

    let config = load_config(config_path)?;
    let tz = config.timezone()?;
    let date = date.unwrap_or_else(|| local_date(RealTimeSource.now(), tz));

    let engine = Arc::new(TimerEngine::new().context("failed to start timer engine")?);
    let switch_board = Arc::new(SwitchBoard::from_config(&config));
    let controller = build_controller(config, switch_board, engine.clone())?;

    log_block_start!("Plan for {date}");
    let mut failures = 0;
    for (terrarium, plan) in controller.preview(date) {
        match plan {
            Ok(Some(plan)) => {
                log_decorated!("{terrarium}: program '{}'", plan.program);
                for transition in &plan.transitions {
                    log_indented!(
                        "{} {} {}",
                        transition.at.with_timezone(&tz).format("%H:%M:%S"),
                        transition.switches.join(", "),
                        transition.action()
                    );
                }
            }
            Ok(None) => {
                log_pipe!();
                log_warning!("{terrarium}: no program configured");
            }
            Err(e) => {
                failures += 1;
                log_pipe!();
                log_error!("{terrarium}: {e:#}");
            }
        }
    }

    engine.shutdown();
    log_end!();

    Ok(if failures > 0 {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    })
}

/// Run the controller until a shutdown signal arrives.
fn run(debug_enabled: bool, config_path: Option<String>, log_file: Option<String>) -> Result<i32> {
    Log::set_debug(debug_enabled);
    Log::set_timestamps(true);

    // Kept alive for the whole run so buffered lines are flushed on exit
    let _log_guard: Option<LoggerGuard> = match log_file {
        Some(path) => Some(
            Log::start_file_logging(path.clone())
                .with_context(|| format!("failed to start logging to {path}"))?,
        ),
        None => None,
    };

    log_version!();
    if debug_enabled {
        log_pipe!();
        log_debug!("Debug mode enabled - showing scheduling details");
    }

    let signal_state = setup_signal_handler()?;
    let config = load_config(config_path)?;

    let engine = Arc::new(TimerEngine::new().context("failed to start timer engine")?);
    let switch_board = Arc::new(SwitchBoard::from_config(&config));
    let controller = build_controller(config, switch_board.clone(), engine.clone())?;

    log_block_start!("Switching everything off before scheduling");
    if let Err(e) = switch_board.all_off() {
        log_warning!("Initial switch-off incomplete: {e:#}");
    }

    controller.start()?;

    while signal_state.running.load(Ordering::SeqCst) {
        match signal_state.signal_receiver.recv() {
            Ok(message) => {
                if !handle_signal_message(message, &controller) {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    log_block_start!("Shutting down");
    controller.stop();
    if let Err(e) = switch_board.all_off() {
        log_critical!("Final switch-off incomplete, check the hardware: {e:#}");
    }
    drop(controller);
    engine.shutdown();
    log_end!();

    Ok(EXIT_SUCCESS)
}
