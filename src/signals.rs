//! Signal handling for terracontrol.
//!
//! A dedicated thread owns the `signal_hook` iterator and translates process
//! signals into [`SignalMessage`]s for the main loop:
//!
//! - `SIGINT`, `SIGTERM`, `SIGHUP`: graceful shutdown
//! - `SIGUSR2`: rerun today's scheduling pass
//! - `SIGUSR1`: log the transitions that are still pending

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR1, SIGUSR2},
    iterator::Signals,
};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use crate::controller::Controller;

/// Messages delivered from the signal thread to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMessage {
    /// Recompute and re-arm today's transitions (SIGUSR2)
    Reschedule,
    /// Log pending transitions (SIGUSR1)
    Status,
    /// Shut down (SIGTERM, SIGINT, SIGHUP)
    Shutdown,
}

/// Signal handling state shared between threads
pub struct SignalState {
    /// Cleared once a shutdown signal arrived
    pub running: Arc<AtomicBool>,
    pub signal_receiver: Receiver<SignalMessage>,
    /// Kept so the channel stays open even if the signal thread exits
    pub signal_sender: Sender<SignalMessage>,
}

/// Map a raw signal number to the message it produces.
pub fn message_for_signal(sig: i32) -> Option<SignalMessage> {
    match sig {
        SIGUSR2 => Some(SignalMessage::Reschedule),
        SIGUSR1 => Some(SignalMessage::Status),
        SIGINT | SIGTERM | SIGHUP => Some(SignalMessage::Shutdown),
        _ => None,
    }
}

/// Handle one message in the main loop.
///
/// Returns `false` once the main loop should exit.
pub fn handle_signal_message(message: SignalMessage, controller: &Controller) -> bool {
    match message {
        SignalMessage::Reschedule => {
            log_block_start!("Rescheduling on request");
            controller.reschedule();
            true
        }
        SignalMessage::Status => {
            let pending = controller.pending();
            let tz = controller.timezone();
            log_block_start!("{} pending transition(s)", pending.len());
            for transition in &pending {
                log_indented!("{}", transition.at.with_timezone(&tz).format("%H:%M:%S"));
                log_indented!("  {transition}");
            }
            true
        }
        SignalMessage::Shutdown => {
            controller.stop();
            false
        }
    }
}

/// Install the signal thread.
pub fn setup_signal_handler() -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));
    let (signal_sender, signal_receiver) = mpsc::channel();

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR1, SIGUSR2])
        .context("failed to register signal handlers")?;

    let running_clone = running.clone();
    let sender_clone = signal_sender.clone();

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            #[cfg(debug_assertions)]
            eprintln!(
                "DEBUG: Signal handler thread starting for PID: {}",
                std::process::id()
            );

            for sig in signals.forever() {
                let Some(message) = message_for_signal(sig) else {
                    continue;
                };

                if message == SignalMessage::Shutdown {
                    let user_message = match sig {
                        SIGINT => "Received interrupt signal, initiating graceful shutdown...",
                        SIGTERM => "Received termination request, initiating graceful shutdown...",
                        _ => "Received hangup signal, initiating graceful shutdown...",
                    };
                    log_pipe!();
                    log_info!("{user_message}");
                    running_clone.store(false, Ordering::SeqCst);
                } else {
                    #[cfg(debug_assertions)]
                    eprintln!("DEBUG: Signal {sig} mapped to {message:?}");
                }

                if sender_clone.send(message).is_err() {
                    #[cfg(debug_assertions)]
                    eprintln!("DEBUG: Signal channel closed, signal thread exiting");
                    break;
                }
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(SignalState {
        running,
        signal_receiver,
        signal_sender,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_mapping() {
        assert_eq!(message_for_signal(SIGUSR2), Some(SignalMessage::Reschedule));
        assert_eq!(message_for_signal(SIGUSR1), Some(SignalMessage::Status));
        for sig in [SIGINT, SIGTERM, SIGHUP] {
            assert_eq!(message_for_signal(sig), Some(SignalMessage::Shutdown));
        }
        assert_eq!(message_for_signal(0), None);
    }
}
