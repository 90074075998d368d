//! Structured logging system with visual formatting.
//!
//! This module provides the logging system used throughout terracontrol. Output
//! uses Unicode box drawing characters so that a scheduling pass, with all the
//! transitions it arms, reads as one visually connected block in a terminal or
//! in the journal.
//!
//! The logger supports runtime enable/disable (tests switch it off), an
//! optional wall-clock timestamp prefix for daemon operation, and routing to a
//! file through a background writer thread.

use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};

// Use an AtomicBool instead of thread_local for thread safety
static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

// Prefix every line with the local wall-clock time
static TIMESTAMPS_ENABLED: AtomicBool = AtomicBool::new(false);

// Gate for log_debug!
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

// Channel for routing output to file when --log is active
static LOG_CHANNEL: OnceLock<Option<Sender<LogMessage>>> = OnceLock::new();

enum LogMessage {
    Formatted(String),
    Shutdown,
}

/// Main logging interface providing structured output formatting.
///
/// ## Logging Conventions
///
/// - **`log_block_start!`**: starts a new conceptual block (a scheduling pass,
///   configuration loading, shutdown). Prints `┃` then `┣ message`.
/// - **`log_decorated!`**: a message belonging to the current block, `┣ message`.
/// - **`log_indented!`**: nested details such as the transitions of a terrarium,
///   `┃   message`.
/// - **`log_pipe!`**: a single empty `┃` line, used before a semantic message
///   (`log_warning!`, `log_error!`, ...) that opens its own block.
/// - **`log_version!`** / **`log_end!`**: header at startup and the final `╹`
///   at shutdown.
/// - **`log_info!`, `log_warning!`, `log_error!`, `log_debug!`, `log_critical!`**:
///   semantic messages with a `[LEVEL]` prefix. `log_debug!` only prints when
///   debug output was switched on with [`Log::set_debug`].
pub struct Log;

impl Log {
    /// Enable or disable logging temporarily.
    ///
    /// This is useful for quiet operation during testing where log output
    /// would interfere with results.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Check if logging is currently enabled.
    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Prefix every line with `[YYYY-MM-DD HH:MM:SS]` in local time.
    pub fn set_timestamps(enabled: bool) {
        TIMESTAMPS_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Enable output of `log_debug!` messages.
    pub fn set_debug(enabled: bool) {
        DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_debug() -> bool {
        DEBUG_ENABLED.load(Ordering::SeqCst)
    }

    /// Start file logging to the specified path.
    pub fn start_file_logging(file_path: String) -> anyhow::Result<LoggerGuard> {
        let (tx, rx) = channel();

        // Install the channel
        LOG_CHANNEL
            .set(Some(tx.clone()))
            .map_err(|_| anyhow::anyhow!("Logger channel already initialized"))?;

        // Spawn logger thread
        let handle = std::thread::spawn(move || {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file_path)?;

            loop {
                match rx.recv() {
                    Ok(LogMessage::Formatted(text)) => {
                        file.write_all(text.as_bytes())?;
                        file.flush()?;
                    }
                    Ok(LogMessage::Shutdown) | Err(_) => {
                        file.flush()?;
                        break;
                    }
                }
            }

            Ok::<(), anyhow::Error>(())
        });

        Ok(LoggerGuard {
            tx,
            handle: Some(handle),
        })
    }

    /// Get the timestamp prefix for the current line.
    ///
    /// Returns an empty string unless timestamps were switched on.
    /// Public for macro access.
    pub fn get_timestamp_prefix() -> String {
        if TIMESTAMPS_ENABLED.load(Ordering::SeqCst) {
            format!("[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Guard for file logging that ensures clean shutdown.
pub struct LoggerGuard {
    tx: Sender<LogMessage>,
    handle: Option<std::thread::JoinHandle<anyhow::Result<()>>>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        // LOG_CHANNEL stays set; OnceLock can only be set once per process
    }
}

// Strip ANSI color codes so file output stays readable
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next(); // consume '['
                for ch in chars.by_ref() {
                    if ch == 'm' {
                        break;
                    }
                }
            } else {
                result.push(ch);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

// Public function that routes output (needed by macros)
pub fn write_output(text: &str) {
    if let Some(Some(tx)) = LOG_CHANNEL.get() {
        let clean_text = strip_ansi_codes(text);
        let _ = tx.send(LogMessage::Formatted(clean_text));
    } else {
        // One write per call keeps lines from timer threads intact
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

/// Visual style of one log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    BlockStart,
    Decorated,
    Indented,
    Info,
    Warning,
    Error,
    ErrorExit,
    Critical,
    Debug,
}

impl LineStyle {
    fn level(self) -> Option<(&'static str, &'static str)> {
        match self {
            LineStyle::Info => Some(("32", "INFO")),
            LineStyle::Warning => Some(("33", "WARNING")),
            LineStyle::Error | LineStyle::ErrorExit => Some(("31", "ERROR")),
            LineStyle::Critical => Some(("31", "CRITICAL")),
            LineStyle::Debug => Some(("36", "DEBUG")),
            _ => None,
        }
    }

    /// Render `message` with `prefix` in front of every output line.
    pub fn render(self, prefix: &str, message: &str) -> String {
        match (self, self.level()) {
            (LineStyle::BlockStart, _) => format!("{prefix}┃\n{prefix}┣ {message}\n"),
            (LineStyle::Indented, _) => format!("{prefix}┃   {message}\n"),
            (LineStyle::ErrorExit, Some((color, label))) => {
                format!("{prefix}┃\n{prefix}┗[\x1b[{color}m{label}\x1b[0m] {message}\n")
            }
            (_, Some((color, label))) => {
                format!("{prefix}┣[\x1b[{color}m{label}\x1b[0m] {message}\n")
            }
            (_, None) => format!("{prefix}┣ {message}\n"),
        }
    }
}

/// Format and write one line. Used by the logging macros.
pub fn emit(style: LineStyle, args: fmt::Arguments<'_>) {
    if !Log::is_enabled() || (style == LineStyle::Debug && !Log::is_debug()) {
        return;
    }
    let prefix = Log::get_timestamp_prefix();
    write_output(&style.render(&prefix, &args.to_string()));
}

/// Write a line that carries no message (`┃`, `╹` or the version header).
pub fn emit_marker(marker: &str) {
    if Log::is_enabled() {
        let prefix = Log::get_timestamp_prefix();
        write_output(&format!("{prefix}{marker}\n"));
    }
}

// # Logging Macros

#[doc(hidden)]
#[macro_export]
macro_rules! __log_line {
    ($style:ident, $fmt:literal $($arg:tt)*) => {
        $crate::logger::emit($crate::logger::LineStyle::$style, format_args!($fmt $($arg)*))
    };
    ($style:ident, $expr:expr) => {
        $crate::logger::emit($crate::logger::LineStyle::$style, format_args!("{}", $expr))
    };
}

/// Log a decorated message, typically as part of an existing block.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)+) => { $crate::__log_line!(Decorated, $($arg)+) };
}

/// Log an indented message for sub-items or details within a block.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)+) => { $crate::__log_line!(Indented, $($arg)+) };
}

/// Log a block start message, initiating a new conceptual block of information.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)+) => { $crate::__log_line!(BlockStart, $($arg)+) };
}

/// Log an informational message in green.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::__log_line!(Info, $($arg)+) };
}

/// Log a warning message in yellow.
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)+) => { $crate::__log_line!(Warning, $($arg)+) };
}

/// Log an error message in red.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::__log_line!(Error, $($arg)+) };
}

/// Log an error that ends the program, closing the block with `┗`.
#[macro_export]
macro_rules! log_error_exit {
    ($($arg:tt)+) => { $crate::__log_line!(ErrorExit, $($arg)+) };
}

/// Log a critical message in red.
#[macro_export]
macro_rules! log_critical {
    ($($arg:tt)+) => { $crate::__log_line!(Critical, $($arg)+) };
}

/// Log a debug message; printed only after `Log::set_debug(true)`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::__log_line!(Debug, $($arg)+) };
}

/// Log a visual pipe separator for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {
        $crate::logger::emit_marker("┃")
    };
}

/// Log the application version header.
#[macro_export]
macro_rules! log_version {
    () => {
        $crate::logger::emit_marker(concat!(
            "┏ terracontrol v",
            env!("CARGO_PKG_VERSION"),
            " ━━╸"
        ))
    };
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {
        $crate::logger::emit_marker("╹")
    };
}
