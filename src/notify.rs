//! Human-readable notifications.
//!
//! Every notable controller event (start, stop, schedule summaries, switch
//! transitions, failures) is reported through the [`Notifier`] capability.
//! Notification failures are logged by the caller and never stop scheduling.

use anyhow::{Context, Result};
use std::fmt;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use crate::config::NotificationConfig;
use crate::constants::NOTIFICATION_TIMEOUT_SECS;
use crate::switches::wait_with_timeout;

/// Importance of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        }
    }
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability: deliver a message to a human.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str) -> Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) -> Result<()> {
        match level {
            NotificationLevel::Info => log_info!("{message}"),
            NotificationLevel::Warning => log_warning!("{message}"),
            NotificationLevel::Error => log_error!("{message}"),
        }
        Ok(())
    }
}

/// Runs an external command for every notification.
///
/// The configured argv gets two more arguments, a title and the message. The
/// level is passed in the `TERRACONTROL_LEVEL` environment variable so scripts
/// can map it to the priority of a push service. A command that hangs is
/// killed after a timeout so it cannot hold up the timer worker.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            anyhow::bail!("Notification command must name a program to run");
        }
        Ok(Self {
            argv,
            timeout: Duration::from_secs(NOTIFICATION_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        Self::new(config.command.clone())
    }

    fn title(level: NotificationLevel) -> String {
        match level {
            NotificationLevel::Info => "terracontrol".to_string(),
            NotificationLevel::Warning => "terracontrol warning".to_string(),
            NotificationLevel::Error => "terracontrol error".to_string(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) -> Result<()> {
        let (program, args) = self.argv.split_first().context("Empty notification command")?;

        let mut child = Command::new(program)
            .args(args)
            .arg(Self::title(level))
            .arg(message)
            .env("TERRACONTROL_LEVEL", level.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run notification command '{program}'"))?;

        let status = wait_with_timeout(&mut child, self.timeout)
            .with_context(|| format!("Failed to wait for notification command '{program}'"))?;
        let Some(status) = status else {
            anyhow::bail!(
                "Notification command '{program}' did not finish within {:?} and was killed",
                self.timeout
            );
        };

        if !status.success() {
            anyhow::bail!("Notification command '{program}' exited with {status}");
        }
        Ok(())
    }
}

/// Fan-out to several notifiers.
///
/// All notifiers are tried; the first failure is returned.
#[derive(Default, Clone)]
pub struct Notifiers {
    targets: Vec<Arc<dyn Notifier>>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.targets.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Notifier for Notifiers {
    fn notify(&self, level: NotificationLevel, message: &str) -> Result<()> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(e) = target.notify(level, message) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Log;
    use mockall::predicate::{eq, function};
    use serial_test::serial;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_fan_out_reaches_all_targets() {
        let mut first = MockNotifier::new();
        first
            .expect_notify()
            .with(
                eq(NotificationLevel::Warning),
                function(|m: &str| m == "heat mat offline"),
            )
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("push service down")));

        let mut second = MockNotifier::new();
        second
            .expect_notify()
            .with(
                eq(NotificationLevel::Warning),
                function(|m: &str| m == "heat mat offline"),
            )
            .times(1)
            .returning(|_, _| Ok(()));

        let notifiers = Notifiers::new()
            .with(Arc::new(first))
            .with(Arc::new(second));
        assert_eq!(notifiers.len(), 2);

        let err = notifiers
            .notify(NotificationLevel::Warning, "heat mat offline")
            .unwrap_err();
        assert!(err.to_string().contains("push service down"));
    }

    #[test]
    #[serial]
    fn test_log_notifier_never_fails() {
        Log::set_enabled(false);
        for level in [
            NotificationLevel::Info,
            NotificationLevel::Warning,
            NotificationLevel::Error,
        ] {
            assert!(LogNotifier.notify(level, "message").is_ok());
        }
        Log::set_enabled(true);
    }

    #[test]
    fn test_command_notifier_appends_title_and_message() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let script = format!(
            "printf '%s|%s|%s' \"$TERRACONTROL_LEVEL\" \"$1\" \"$2\" > '{}'",
            out.display()
        );
        let notifier = CommandNotifier::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            script,
            "sh".to_string(),
        ])
        .unwrap();

        notifier
            .notify(NotificationLevel::Error, "Desert: light failed")
            .unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "error|terracontrol error|Desert: light failed"
        );
    }

    #[test]
    fn test_hanging_command_notifier_is_killed() {
        let notifier = CommandNotifier::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "sleep 60".to_string(),
            "sh".to_string(),
        ])
        .unwrap()
        .with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = notifier
            .notify(NotificationLevel::Info, "Desert: light on")
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(err.to_string().contains("was killed"));
    }

    #[test]
    fn test_command_notifier_failures() {
        assert!(CommandNotifier::new(vec![]).is_err());

        let failing = CommandNotifier::new(vec!["false".to_string()]).unwrap();
        assert!(failing.notify(NotificationLevel::Info, "hello").is_err());
    }
}
