//! Switch actuation.
//!
//! The controller only knows the [`SwitchActuator`] capability. The bundled
//! [`SwitchBoard`] remembers the last commanded state of every configured
//! switch and, when a switch has `on_command` / `off_command` configured, runs
//! that command to drive the hardware (relay boards, smart plugs, GPIO tools).

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{Configuration, Switch};
use crate::constants::{COMMAND_POLL_INTERVAL_MS, SWITCH_COMMAND_TIMEOUT_SECS};

/// Capability: set a switch of a terrarium to on or off.
///
/// Switch ids are only unique within their terrarium, so both are needed to
/// address a switch.
#[cfg_attr(test, mockall::automock)]
pub trait SwitchActuator: Send + Sync {
    fn set_switch_state(&self, terrarium: &str, id: &str, on: bool) -> Result<()>;
}

#[derive(Debug, Clone)]
struct SwitchEntry {
    name: String,
    on_command: Option<Vec<String>>,
    off_command: Option<Vec<String>>,
    state: Option<bool>,
}

/// Terrarium name and switch id.
pub type SwitchKey = (String, String);

/// [`SwitchActuator`] for the switches of a configuration.
#[derive(Debug)]
pub struct SwitchBoard {
    switches: Mutex<BTreeMap<SwitchKey, SwitchEntry>>,
    command_timeout: Duration,
}

impl SwitchBoard {
    pub fn new<'a>(switches: impl IntoIterator<Item = (&'a str, &'a Switch)>) -> Self {
        let switches = switches
            .into_iter()
            .map(|(terrarium, s)| {
                (
                    (terrarium.to_string(), s.id.clone()),
                    SwitchEntry {
                        name: s.name.clone(),
                        on_command: s.on_command.clone(),
                        off_command: s.off_command.clone(),
                        state: None,
                    },
                )
            })
            .collect();
        Self {
            switches: Mutex::new(switches),
            command_timeout: Duration::from_secs(SWITCH_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.all_switches())
    }

    /// Longest a switch command may run before it is killed.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Last commanded state; `None` for unknown or never-set switches.
    pub fn state(&self, terrarium: &str, id: &str) -> Option<bool> {
        self.lock()
            .get(&(terrarium.to_string(), id.to_string()))
            .and_then(|entry| entry.state)
    }

    /// All known switches as (terrarium, id), sorted.
    pub fn ids(&self) -> Vec<SwitchKey> {
        self.lock().keys().cloned().collect()
    }

    /// Turn every switch off. Failures are logged; the first one is returned
    /// after all switches were attempted.
    pub fn all_off(&self) -> Result<()> {
        let mut first_error = None;
        for (terrarium, id) in self.ids() {
            if let Err(e) = self.set_switch_state(&terrarium, &id, false) {
                log_warning!("Failed to switch off '{id}' in {terrarium}: {e:#}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<SwitchKey, SwitchEntry>> {
        self.switches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SwitchActuator for SwitchBoard {
    fn set_switch_state(&self, terrarium: &str, id: &str, on: bool) -> Result<()> {
        let key = (terrarium.to_string(), id.to_string());
        let entry = {
            let switches = self.lock();
            switches
                .get(&key)
                .cloned()
                .with_context(|| format!("Unknown switch '{id}' in {terrarium}"))?
        };

        let action = if on { "on" } else { "off" };
        let command = if on {
            &entry.on_command
        } else {
            &entry.off_command
        };
        if let Some(argv) = command {
            run_command(argv, self.command_timeout).with_context(|| {
                format!("Failed to switch {action} '{}' ({id}) in {terrarium}", entry.name)
            })?;
        }

        let previous = self
            .lock()
            .get_mut(&key)
            .and_then(|entry| entry.state.replace(on));

        if previous != Some(on) {
            log_decorated!("{terrarium}: switch '{}' ({id}) {action}", entry.name);
        } else {
            log_debug!("{terrarium}: switch '{}' ({id}) already {action}", entry.name);
        }

        Ok(())
    }
}

/// Run a command to completion, failing on a non-zero exit status.
///
/// A command still running after `timeout` is killed and reported as failed.
pub(crate) fn run_command(argv: &[String], timeout: Duration) -> Result<()> {
    let (program, args) = argv.split_first().context("Empty command")?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to run '{program}'"))?;

    // Drained on its own thread so a chatty command cannot fill the pipe
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer);
            buffer
        })
    });

    let status = wait_with_timeout(&mut child, timeout)
        .with_context(|| format!("Failed to wait for '{program}'"))?;
    let Some(status) = status else {
        anyhow::bail!("'{}' did not finish within {timeout:?} and was killed", argv.join(" "));
    };

    if !status.success() {
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        anyhow::bail!("'{}' exited with {}: {}", argv.join(" "), status, stderr.trim());
    }

    Ok(())
}

/// Wait for `child` at most `timeout`. Returns `None` after killing a child
/// that did not exit in time.
pub(crate) fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            // Already exited between try_wait and kill is fine
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep((deadline - now).min(Duration::from_millis(COMMAND_POLL_INTERVAL_MS)));
    }
}
