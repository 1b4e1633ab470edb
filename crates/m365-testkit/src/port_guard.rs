//! Best-effort cleanup of stale processes bound to the bridge's local port.
//!
//! The bridge listens on a fixed local port (the OAuth redirect listener), so a
//! process left over from an earlier run makes the next session fail in
//! confusing ways. [`PortGuard::setup`] and [`PortGuard::teardown`] are meant
//! to be called by whatever orchestrates a test session, once before and once
//! after it.
//!
//! Cleanup never fails the session: every error (missing `lsof`, a command
//! that hangs, an unparsable line, a denied `kill`) is logged as a warning and
//! the guard moves on.

use std::{
    collections::BTreeSet,
    io,
    process::{Command, Output, Stdio},
    thread,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_INTERVAL_MS: u64 = 1000;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Port guard settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortGuardConfig {
    /// Local port that must be free.
    pub port: u16,
    /// Maximum number of listing checks per cleanup.
    pub attempts: u32,
    /// Delay after terminating processes before checking again.
    #[serde(rename = "interval_ms", with = "duration_ms")]
    pub interval: Duration,
}

impl Default for PortGuardConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            attempts: DEFAULT_ATTEMPTS,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Source of port ownership information and the means to kill owners.
///
/// The system implementation shells out to `lsof` and `kill`; tests supply
/// their own.
pub trait ProcessTable: Send + Sync {
    /// Returns one listing line per process bound to `port`, without any
    /// header line. An empty vector means the port is free.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be produced.
    fn listeners(&self, port: u16) -> io::Result<Vec<String>>;

    /// Forcibly terminates `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be signalled.
    fn terminate(&self, pid: u32) -> io::Result<()>;
}

/// [`ProcessTable`] backed by `lsof -nP -iTCP:<port> -sTCP:LISTEN` and
/// `kill -9`.
#[derive(Debug, Clone)]
pub struct SystemProcessTable {
    timeout: Duration,
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self {
            timeout: COMMAND_TIMEOUT,
        }
    }
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides how long a single `lsof`/`kill` invocation may run.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ProcessTable for SystemProcessTable {
    fn listeners(&self, port: u16) -> io::Result<Vec<String>> {
        let mut command = Command::new("lsof");
        command.args(["-nP", &format!("-iTCP:{port}"), "-sTCP:LISTEN"]);
        let output = run_with_timeout(command, self.timeout)?;
        parse_listing(&output)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        let mut command = Command::new("kill");
        command.args(["-9", &pid.to_string()]);
        let output = run_with_timeout(command, self.timeout)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "kill -9 {pid} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Runs `command` to completion, killing it if it outlives `timeout`.
fn run_with_timeout(mut command: Command, timeout: Duration) -> io::Result<Output> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return child.wait_with_output();
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("command timed out after {}ms", timeout.as_millis()),
            ));
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Interprets the output of an `lsof` port listing.
///
/// `lsof` exits 1 with nothing on stdout when no process matches, and may
/// still print `WARNING` lines to stderr for unreadable mounts. Only a
/// non-warning stderr line without any listing is treated as failure.
///
/// # Errors
///
/// Returns an error if `lsof` produced no listing and reported an error.
pub fn parse_listing(output: &Output) -> io::Result<Vec<String>> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() && stdout.trim().is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let errors: Vec<&str> = stderr
            .lines()
            .map(str::trim)
            .filter(|line| {
                !line.is_empty()
                    && !line.contains("WARNING")
                    && !line.starts_with("Output information may be incomplete")
            })
            .collect();
        if errors.is_empty() {
            return Ok(Vec::new());
        }
        return Err(io::Error::other(format!(
            "lsof failed: {}",
            errors.join("; ")
        )));
    }

    Ok(stdout
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("COMMAND"))
        .map(ToString::to_string)
        .collect())
}

/// Extracts the owning PID from an `lsof` listing line (second column).
pub fn parse_pid(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// What a cleanup pass observed and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Number of listing checks performed.
    pub checks: u32,
    /// PIDs that were successfully terminated.
    pub terminated: Vec<u32>,
    /// Whether the last check saw the port free.
    pub port_free: bool,
}

/// Clears a local port before and after a test session.
#[derive(Debug, Clone)]
pub struct PortGuard<T = SystemProcessTable> {
    config: PortGuardConfig,
    table: T,
}

impl PortGuard<SystemProcessTable> {
    pub fn new(config: PortGuardConfig) -> Self {
        Self::with_table(config, SystemProcessTable::new())
    }
}

impl<T: ProcessTable> PortGuard<T> {
    pub fn with_table(config: PortGuardConfig, table: T) -> Self {
        Self { config, table }
    }

    pub fn config(&self) -> &PortGuardConfig {
        &self.config
    }

    /// Session start hook.
    pub fn setup(&self) -> CleanupReport {
        info!(port = self.config.port, "freeing port before session");
        self.clean()
    }

    /// Session end hook.
    pub fn teardown(&self) -> CleanupReport {
        info!(port = self.config.port, "freeing port after session");
        self.clean()
    }

    /// Polls the port up to `attempts` times, killing whatever holds it.
    ///
    /// Blocks for at most `attempts × interval` plus command run time.
    #[instrument(skip(self), fields(port = self.config.port))]
    pub fn clean(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for attempt in 1..=self.config.attempts {
            report.checks += 1;
            let lines = match self.table.listeners(self.config.port) {
                Ok(lines) => lines,
                Err(err) => {
                    warn!(attempt, error = %err, "could not list port owners; giving up");
                    return report;
                }
            };

            if lines.is_empty() {
                debug!(attempt, "port is free");
                report.port_free = true;
                return report;
            }

            let mut pids = BTreeSet::new();
            for line in &lines {
                match parse_pid(line) {
                    Some(pid) => {
                        pids.insert(pid);
                    }
                    None => warn!(attempt, line = %line, "could not parse PID from listing"),
                }
            }

            for pid in pids {
                match self.table.terminate(pid) {
                    Ok(()) => {
                        info!(attempt, pid, "terminated stale process");
                        report.terminated.push(pid);
                    }
                    Err(err) => warn!(attempt, pid, error = %err, "failed to terminate process"),
                }
            }

            thread::sleep(self.config.interval);
        }

        warn!(
            attempts = self.config.attempts,
            "port still in use after cleanup"
        );
        report
    }
}
