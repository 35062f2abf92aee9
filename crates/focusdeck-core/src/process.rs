//! Process control - start executables and stop processes by name.
//!
//! The OS is reached through the [`ProcessTable`] trait. [`SystemProcessTable`]
//! is the real implementation on top of `sysinfo`; tests swap in an in-memory
//! table.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessStatus, System};
use tokio::time::{Instant, sleep};
use tracing::{Span, debug, error, info, warn};

use crate::config::{ProcessSettings, TerminationMethod, split_patterns};
use crate::{Error, Result};

/// Granularity of the graceful-exit wait
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// OS process operations used by [`ProcessController`]
pub trait ProcessTable: Send + Sync {
    /// PIDs of live processes whose name matches `name`.
    fn find(&self, name: &str) -> Vec<u32>;

    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the process to exit (SIGTERM, or a window close request on Windows).
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be delivered.
    fn request_close(&self, pid: u32) -> io::Result<()>;

    /// Terminate the process immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refused the kill.
    fn kill(&self, pid: u32) -> io::Result<()>;

    /// Launch `path` with `args`, detached from our lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable could not be spawned.
    fn spawn(&self, path: &Path, args: &[String]) -> io::Result<u32>;
}

/// Name comparison key: case-insensitive, trailing `.exe` ignored.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// [`ProcessTable`] backed by the live OS process list
pub struct SystemProcessTable {
    system: Mutex<System>,
}

impl SystemProcessTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn find(&self, name: &str) -> Vec<u32> {
        let wanted = normalize_name(name);
        let mut system = self.system.lock();
        system.refresh_processes();

        system
            .processes()
            .iter()
            .filter(|(_, p)| p.status() != ProcessStatus::Zombie)
            .filter(|(_, p)| normalize_name(p.name()) == wanted)
            .map(|(pid, _)| pid.as_u32())
            .collect()
    }

    fn is_alive(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return false;
        }
        system
            .process(pid)
            .is_some_and(|p| p.status() != ProcessStatus::Zombie)
    }

    #[cfg(not(windows))]
    fn request_close(&self, pid: u32) -> io::Result<()> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        if !system.refresh_process(sys_pid) {
            return Ok(());
        }
        let Some(process) = system.process(sys_pid) else {
            return Ok(());
        };

        match process.kill_with(sysinfo::Signal::Term) {
            Some(true) => Ok(()),
            Some(false) => Err(io::Error::other(format!("SIGTERM to {pid} failed"))),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "SIGTERM is not supported on this platform",
            )),
        }
    }

    #[cfg(windows)]
    fn request_close(&self, pid: u32) -> io::Result<()> {
        // taskkill without /F posts WM_CLOSE to the process's windows
        let status = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("taskkill /PID {pid} exited with {status}")))
        }
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        if !system.refresh_process(sys_pid) {
            return Ok(());
        }
        let Some(process) = system.process(sys_pid) else {
            return Ok(());
        };

        if process.kill() {
            Ok(())
        } else {
            Err(io::Error::other(format!("kill of {pid} failed")))
        }
    }

    fn spawn(&self, path: &Path, args: &[String]) -> io::Result<u32> {
        let mut command = tokio::process::Command::new(path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let child = command.spawn()?;
        child
            .id()
            .ok_or_else(|| io::Error::other("spawned process exited before reporting a pid"))
    }
}

/// Result of [`ProcessController::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Every matching process exited
    Stopped,
    /// Nothing matched; treated as success
    NotRunning,
    /// At least one matching process is still running
    Failed,
}

impl StopOutcome {
    #[must_use]
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Starts and stops OS processes
#[derive(Clone)]
pub struct ProcessController {
    table: Arc<dyn ProcessTable>,
    poll_interval: Duration,
    span: Span,
}

impl ProcessController {
    #[must_use]
    pub fn new(table: Arc<dyn ProcessTable>, span: Span) -> Self {
        Self {
            table,
            poll_interval: POLL_INTERVAL,
            span,
        }
    }

    /// Controller over the live OS process list.
    #[must_use]
    pub fn system(span: Span) -> Self {
        Self::new(Arc::new(SystemProcessTable::new()), span)
    }

    /// Same process table, different log span.
    #[must_use]
    pub fn with_span(&self, span: Span) -> Self {
        Self {
            span,
            ..self.clone()
        }
    }

    /// Launch an executable. Success means the launch happened, not that the
    /// process is still alive.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is empty, does not exist, or cannot be spawned.
    pub fn start(&self, path: &str, args: &[String]) -> Result<u32> {
        let _guard = self.span.enter();

        if path.trim().is_empty() {
            error!("Cannot start process: no executable path configured");
            return Err(Error::Config("empty executable path".to_string()));
        }

        let exe = Path::new(path);
        if !exe.exists() {
            error!("Cannot start process: {} does not exist", path);
            return Err(Error::Process(format!("executable not found: {path}")));
        }

        match self.table.spawn(exe, args) {
            Ok(pid) => {
                info!("Started {} (pid {})", path, pid);
                Ok(pid)
            }
            Err(e) => {
                error!("Failed to start {}: {}", path, e);
                Err(Error::Process(format!("failed to spawn {path}: {e}")))
            }
        }
    }

    /// Launch the executable described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments do not parse or [`start`](Self::start)
    /// fails.
    pub fn launch(&self, settings: &ProcessSettings) -> Result<u32> {
        let args = settings.args().inspect_err(|e| {
            self.span
                .in_scope(|| error!("Not starting {}: {}", settings.path, e));
        })?;
        self.start(&settings.path, &args)
    }

    /// Start the configured executable unless a matching process already runs.
    /// Returns whether the process is (now) running or was launched.
    #[must_use]
    pub fn ensure_running(&self, settings: &ProcessSettings) -> bool {
        if settings.has_process_name() && self.is_running(&settings.process_name) {
            self.span.in_scope(|| {
                info!("{} is already running", settings.process_name);
            });
            return true;
        }
        self.launch(settings).is_ok()
    }

    /// Whether any process matches the `|`-separated pattern list.
    #[must_use]
    pub fn is_running(&self, pattern: &str) -> bool {
        split_patterns(pattern)
            .into_iter()
            .any(|name| !self.table.find(name).is_empty())
    }

    /// Stop every process matching the `|`-separated pattern list.
    pub async fn stop(
        &self,
        pattern: &str,
        method: TerminationMethod,
        timeout: Duration,
    ) -> StopOutcome {
        let pids: BTreeSet<u32> = split_patterns(pattern)
            .into_iter()
            .flat_map(|name| self.table.find(name))
            .collect();

        if pids.is_empty() {
            self.span
                .in_scope(|| info!("{} is not running, nothing to stop", pattern));
            return StopOutcome::NotRunning;
        }

        let mut all_stopped = true;
        for pid in pids {
            let stopped = match method {
                TerminationMethod::Graceful => self.stop_graceful(pid, timeout).await,
                TerminationMethod::Force => self.stop_force(pid),
                TerminationMethod::Auto => {
                    if self.stop_graceful(pid, timeout).await {
                        true
                    } else {
                        self.span.in_scope(|| {
                            warn!("{} (pid {}) ignored close request, forcing", pattern, pid);
                        });
                        self.stop_force(pid)
                    }
                }
            };

            if !stopped {
                self.span.in_scope(|| {
                    error!("Failed to stop {} (pid {}) with method {}", pattern, pid, method);
                });
                all_stopped = false;
            }
        }

        if all_stopped {
            self.span
                .in_scope(|| info!("Stopped {} ({})", pattern, method));
            StopOutcome::Stopped
        } else {
            StopOutcome::Failed
        }
    }

    /// Close request on the blocking pool; taskkill waits on a child process.
    async fn request_close(&self, pid: u32) -> io::Result<()> {
        let table = Arc::clone(&self.table);
        tokio::task::spawn_blocking(move || table.request_close(pid))
            .await
            .map_err(io::Error::other)?
    }

    async fn stop_graceful(&self, pid: u32, timeout: Duration) -> bool {
        if let Err(e) = self.request_close(pid).await {
            self.span
                .in_scope(|| warn!("Close request to pid {} failed: {}", pid, e));
            return false;
        }

        let deadline = Instant::now() + timeout;
        loop {
            if !self.table.is_alive(pid) {
                self.span
                    .in_scope(|| debug!("pid {} exited after close request", pid));
                return true;
            }
            if Instant::now() >= deadline {
                self.span.in_scope(|| {
                    debug!("pid {} still alive after {:?}", pid, timeout);
                });
                return false;
            }
            sleep(self.poll_interval).await;
        }
    }

    fn stop_force(&self, pid: u32) -> bool {
        match self.table.kill(pid) {
            Ok(()) => true,
            Err(e) => {
                self.span
                    .in_scope(|| warn!("Kill of pid {} failed: {}", pid, e));
                false
            }
        }
    }
}
