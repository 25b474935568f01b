//! Codex CLI process spawning and control.
//!
//! The child gets a closed stdin and piped stdout/stderr. Termination is
//! SIGTERM first, SIGKILL after a timeout.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::cli::Invocation;

/// Default timeout for graceful process termination.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// A running Codex CLI process.
#[derive(Debug)]
pub struct CodexProcess {
    child: Child,
}

impl CodexProcess {
    /// Spawn the process described by `invocation`.
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error if the process fails to spawn; callers
    /// classify it.
    pub fn spawn(invocation: &Invocation) -> std::io::Result<Self> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .env_clear()
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = invocation.cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn()?;
        tracing::debug!(
            program = %invocation.program.display(),
            pid = ?child.id(),
            args = invocation.args.len(),
            "Spawned codex process"
        );

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the process to stop without waiting for it.
    ///
    /// On Unix this sends SIGTERM; elsewhere it starts a kill.
    pub fn request_termination(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.id() {
                let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
                if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
                    tracing::debug!(pid, error = %e, "SIGTERM failed");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }
    }

    /// Wait for exit, killing the process if it outlives `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting or killing fails.
    pub async fn wait_or_kill(&mut self, timeout: Duration) -> std::io::Result<ExitStatus> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(pid = ?self.id(), "Process ignored SIGTERM, killing");
                self.child.kill().await?;
                self.child.wait().await
            }
        }
    }

    /// Start killing the process without waiting for it.
    pub fn start_kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(pid = ?self.id(), error = %e, "Kill failed");
        }
    }
}
