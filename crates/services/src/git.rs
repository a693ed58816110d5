//! Why the Git CLI and not a library binding
//!
//! The daemon never links Git. Status is read exclusively through the `git`
//! executable producing porcelain output on stdout: the CLI is the only
//! interface whose behavior matches what the user's other tools see (hooks,
//! sparse-checkout, replacement refs), and a crashed or wedged subprocess
//! cannot take the daemon down with it. `--no-optional-locks` keeps the
//! read from touching `index.lock`, so scans never contend with an editor
//! or IDE mid-operation.
//!
//! This module centralizes the command choice; callers get bytes, never a
//! command line. Keep it that way so the invocation can change without
//! touching the parser or the worker.

use std::{path::Path, process::Stdio, time::Duration};

use thiserror::Error;
use tokio::process::Command;

/// Upper bound for a single status scan; enormous repositories on cold
/// caches can take seconds, anything past this is treated as wedged.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum GitCliError {
    #[error("git executable not found or not runnable")]
    NotAvailable,
    #[error("git status timed out after {0:?}")]
    TimedOut(Duration),
    #[error("git command failed: {0}")]
    CommandFailed(String),
}

#[derive(Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self {}
    }

    /// True when a `git` executable is reachable through `PATH`.
    pub fn is_available() -> bool {
        which::which("git").is_ok()
    }

    /// Run `git --no-optional-locks status --porcelain -z -u --ignored` with
    /// the working directory set to `repo_root` and return the raw stdout
    /// bytes. `-z` keeps records NUL-terminated so paths with arbitrary
    /// bytes survive; `-u` lists untracked files individually; `--ignored`
    /// includes ignore-listed entries.
    ///
    /// The child is spawned with `kill_on_drop`, so cancelling the future
    /// (timeout, daemon shutdown) reaps the subprocess.
    pub async fn status_porcelain(&self, repo_root: &Path) -> Result<Vec<u8>, GitCliError> {
        let git = which::which("git").map_err(|_| GitCliError::NotAvailable)?;

        let mut cmd = Command::new(git);
        cmd.current_dir(repo_root)
            .args(["--no-optional-locks", "status", "--porcelain", "-z", "-u", "--ignored"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(STATUS_TIMEOUT, cmd.output())
            .await
            .map_err(|_| GitCliError::TimedOut(STATUS_TIMEOUT))?
            .map_err(|e| GitCliError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitCliError::CommandFailed(stderr));
        }

        Ok(output.stdout)
    }
}
