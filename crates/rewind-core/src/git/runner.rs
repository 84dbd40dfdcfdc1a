//! Git subprocess execution

use crate::config::GitConfig;
use crate::error::{RewindError, RewindResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Captured result of one git invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// Exit code; `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Runs git with discrete arguments
///
/// Implementations return `Ok` for any exit status and reserve `Err` for
/// failing to run git at all (missing binary, timeout).
#[async_trait]
pub trait GitRunner: Send + Sync + std::fmt::Debug {
    async fn run(&self, args: &[&str]) -> RewindResult<GitOutput>;
}

/// [`GitRunner`] backed by the git executable
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
    work_dir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(binary: impl Into<String>, work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
            timeout,
        }
    }

    pub fn from_config(config: &GitConfig, work_dir: &Path) -> Self {
        Self::new(&config.binary, work_dir, config.command_timeout)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

#[async_trait]
impl GitRunner for GitCli {
    async fn run(&self, args: &[&str]) -> RewindResult<GitOutput> {
        let command_line = format!("git {}", args.join(" "));
        debug!(command = %command_line, dir = %self.work_dir.display(), "Running git");

        let child = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.work_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RewindError::git(&command_line, format!("Failed to start {}: {}", self.binary, e))
            })?;

        // Dropping the child on timeout kills it
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                RewindError::git(&command_line, format!("Failed to wait for git: {}", e))
            })?,
            Err(_) => {
                return Err(RewindError::timeout_with_context(
                    self.timeout.as_secs(),
                    command_line,
                ));
            }
        };

        Ok(GitOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
