//! Feature-branch lifecycle over a [`GitRunner`]

use super::message::{commit_message, parse_porcelain};
use super::runner::{GitOutput, GitRunner};
use super::session::{GitSessionState, GitStatus};
use crate::config::GitConfig;
use crate::error::{RewindError, RewindResult, UnifiedError};
use crate::ids::{branch_name, is_valid_branch_name};
use chrono::{DateTime, TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts at finding a free branch name before giving up
const MAX_BRANCH_SUFFIX: usize = 100;

/// Field separator in `git log` output
const LOG_SEPARATOR: char = '\u{1f}';

/// Result of probing for git
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GitProbe {
    pub available: bool,
    pub is_repo: bool,
}

/// One commit from `git log`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLogEntry {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
}

/// Git session: probing, feature branch, commits, merge and cleanup
#[derive(Debug)]
pub struct GitIntegration {
    runner: Arc<dyn GitRunner>,
    config: GitConfig,
    state: GitSessionState,
    probe: Option<GitProbe>,
    original_branch: Option<String>,
    feature_branch: Option<String>,
}

impl GitIntegration {
    pub fn new(runner: Arc<dyn GitRunner>, config: GitConfig) -> Self {
        Self {
            runner,
            config,
            state: GitSessionState::Uninitialized,
            probe: None,
            original_branch: None,
            feature_branch: None,
        }
    }

    pub fn state(&self) -> GitSessionState {
        self.state
    }

    /// Whether snapshots should currently go through git
    pub fn is_usable(&self) -> bool {
        matches!(
            self.state,
            GitSessionState::GitReady
                | GitSessionState::FeatureBranchActive
                | GitSessionState::Merged
                | GitSessionState::Abandoned
        )
    }

    pub fn feature_branch(&self) -> Option<&str> {
        self.feature_branch.as_deref()
    }

    pub fn original_branch(&self) -> Option<&str> {
        self.original_branch.as_deref()
    }

    /// Current status for callers
    pub fn status(&self) -> GitStatus {
        let probe = self.probe.unwrap_or_default();
        GitStatus {
            git_available: probe.available,
            is_repo: probe.is_repo,
            original_branch: self.original_branch.clone(),
            feature_branch: self.feature_branch.clone(),
            state: self.state,
        }
    }

    /// Detect git and repository once per session
    pub async fn probe(&mut self) -> GitProbe {
        if let Some(probe) = self.probe {
            return probe;
        }

        let probe = if self.config.enabled {
            let available = matches!(self.runner.run(&["--version"]).await, Ok(out) if out.success());
            let is_repo = available
                && matches!(
                    self.runner.run(&["rev-parse", "--is-inside-work-tree"]).await,
                    Ok(out) if out.success() && out.stdout_trimmed() == "true"
                );
            GitProbe { available, is_repo }
        } else {
            GitProbe::default()
        };

        self.state = if probe.available && probe.is_repo {
            GitSessionState::GitReady
        } else {
            GitSessionState::FileOnly
        };
        info!(
            enabled = self.config.enabled,
            available = probe.available,
            is_repo = probe.is_repo,
            state = %self.state,
            "Probed git"
        );
        self.probe = Some(probe);
        probe
    }

    /// Stop using git for the rest of the session
    ///
    /// A feature branch opened earlier is left for the original branch when
    /// possible. If that checkout fails both branches stay recorded so
    /// [`switch_to_original_branch`](Self::switch_to_original_branch) can
    /// retry it.
    pub async fn degrade(&mut self, reason: &RewindError) {
        warn!(
            error = %reason,
            code = reason.error_code(),
            state = %self.state,
            "Git unavailable, falling back to file snapshots"
        );
        let opened = self.state == GitSessionState::FeatureBranchActive;
        self.state = GitSessionState::FileOnly;
        if !opened {
            return;
        }

        if let (Some(original), Some(feature)) =
            (self.original_branch.clone(), self.feature_branch.clone())
        {
            match self.git(&["checkout", &original]).await {
                Ok(_) => {
                    info!(branch = %feature, original = %original, "Returned to original branch");
                    self.feature_branch = None;
                }
                Err(e) => warn!(
                    branch = %feature,
                    original = %original,
                    error = %e,
                    "Could not return to original branch"
                ),
            }
        }
    }

    /// Open the session's feature branch, or return the open one
    pub async fn open_feature_branch(
        &mut self,
        instruction: &str,
        timestamp: DateTime<Utc>,
    ) -> RewindResult<String> {
        if self.state == GitSessionState::FeatureBranchActive {
            if let Some(branch) = &self.feature_branch {
                return Ok(branch.clone());
            }
        }
        if !self.state.can_open_branch() {
            return Err(RewindError::git(
                "checkout -b",
                format!("Cannot open a feature branch in state {}", self.state),
            ));
        }

        let original = self.current_branch().await?;
        let base = branch_name(&self.config.branch_prefix, timestamp, instruction);
        let branch = self.free_branch_name(&base).await?;

        self.git(&["checkout", "-b", &branch]).await?;
        info!(branch = %branch, original = %original, "Opened feature branch");

        self.original_branch = Some(original);
        self.feature_branch = Some(branch.clone());
        self.state = GitSessionState::FeatureBranchActive;
        Ok(branch)
    }

    async fn free_branch_name(&self, base: &str) -> RewindResult<String> {
        for attempt in 1..=MAX_BRANCH_SUFFIX {
            let candidate = if attempt == 1 {
                base.to_string()
            } else {
                format!("{}-{}", base, attempt)
            };
            if !is_valid_branch_name(&candidate) {
                return Err(RewindError::validation_field(
                    format!("Invalid branch name '{}'", candidate),
                    "branch_name",
                ));
            }
            let reference = format!("refs/heads/{}", candidate);
            let exists = self
                .runner
                .run(&["rev-parse", "--verify", "--quiet", &reference])
                .await?
                .success();
            if !exists {
                return Ok(candidate);
            }
        }
        Err(RewindError::git(
            "checkout -b",
            format!("No free branch name for '{}'", base),
        ))
    }

    /// Branch name of HEAD, or the commit hash when detached
    pub async fn current_branch(&self) -> RewindResult<String> {
        let name = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if name == "HEAD" {
            return self.head_commit().await;
        }
        Ok(name)
    }

    pub async fn head_commit(&self) -> RewindResult<String> {
        self.git(&["rev-parse", "HEAD"]).await
    }

    /// Paths with uncommitted changes
    pub async fn uncommitted_paths(&self) -> RewindResult<Vec<PathBuf>> {
        // Raw stdout: leading spaces are part of the status columns
        let output = self
            .checked(&["status", "--porcelain", "-z", "--untracked-files=all"])
            .await?;
        Ok(parse_porcelain(&output.stdout))
    }

    /// Commit all pending changes; `None` when the tree is clean
    pub async fn commit_pending(
        &self,
        instruction: &str,
        timestamp: DateTime<Utc>,
    ) -> RewindResult<Option<String>> {
        let files = self.uncommitted_paths().await?;
        if files.is_empty() {
            return Ok(None);
        }

        let message = commit_message(instruction, timestamp, &files);
        self.git(&["add", "-A"]).await?;
        self.git(&["commit", "--no-verify", "-m", &message]).await?;
        let hash = self.head_commit().await?;
        debug!(commit = %hash, files = files.len(), "Committed pending changes");
        Ok(Some(hash))
    }

    /// Whether `hash` names a commit in the repository
    pub async fn commit_exists(&self, hash: &str) -> RewindResult<bool> {
        validate_commit_hash(hash)?;
        let object = format!("{}^{{commit}}", hash);
        Ok(self.runner.run(&["cat-file", "-e", &object]).await?.success())
    }

    /// Hard-reset the working tree to `hash`
    pub async fn reset_hard(&self, hash: &str) -> RewindResult<()> {
        validate_commit_hash(hash)?;
        self.git(&["reset", "--hard", hash]).await?;
        info!(commit = %hash, "Reset working tree");
        Ok(())
    }

    /// `(status, path)` pairs that differ between `hash` and the working tree
    pub async fn diff_name_status(&self, hash: &str) -> RewindResult<Vec<(String, PathBuf)>> {
        validate_commit_hash(hash)?;
        let output = self.git(&["diff", "--name-status", hash]).await?;
        Ok(output
            .lines()
            .filter_map(|line| {
                let mut parts = line.split('\t');
                let status = parts.next()?.trim();
                let path = parts.last()?;
                (!status.is_empty()).then(|| (status.to_string(), PathBuf::from(path)))
            })
            .collect())
    }

    /// Recent commits on HEAD, newest first; with `since`, only commits not
    /// reachable from that ref
    pub async fn log(&self, limit: usize, since: Option<&str>) -> RewindResult<Vec<GitLogEntry>> {
        let max_count = format!("--max-count={}", limit.max(1));
        let mut args = vec!["log", max_count.as_str(), "--format=%H%x1f%at%x1f%s"];
        let range = since.map(|since| format!("{}..HEAD", since));
        if let Some(range) = &range {
            args.push(range);
        }
        let output = self.git(&args).await?;
        Ok(output.lines().filter_map(parse_log_line).collect())
    }

    /// Commits made on the open feature branch, newest first
    pub async fn session_log(&self, limit: usize) -> RewindResult<Vec<GitLogEntry>> {
        self.log(limit, self.original_branch.as_deref()).await
    }

    /// Check out `paths` as they were at `hash`, leaving everything else
    pub async fn checkout_paths(&self, hash: &str, paths: &[PathBuf]) -> RewindResult<()> {
        validate_commit_hash(hash)?;
        let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let mut args = vec!["checkout", hash, "--"];
        args.extend(paths.iter().map(String::as_str));
        self.git(&args).await?;
        Ok(())
    }

    /// Switch to the original branch and merge the feature branch into it
    pub async fn merge_feature_branch(&mut self) -> RewindResult<String> {
        let (original, feature) = self.active_branches("merge")?;

        if let Err(e) = self.commit_pending("session end", Utc::now()).await {
            warn!(error = %e, "Could not commit pending work before merge");
        }
        self.git(&["checkout", &original]).await?;
        if let Err(e) = self.git(&["merge", "--no-edit", &feature]).await {
            let _ = self.runner.run(&["merge", "--abort"]).await;
            return Err(e);
        }
        let merged = self.head_commit().await?;

        if let Err(e) = self.git(&["branch", "-d", &feature]).await {
            debug!(branch = %feature, error = %e, "Kept merged feature branch");
        }
        info!(branch = %feature, into = %original, commit = %merged, "Merged feature branch");

        self.feature_branch = None;
        self.state = GitSessionState::Merged;
        Ok(merged)
    }

    /// Return to the original branch without merging
    ///
    /// Also works after the session fell back to file snapshots while a
    /// feature branch was still checked out.
    pub async fn switch_to_original_branch(&mut self) -> RewindResult<()> {
        let (original, feature) = match (&self.original_branch, &self.feature_branch) {
            (Some(original), Some(feature)) => (original.clone(), feature.clone()),
            _ => {
                return Err(RewindError::git(
                    "checkout",
                    format!("No feature branch to leave (state {})", self.state),
                ));
            }
        };

        if let Err(e) = self.commit_pending("session abandoned", Utc::now()).await {
            warn!(error = %e, "Could not commit pending work before switching branch");
        }
        self.git(&["checkout", &original]).await?;
        info!(branch = %feature, original = %original, "Left feature branch without merging");
        if self.state == GitSessionState::FeatureBranchActive {
            self.state = GitSessionState::Abandoned;
        } else {
            self.feature_branch = None;
        }
        Ok(())
    }

    /// Delete the feature branch if git is active, HEAD is on it, and the
    /// working tree is clean right before deletion. Returns whether the
    /// branch was deleted.
    pub async fn cleanup(&mut self) -> RewindResult<bool> {
        if self.state != GitSessionState::FeatureBranchActive {
            debug!(state = %self.state, "Skipping git cleanup: no active feature branch");
            return Ok(false);
        }
        let (original, feature) = self.active_branches("branch -D")?;

        if self.current_branch().await? != feature {
            debug!(branch = %feature, "Skipping git cleanup: HEAD is not on the feature branch");
            return Ok(false);
        }
        let dirty = self.uncommitted_paths().await?;
        if !dirty.is_empty() {
            warn!(
                branch = %feature,
                uncommitted = dirty.len(),
                "Skipping git cleanup: uncommitted changes"
            );
            return Ok(false);
        }

        self.git(&["checkout", &original]).await?;
        self.git(&["branch", "-D", &feature]).await?;
        info!(branch = %feature, "Deleted feature branch");

        self.feature_branch = None;
        self.state = GitSessionState::Abandoned;
        Ok(true)
    }

    fn active_branches(&self, command: &str) -> RewindResult<(String, String)> {
        match (&self.original_branch, &self.feature_branch) {
            (Some(original), Some(feature)) if self.state == GitSessionState::FeatureBranchActive => {
                Ok((original.clone(), feature.clone()))
            }
            _ => Err(RewindError::git(
                command,
                format!("No active feature branch (state {})", self.state),
            )),
        }
    }

    /// Run git and return trimmed stdout, failing on non-zero exit
    async fn git(&self, args: &[&str]) -> RewindResult<String> {
        let output = self.checked(args).await?;
        Ok(output.stdout_trimmed().to_string())
    }

    async fn checked(&self, args: &[&str]) -> RewindResult<GitOutput> {
        let output: GitOutput = self.runner.run(args).await?;
        if !output.success() {
            return Err(RewindError::git_failed(
                format!("git {}", args.first().copied().unwrap_or_default()),
                output.code,
                output.stderr,
            ));
        }
        Ok(output)
    }
}

fn validate_commit_hash(hash: &str) -> RewindResult<()> {
    let valid = (4..=64).contains(&hash.len()) && hash.chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(RewindError::validation_field(
            format!("Invalid commit hash '{}'", hash),
            "commit_hash",
        ))
    }
}

fn parse_log_line(line: &str) -> Option<GitLogEntry> {
    let mut fields = line.splitn(3, LOG_SEPARATOR);
    let hash = fields.next()?.trim().to_string();
    let seconds: i64 = fields.next()?.trim().parse().ok()?;
    let subject = fields.next().unwrap_or_default().to_string();
    let timestamp = Utc.timestamp_opt(seconds, 0).single()?;
    (!hash.is_empty()).then_some(GitLogEntry {
        hash,
        timestamp,
        subject,
    })
}
