//! Git session state

use serde::{Deserialize, Serialize};

/// Lifecycle of the git strategy within one session
///
/// ```text
/// Uninitialized -> GitReady | FileOnly
/// GitReady -> FeatureBranchActive (first snapshot)
/// FeatureBranchActive -> Merged | Abandoned
/// Merged | Abandoned -> FeatureBranchActive (next snapshot)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitSessionState {
    /// Availability not probed yet
    Uninitialized,
    /// Git available inside a repository, no branch opened yet
    GitReady,
    /// Git disabled, missing, or not a repository
    FileOnly,
    FeatureBranchActive,
    /// Feature branch merged into the original branch
    Merged,
    /// Returned to the original branch without merging
    Abandoned,
}

impl GitSessionState {
    /// Whether a feature branch can be opened from this state
    pub fn can_open_branch(&self) -> bool {
        matches!(self, Self::GitReady | Self::Merged | Self::Abandoned)
    }
}

impl std::fmt::Display for GitSessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::GitReady => "git_ready",
            Self::FileOnly => "file_only",
            Self::FeatureBranchActive => "feature_branch_active",
            Self::Merged => "merged",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{}", name)
    }
}

/// Git status as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    pub git_available: bool,
    pub is_repo: bool,
    pub original_branch: Option<String>,
    pub feature_branch: Option<String>,
    pub state: GitSessionState,
}
