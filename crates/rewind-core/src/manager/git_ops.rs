//! Session lifecycle and user-invoked git actions

use super::types::SnapshotManager;
use crate::error::RewindResult;
use crate::git::{GitSessionState, GitStatus};
use chrono::Utc;
use tracing::{info, warn};

impl SnapshotManager {
    /// Probe git, sweep stale mirror temp files and prune orphaned blobs
    pub async fn start(&self) -> RewindResult<()> {
        let mut state = self.state.lock().await;
        let probe = state.git.probe().await;

        if let Some(mirror) = &self.mirror {
            match mirror.sweep_temp().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Swept stale mirror temp files"),
                Err(e) => warn!(error = %e, "Failed to sweep mirror temp files"),
            }
            match mirror.prune_blobs().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Pruned unreferenced mirror blobs"),
                Err(e) => warn!(error = %e, "Failed to prune mirror blobs"),
            }
        }

        info!(
            session_id = %self.session_id,
            git_available = probe.available,
            is_repo = probe.is_repo,
            "Snapshot manager started"
        );
        Ok(())
    }

    /// Finish the session
    ///
    /// With `git.auto_cleanup` a clean feature branch is deleted; otherwise
    /// pending work is committed to it. The mirror index is rewritten.
    pub async fn shutdown(&self) -> RewindResult<()> {
        let mut state = self.state.lock().await;

        if state.git.state() == GitSessionState::FeatureBranchActive {
            let mut cleaned = false;
            if self.config.git.auto_cleanup {
                match state.git.cleanup().await {
                    Ok(done) => cleaned = done,
                    Err(e) => warn!(error = %e, "Git cleanup failed"),
                }
            }
            if !cleaned {
                let instruction = state
                    .active
                    .as_ref()
                    .and_then(|id| state.index.get(id))
                    .map_or_else(|| "session end".to_string(), |m| m.instruction.clone());
                match state.git.commit_pending(&instruction, Utc::now()).await {
                    Ok(Some(hash)) => info!(commit = %hash, "Committed pending work on shutdown"),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Failed to commit pending work on shutdown"),
                }
            }
        }

        if let Some(mirror) = &self.mirror {
            let ids: Vec<_> = state
                .index
                .newest_first()
                .into_iter()
                .map(|meta| meta.id.clone())
                .collect();
            if let Err(e) = mirror.write_index(&ids).await {
                warn!(error = %e, "Failed to write mirror index");
            }
        }

        state.active = None;
        info!(session_id = %self.session_id, "Snapshot manager shut down");
        Ok(())
    }

    /// Merge the feature branch into the original branch
    pub async fn merge_feature_branch(&self) -> RewindResult<String> {
        self.state.lock().await.git.merge_feature_branch().await
    }

    /// Return to the original branch, leaving the feature branch unmerged
    pub async fn switch_to_original_branch(&self) -> RewindResult<()> {
        self.state.lock().await.git.switch_to_original_branch().await
    }

    /// Delete a clean feature branch; returns whether it was deleted
    pub async fn cleanup_git_session(&self) -> RewindResult<bool> {
        self.state.lock().await.git.cleanup().await
    }

    /// Git availability, branches and session state
    pub async fn git_status(&self) -> GitStatus {
        self.state.lock().await.git.status()
    }
}
