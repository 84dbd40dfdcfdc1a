//! Chain walking and state reconstruction

use super::engine::DifferentialStore;
use super::types::{EntryPayload, FileAction};
use crate::error::{RewindError, RewindResult};
use crate::types::SnapshotId;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Full file state of a record after replaying its chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructedState {
    pub files: BTreeMap<PathBuf, Vec<u8>>,
    /// Paths whose content was lost during eviction
    pub lost: BTreeSet<PathBuf>,
    /// Records replayed, newest first
    pub chain: Vec<SnapshotId>,
}

impl ReconstructedState {
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    pub fn is_lost(&self, path: impl AsRef<Path>) -> bool {
        self.lost.contains(path.as_ref())
    }
}

impl DifferentialStore {
    /// Record ids from `id` down to its full base, newest first
    ///
    /// Fails on a missing record, a missing base, or a cycle.
    pub fn chain(&self, id: &SnapshotId) -> RewindResult<Vec<SnapshotId>> {
        if !self.records.contains_key(id) {
            return Err(RewindError::not_found_resource(
                format!("Snapshot {} not found", id),
                "snapshot",
            ));
        }

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = id.clone();
        loop {
            if !visited.insert(current.clone()) {
                return Err(RewindError::storage_with_context(
                    format!("Cycle in base chain at {}", current),
                    format!("reconstructing {}", id),
                ));
            }
            let record = self.records.get(&current).ok_or_else(|| {
                RewindError::storage_with_context(
                    format!("Base record {} is missing", current),
                    format!("reconstructing {}", id),
                )
            })?;
            chain.push(current.clone());
            if record.is_full() {
                return Ok(chain);
            }
            current = record.base_id.clone().ok_or_else(|| {
                RewindError::storage_with_context(
                    format!("Differential record {} has no base", record.id),
                    format!("reconstructing {}", id),
                )
            })?;
        }
    }

    /// Number of records replayed to reconstruct `id`
    pub fn chain_len(&self, id: &SnapshotId) -> RewindResult<usize> {
        self.chain(id).map(|c| c.len())
    }

    /// Replay the chain from its full base up to `id`
    pub fn reconstruct(&self, id: &SnapshotId) -> RewindResult<ReconstructedState> {
        let chain = self.chain(id)?;
        let mut state = ReconstructedState::default();

        for record_id in chain.iter().rev() {
            let Some(record) = self.records.get(record_id) else {
                continue;
            };
            for (path, entry) in &record.entries {
                match &entry.payload {
                    EntryPayload::Content(bytes) => {
                        state.files.insert(path.clone(), bytes.clone());
                        state.lost.remove(path);
                    }
                    EntryPayload::Reference {
                        snapshot_id,
                        path: target,
                    } => {
                        let bytes = self.resolve_reference(snapshot_id, target, entry.checksum.as_deref())?;
                        state.files.insert(path.clone(), bytes.to_vec());
                        state.lost.remove(path);
                    }
                    EntryPayload::Absent => {
                        state.files.remove(path);
                        state.lost.remove(path);
                    }
                    EntryPayload::Dropped => {
                        state.files.remove(path);
                        state.lost.insert(path.clone());
                    }
                }
            }
        }

        state.chain = chain;
        Ok(state)
    }

    fn resolve_reference(
        &self,
        holder: &SnapshotId,
        path: &Path,
        checksum: Option<&str>,
    ) -> RewindResult<&[u8]> {
        let entry = self
            .records
            .get(holder)
            .and_then(|r| r.entries.get(path))
            .ok_or_else(|| {
                RewindError::storage(format!(
                    "Reference to {}:{} has no target",
                    holder,
                    path.display()
                ))
            })?;
        let bytes = entry.concrete().ok_or_else(|| {
            RewindError::storage(format!(
                "Reference to {}:{} points at another reference",
                holder,
                path.display()
            ))
        })?;
        if entry.checksum.as_deref() != checksum {
            return Err(RewindError::storage(format!(
                "Reference to {}:{} has mismatched checksum",
                holder,
                path.display()
            )));
        }
        Ok(bytes)
    }

    /// Whether `path` exists in the state of `id`, judged by the newest
    /// record in the chain that mentions it
    pub(super) fn path_exists_in_chain(&self, id: &SnapshotId, path: &Path) -> bool {
        let Ok(chain) = self.chain(id) else {
            return false;
        };
        chain
            .iter()
            .filter_map(|record_id| self.records.get(record_id))
            .find_map(|record| record.entries.get(path))
            .is_some_and(|entry| entry.action != FileAction::Deleted)
    }
}
