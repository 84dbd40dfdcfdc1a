//! Capacity enforcement and reference repair

use super::engine::DifferentialStore;
use super::types::{
    DifferentialRecord, EntryPayload, EvictionReport, FileEntry, ReferenceRepairWarning,
};
use crate::error::{RewindError, RewindResult};
use crate::tracking::VersionEntry;
use crate::types::SnapshotId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a removed holder's bytes went: old path -> new (record, path)
type MovedContent = HashMap<PathBuf, (SnapshotId, PathBuf)>;

impl DifferentialStore {
    /// Evict oldest-first until `incoming` bytes (and one more record, if
    /// `adds_record`) fit. Protected records are never evicted.
    ///
    /// A request larger than the limit, or larger than what the protected
    /// records leave free, is rejected before anything is evicted.
    pub(super) fn ensure_capacity(
        &mut self,
        incoming: u64,
        adds_record: bool,
        protected: &[SnapshotId],
    ) -> RewindResult<EvictionReport> {
        if incoming > self.memory_limit {
            return Err(RewindError::capacity(
                format!(
                    "Snapshot content needs {} bytes but the memory limit is {} bytes",
                    incoming, self.memory_limit
                ),
                incoming,
                self.memory_limit,
            ));
        }

        let protected: HashSet<&SnapshotId> = protected
            .iter()
            .filter(|id| self.records.contains_key(*id))
            .collect();
        let protected_usage: u64 = protected
            .iter()
            .filter_map(|id| self.records.get(*id))
            .map(|r| r.memory_cost())
            .sum();
        if protected_usage + incoming > self.memory_limit
            || protected.len() + usize::from(adds_record) > self.max_snapshots
        {
            return Err(RewindError::capacity(
                format!(
                    "Cannot make room for {} bytes: {} bytes are held by snapshots in use",
                    incoming, protected_usage
                ),
                protected_usage + incoming,
                self.memory_limit,
            ));
        }

        let mut report = EvictionReport::default();
        while self.over_capacity(incoming, adds_record) {
            let Some(victim) = self.oldest_evictable(&protected) else {
                return Err(RewindError::capacity(
                    format!(
                        "Cannot make room for {} bytes after evicting {} snapshots",
                        incoming,
                        report.evicted.len()
                    ),
                    self.usage + incoming,
                    self.memory_limit,
                ));
            };
            info!(
                snapshot_id = %victim,
                usage = self.usage,
                limit = self.memory_limit,
                count = self.records.len(),
                "Evicting snapshot to stay within capacity"
            );
            report.merge(self.remove_with_repair(&victim));
        }
        Ok(report)
    }

    fn oldest_evictable(&self, protected: &HashSet<&SnapshotId>) -> Option<SnapshotId> {
        self.records
            .values()
            .filter(|r| !protected.contains(&r.id))
            .min_by_key(|r| r.sequence)
            .map(|r| r.id.clone())
    }

    /// Remove a record and keep every survivor reconstructible
    ///
    /// The removed record's entries are folded into its children (a child's
    /// own entries win, except references to the removed entry, which take
    /// its bytes) and the children inherit its base. Remaining references to
    /// the removed record are then pointed at the folded copy, or at any
    /// other record holding the same checksum. References with no remaining
    /// copy become [`EntryPayload::Dropped`] and are reported.
    pub(super) fn remove_with_repair(&mut self, id: &SnapshotId) -> EvictionReport {
        let Some(removed) = self.records.remove(id) else {
            return EvictionReport::default();
        };

        let moved = self.fold_into_children(&removed);
        let warnings = self.repair_references(id, None, &moved);
        self.recompute_usage();

        for warning in &warnings {
            warn!(
                referencing_id = %warning.referencing_id,
                holder_id = %warning.holder_id,
                path = %warning.path.display(),
                "Reference lost its content holder"
            );
        }
        EvictionReport {
            evicted: vec![removed.id],
            warnings,
        }
    }

    /// Remove one entry from a live record and repair references to it
    pub(super) fn detach_entry(
        &mut self,
        id: &SnapshotId,
        path: &Path,
    ) -> Vec<ReferenceRepairWarning> {
        let removed = self
            .records
            .get_mut(id)
            .and_then(|record| record.entries.remove(path));
        if removed.is_none() {
            return Vec::new();
        }
        let paths = BTreeSet::from([path.to_path_buf()]);
        let warnings = self.repair_references(id, Some(&paths), &MovedContent::new());
        self.recompute_usage();
        warnings
    }

    fn fold_into_children(&mut self, removed: &DifferentialRecord) -> MovedContent {
        let mut children: Vec<(u64, SnapshotId)> = self
            .records
            .values()
            .filter(|r| r.base_id.as_ref() == Some(&removed.id))
            .map(|r| (r.sequence, r.id.clone()))
            .collect();
        children.sort();
        let children: Vec<SnapshotId> = children.into_iter().map(|(_, id)| id).collect();

        for child_id in &children {
            if let Some(child) = self.records.get_mut(child_id) {
                child.base_id = removed.base_id.clone();
                child.kind = removed.kind;
            }
        }

        let mut moved = MovedContent::new();
        for (path, entry) in &removed.entries {
            // Children without the path, or only referencing this entry
            let recipients: Vec<SnapshotId> = children
                .iter()
                .filter(|c| {
                    self.records.get(*c).is_some_and(|r| {
                        r.entries
                            .get(path)
                            .is_none_or(|e| e.payload.is_reference_to(&removed.id, path))
                    })
                })
                .cloned()
                .collect();
            let Some((first, rest)) = recipients.split_first() else {
                continue;
            };

            if let Some(record) = self.records.get_mut(first) {
                inherit(record, path, entry.clone());
            }
            let shared = match (&entry.payload, &entry.checksum) {
                (EntryPayload::Content(bytes), Some(checksum)) => {
                    moved.insert(path.clone(), (first.clone(), path.clone()));
                    FileEntry::reference(
                        checksum.clone(),
                        bytes.len() as u64,
                        first.clone(),
                        path.clone(),
                    )
                }
                _ => entry.clone(),
            };
            for child_id in rest {
                if let Some(record) = self.records.get_mut(child_id) {
                    inherit(record, path, shared.clone());
                }
            }
        }
        moved
    }

    /// Point references at `holder` (restricted to `paths` when given) at a
    /// surviving copy, and do the same for the checksum index
    fn repair_references(
        &mut self,
        holder: &SnapshotId,
        paths: Option<&BTreeSet<PathBuf>>,
        moved: &MovedContent,
    ) -> Vec<ReferenceRepairWarning> {
        let targets_holder = |payload: &EntryPayload| match payload {
            EntryPayload::Reference { snapshot_id, path } => {
                snapshot_id == holder && paths.is_none_or(|p| p.contains(path))
            }
            _ => false,
        };

        // (sequence, referencing record, entry path, old target path, checksum)
        let mut broken: Vec<(u64, SnapshotId, PathBuf, PathBuf, Option<String>)> = Vec::new();
        for record in self.records.values() {
            for (path, entry) in &record.entries {
                if targets_holder(&entry.payload) {
                    if let Some((_, target)) = entry.reference_target() {
                        broken.push((
                            record.sequence,
                            record.id.clone(),
                            path.clone(),
                            target.to_path_buf(),
                            entry.checksum.clone(),
                        ));
                    }
                }
            }
        }

        broken.sort();

        let mut warnings = Vec::new();
        for (_, record_id, path, target, checksum) in broken {
            let replacement = moved.get(&target).cloned().or_else(|| {
                checksum
                    .as_deref()
                    .and_then(|c| self.find_concrete(c))
                    .map(|v| (v.snapshot_id, v.path))
            });
            let Some(entry) = self
                .records
                .get_mut(&record_id)
                .and_then(|r| r.entries.get_mut(&path))
            else {
                continue;
            };
            match replacement {
                Some((snapshot_id, new_path)) => {
                    entry.payload = EntryPayload::Reference {
                        snapshot_id,
                        path: new_path,
                    };
                }
                None => {
                    entry.payload = EntryPayload::Dropped;
                    warnings.push(ReferenceRepairWarning {
                        holder_id: holder.clone(),
                        referencing_id: record_id,
                        path,
                        checksum,
                    });
                }
            }
        }

        let stale: Vec<(String, PathBuf)> = self
            .tracker
            .checksums_held_by(holder)
            .into_iter()
            .filter_map(|checksum| {
                let entry = self.tracker.lookup(&checksum)?;
                let path = entry.path.clone();
                paths
                    .is_none_or(|p| p.contains(&path))
                    .then_some((checksum, path))
            })
            .collect();
        for (checksum, path) in stale {
            let size = self.tracker.lookup(&checksum).map_or(0, |e| e.size);
            let replacement = match moved.get(&path) {
                Some((snapshot_id, new_path)) => Some(VersionEntry {
                    snapshot_id: snapshot_id.clone(),
                    path: new_path.clone(),
                    size,
                }),
                None => self.find_concrete(&checksum),
            };
            match replacement {
                Some(entry) => self.tracker.repoint(&checksum, entry),
                None => {
                    self.tracker.forget(&checksum);
                }
            }
        }

        warnings
    }

    /// Earliest record entry still holding bytes for `checksum`
    fn find_concrete(&self, checksum: &str) -> Option<VersionEntry> {
        let mut records: Vec<&DifferentialRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.sequence);
        records.into_iter().find_map(|record| {
            record.entries.iter().find_map(|(path, entry)| {
                let bytes = entry.concrete()?;
                (entry.checksum.as_deref() == Some(checksum)).then(|| VersionEntry {
                    snapshot_id: record.id.clone(),
                    path: path.clone(),
                    size: bytes.len() as u64,
                })
            })
        })
    }
}

/// Give `record` the folded entry at `path`; a reference it already had
/// keeps its own action label
fn inherit(record: &mut DifferentialRecord, path: &Path, folded: FileEntry) {
    match record.entries.get_mut(path) {
        Some(existing) => existing.payload = folded.payload,
        None => {
            record.entries.insert(path.to_path_buf(), folded);
        }
    }
}
