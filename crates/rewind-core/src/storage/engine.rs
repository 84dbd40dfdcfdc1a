//! Record arena with deduplicating, capacity-checked writes

use super::types::{
    AppendOutcome, CapacityState, DifferentialRecord, ENTRY_OVERHEAD, EvictionReport, FileAction,
    FileEntry, RECORD_OVERHEAD, RecordKind, SnapshotPayload, StoreReceipt,
};
use crate::checksum::ChecksumAlgorithm;
use crate::config::StorageConfig;
use crate::error::{RewindError, RewindResult};
use crate::tracking::{FileVersionTracker, VersionEntry};
use crate::types::SnapshotId;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Worst-case size of a back-reference's holder id, used when estimating
/// how much space a write may need before dedup is known
const REFERENCE_ID_ESTIMATE: u64 = 64;

/// In-memory differential storage engine
///
/// Not internally synchronized; the snapshot manager wraps it in a lock.
#[derive(Debug)]
pub struct DifferentialStore {
    pub(super) records: HashMap<SnapshotId, DifferentialRecord>,
    pub(super) tracker: FileVersionTracker,
    pub(super) usage: u64,
    pub(super) max_snapshots: usize,
    pub(super) memory_limit: u64,
    algorithm: ChecksumAlgorithm,
    next_sequence: u64,
}

impl DifferentialStore {
    /// Create an empty store
    pub fn new(max_snapshots: usize, memory_limit: u64, algorithm: ChecksumAlgorithm) -> Self {
        Self {
            records: HashMap::new(),
            tracker: FileVersionTracker::new(),
            usage: 0,
            max_snapshots: max_snapshots.max(1),
            memory_limit,
            algorithm,
            next_sequence: 0,
        }
    }

    /// Create a store from storage configuration
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            config.max_snapshots,
            config.memory_limit_bytes,
            config.checksum,
        )
    }

    /// Store a self-contained record
    pub fn store(&mut self, payload: SnapshotPayload) -> RewindResult<StoreReceipt> {
        self.store_record(payload, None)
    }

    /// Store a record holding only the differences from `base_id`
    pub fn store_differential(
        &mut self,
        payload: SnapshotPayload,
        base_id: &SnapshotId,
    ) -> RewindResult<StoreReceipt> {
        if !self.records.contains_key(base_id) {
            return Err(RewindError::not_found_resource(
                format!("Base snapshot {} not found", base_id),
                "snapshot",
            ));
        }
        self.store_record(payload, Some(base_id.clone()))
    }

    fn store_record(
        &mut self,
        payload: SnapshotPayload,
        base_id: Option<SnapshotId>,
    ) -> RewindResult<StoreReceipt> {
        let id = payload
            .id
            .ok_or_else(|| RewindError::validation_field("Snapshot payload has no id", "id"))?;
        if id.as_str().trim().is_empty() {
            return Err(RewindError::validation_field("Snapshot id is empty", "id"));
        }
        if self.records.contains_key(&id) {
            return Err(RewindError::validation_field(
                format!("Snapshot {} is already stored", id),
                "id",
            ));
        }
        if base_id.as_ref() == Some(&id) {
            return Err(RewindError::validation_field(
                "Snapshot cannot be its own base",
                "base_id",
            ));
        }
        for path in payload.files.keys() {
            validate_path(path)?;
        }

        let overhead = RECORD_OVERHEAD + id.as_str().len() as u64;
        let (planned, entries_cost, eviction) =
            self.admit(&id, &payload.files, overhead, true, &[])?;

        // An evicted base leaves nothing equal to the base state to build on
        let base_id = match base_id {
            Some(base) if self.records.contains_key(&base) => Some(base),
            Some(base) => {
                debug!(
                    snapshot_id = %id,
                    base_id = %base,
                    "Base evicted while making room, storing as full record"
                );
                None
            }
            None => None,
        };
        let kind = if base_id.is_some() {
            RecordKind::Differential
        } else {
            RecordKind::Full
        };

        let mut entries = BTreeMap::new();
        for (path, mut entry) in planned {
            entry.action = self.label(base_id.as_ref(), &path, entry.action);
            entries.insert(path, entry);
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let record = DifferentialRecord {
            id: id.clone(),
            kind,
            base_id: base_id.clone(),
            entries,
            sequence,
            created_at: Utc::now(),
        };
        for (path, entry) in &record.entries {
            self.register_holder(&id, path, entry);
        }

        let receipt = StoreReceipt {
            id: id.clone(),
            kind,
            base_id,
            created: record.count(FileAction::Created),
            modified: record.count(FileAction::Modified),
            unchanged: record.count(FileAction::Unchanged),
            deleted: record.count(FileAction::Deleted),
            bytes_added: overhead + entries_cost,
            eviction,
        };
        self.records.insert(id, record);
        self.usage += overhead + entries_cost;

        debug!(
            snapshot_id = %receipt.id,
            kind = ?receipt.kind,
            created = receipt.created,
            modified = receipt.modified,
            unchanged = receipt.unchanged,
            deleted = receipt.deleted,
            bytes = receipt.bytes_added,
            "Stored snapshot record"
        );
        Ok(receipt)
    }

    /// Add one file to an existing record
    ///
    /// Entries are write-once: a path already present is left untouched.
    /// `None` records the path as absent.
    pub fn append_file(
        &mut self,
        id: &SnapshotId,
        path: impl Into<PathBuf>,
        content: Option<Vec<u8>>,
    ) -> RewindResult<AppendOutcome> {
        let path = path.into();
        validate_path(&path)?;
        let record = self.records.get(id).ok_or_else(|| {
            RewindError::not_found_resource(format!("Snapshot {} not found", id), "snapshot")
        })?;
        if record.entries.contains_key(&path) {
            return Ok(AppendOutcome::AlreadyPresent);
        }

        let mut files = BTreeMap::new();
        files.insert(path.clone(), content);
        let (mut planned, cost, eviction) =
            self.admit(id, &files, 0, false, std::slice::from_ref(id))?;

        // Folding an evicted base may have carried an inherited entry in
        if self
            .records
            .get(id)
            .is_some_and(|r| r.entries.contains_key(&path))
        {
            let warnings = self.detach_entry(id, &path);
            if !warnings.is_empty() {
                tracing::warn!(
                    snapshot_id = %id,
                    path = %path.display(),
                    lost = warnings.len(),
                    "Replacing inherited entry dropped references"
                );
            }
            planned = self.plan(id, &files);
        }

        let mut action = FileAction::Created;
        for (path, mut entry) in planned {
            let base_id = self.records.get(id).and_then(|r| r.base_id.clone());
            entry.action = self.label(base_id.as_ref(), &path, entry.action);
            action = entry.action;
            self.register_holder(id, &path, &entry);
            self.usage += entry.memory_cost(&path);
            if let Some(record) = self.records.get_mut(id) {
                record.entries.insert(path, entry);
            }
        }
        debug!(snapshot_id = %id, action = ?action, bytes = cost, "Appended file to snapshot");
        Ok(AppendOutcome::Stored { action, eviction })
    }

    /// Add an `unchanged` entry for content some record already holds
    ///
    /// Returns `Ok(false)` when nothing holds `checksum`, in which case the
    /// caller has to read the bytes and use [`append_file`](Self::append_file).
    pub fn append_reference(
        &mut self,
        id: &SnapshotId,
        path: impl Into<PathBuf>,
        checksum: &str,
    ) -> RewindResult<bool> {
        let path = path.into();
        validate_path(&path)?;
        let record = self.records.get(id).ok_or_else(|| {
            RewindError::not_found_resource(format!("Snapshot {} not found", id), "snapshot")
        })?;
        if record.entries.contains_key(&path) {
            return Ok(true);
        }
        let Some(holder) = self.live_holder(checksum) else {
            return Ok(false);
        };
        let entry = FileEntry::reference(
            checksum.to_string(),
            holder.size,
            holder.snapshot_id,
            holder.path,
        );
        let cost = entry.memory_cost(&path);
        if self.usage + cost > self.memory_limit {
            return Ok(false);
        }
        self.usage += cost;
        if let Some(record) = self.records.get_mut(id) {
            record.entries.insert(path, entry);
        }
        Ok(true)
    }

    /// Remove a record, repairing the chain and references around it
    pub fn remove(&mut self, id: &SnapshotId) -> RewindResult<EvictionReport> {
        if !self.records.contains_key(id) {
            return Err(RewindError::not_found_resource(
                format!("Snapshot {} not found", id),
                "snapshot",
            ));
        }
        Ok(self.remove_with_repair(id))
    }

    /// Get a stored record
    pub fn get(&self, id: &SnapshotId) -> Option<&DifferentialRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &SnapshotId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record ids in insertion order
    pub fn ids_oldest_first(&self) -> Vec<SnapshotId> {
        let mut records: Vec<&DifferentialRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.sequence);
        records.into_iter().map(|r| r.id.clone()).collect()
    }

    /// Most recently stored record
    pub fn latest_id(&self) -> Option<SnapshotId> {
        self.records
            .values()
            .max_by_key(|r| r.sequence)
            .map(|r| r.id.clone())
    }

    /// Checksum index
    pub fn tracker(&self) -> &FileVersionTracker {
        &self.tracker
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Current usage against limits
    pub fn stats(&self) -> CapacityState {
        CapacityState {
            snapshot_count: self.records.len(),
            memory_usage_bytes: self.usage,
            max_snapshots: self.max_snapshots,
            memory_limit_bytes: self.memory_limit,
            unique_blobs: self.tracker.len(),
        }
    }

    /// Plan a write and make room for it
    ///
    /// The first plan uses current holders. If it does not fit, room is made
    /// for the worst case (no dedup) and the write is planned again, since
    /// eviction may have moved or dropped the holders it referenced.
    fn admit(
        &mut self,
        id: &SnapshotId,
        files: &BTreeMap<PathBuf, Option<Vec<u8>>>,
        overhead: u64,
        adds_record: bool,
        protected: &[SnapshotId],
    ) -> RewindResult<(Vec<(PathBuf, FileEntry)>, u64, EvictionReport)> {
        let planned = self.plan(id, files);
        let cost = planned_cost(&planned);
        if !self.over_capacity(overhead + cost, adds_record) {
            return Ok((planned, cost, EvictionReport::default()));
        }

        let worst = overhead + self.worst_case_cost(files);
        let eviction = self.ensure_capacity(worst, adds_record, protected)?;
        let planned = self.plan(id, files);
        let cost = planned_cost(&planned);
        Ok((planned, cost, eviction))
    }

    /// Turn file contents into entries, deduplicating against live holders
    /// and against earlier files of the same write
    fn plan(
        &self,
        id: &SnapshotId,
        files: &BTreeMap<PathBuf, Option<Vec<u8>>>,
    ) -> Vec<(PathBuf, FileEntry)> {
        let mut pending: HashMap<String, PathBuf> = HashMap::new();
        let mut planned = Vec::with_capacity(files.len());
        for (path, content) in files {
            let entry = match content {
                None => FileEntry::deleted(),
                Some(bytes) => {
                    let checksum = self.algorithm.digest_bytes(bytes);
                    if let Some(first) = pending.get(&checksum) {
                        FileEntry::reference(checksum, bytes.len() as u64, id.clone(), first.clone())
                    } else if let Some(holder) = self.live_holder(&checksum) {
                        FileEntry::reference(checksum, holder.size, holder.snapshot_id, holder.path)
                    } else {
                        pending.insert(checksum.clone(), path.clone());
                        FileEntry::content(FileAction::Created, checksum, bytes.clone())
                    }
                }
            };
            planned.push((path.clone(), entry));
        }
        planned
    }

    fn worst_case_cost(&self, files: &BTreeMap<PathBuf, Option<Vec<u8>>>) -> u64 {
        let hex = self.algorithm.hex_len() as u64;
        files
            .iter()
            .map(|(path, content)| {
                let path_len = path.as_os_str().len() as u64;
                match content {
                    None => ENTRY_OVERHEAD + path_len,
                    Some(bytes) => {
                        let payload = (bytes.len() as u64).max(REFERENCE_ID_ESTIMATE + path_len);
                        ENTRY_OVERHEAD + path_len + hex + payload
                    }
                }
            })
            .sum()
    }

    pub(super) fn over_capacity(&self, incoming: u64, adds_record: bool) -> bool {
        self.records.len() + usize::from(adds_record) > self.max_snapshots
            || self.usage + incoming > self.memory_limit
    }

    /// Tracker holder for a checksum, if its entry still holds the bytes
    pub(super) fn live_holder(&self, checksum: &str) -> Option<VersionEntry> {
        let holder = self.tracker.lookup(checksum)?;
        let entry = self.records.get(&holder.snapshot_id)?.entries.get(&holder.path)?;
        (entry.concrete().is_some() && entry.checksum.as_deref() == Some(checksum))
            .then(|| holder.clone())
    }

    fn register_holder(&mut self, id: &SnapshotId, path: &Path, entry: &FileEntry) {
        if let (Some(bytes), Some(checksum)) = (entry.concrete(), entry.checksum.as_ref()) {
            self.tracker
                .register(checksum.clone(), id.clone(), path, bytes.len() as u64);
        }
    }

    /// Created vs modified depends on whether the base state has the path
    fn label(&self, base_id: Option<&SnapshotId>, path: &Path, action: FileAction) -> FileAction {
        match (action, base_id) {
            (FileAction::Created, Some(base)) if self.path_exists_in_chain(base, path) => {
                FileAction::Modified
            }
            _ => action,
        }
    }

    pub(super) fn recompute_usage(&mut self) {
        self.usage = self.records.values().map(|r| r.memory_cost()).sum();
    }
}

fn planned_cost(planned: &[(PathBuf, FileEntry)]) -> u64 {
    planned
        .iter()
        .map(|(path, entry)| entry.memory_cost(path))
        .sum()
}

/// Stored paths must be non-empty and must not climb out of their root
fn validate_path(path: &Path) -> RewindResult<()> {
    if path.as_os_str().is_empty() {
        return Err(RewindError::validation_field("File path is empty", "path"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(RewindError::validation_field(
            format!("File path {} contains '..'", path.display()),
            "path",
        ));
    }
    Ok(())
}
