//! Multi-key metadata index

use super::query::SnapshotQuery;
use crate::error::{RewindError, RewindResult};
use crate::types::{SnapshotId, SnapshotMetadata};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Words too common to be worth indexing
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "from", "into", "onto", "then", "its",
];

/// Minimum indexed keyword length
const MIN_KEYWORD_LEN: usize = 3;

/// Lowercased instruction words used for keyword lookup
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

type Postings = HashMap<String, BTreeSet<SnapshotId>>;

/// Metadata for every live snapshot plus secondary indexes
#[derive(Debug, Default)]
pub struct SnapshotIndex {
    by_id: HashMap<SnapshotId, SnapshotMetadata>,
    /// (timestamp, insertion sequence) -> id
    by_time: BTreeMap<(DateTime<Utc>, u64), SnapshotId>,
    sequence: HashMap<SnapshotId, u64>,
    keywords: Postings,
    tags: Postings,
    authors: Postings,
    sessions: Postings,
    next_sequence: u64,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace metadata
    pub fn insert(&mut self, meta: SnapshotMetadata) {
        let seq = match self.sequence.get(&meta.id) {
            Some(seq) => *seq,
            None => {
                let seq = self.next_sequence;
                self.next_sequence += 1;
                seq
            }
        };
        if let Some(old) = self.by_id.remove(&meta.id) {
            self.unindex(&old, seq);
        }
        self.index(&meta, seq);
        self.sequence.insert(meta.id.clone(), seq);
        self.by_id.insert(meta.id.clone(), meta);
    }

    /// Remove a snapshot from every index
    pub fn remove(&mut self, id: &SnapshotId) -> Option<SnapshotMetadata> {
        let meta = self.by_id.remove(id)?;
        if let Some(seq) = self.sequence.remove(id) {
            self.unindex(&meta, seq);
        }
        Some(meta)
    }

    /// Mutate metadata in place, keeping the indexes consistent
    pub fn update<F>(&mut self, id: &SnapshotId, f: F) -> RewindResult<&SnapshotMetadata>
    where
        F: FnOnce(&mut SnapshotMetadata),
    {
        let mut meta = self.by_id.get(id).cloned().ok_or_else(|| {
            RewindError::not_found_resource(format!("Snapshot {} not found", id), "snapshot")
        })?;
        f(&mut meta);
        if &meta.id != id {
            return Err(RewindError::validation_field(
                "Snapshot id cannot change",
                "id",
            ));
        }
        self.insert(meta);
        self.by_id
            .get(id)
            .ok_or_else(|| RewindError::storage(format!("Snapshot {} vanished from index", id)))
    }

    pub fn get(&self, id: &SnapshotId) -> Option<&SnapshotMetadata> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &SnapshotId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All snapshots, newest first
    pub fn newest_first(&self) -> Vec<&SnapshotMetadata> {
        self.by_time
            .values()
            .rev()
            .filter_map(|id| self.by_id.get(id))
            .collect()
    }

    /// Most recent snapshot
    pub fn latest(&self) -> Option<&SnapshotMetadata> {
        self.by_time
            .values()
            .next_back()
            .and_then(|id| self.by_id.get(id))
    }

    /// Ids starting with `prefix`, sorted
    pub fn ids_with_prefix(&self, prefix: &str) -> Vec<SnapshotId> {
        let mut ids: Vec<SnapshotId> = self
            .by_id
            .keys()
            .filter(|id| id.as_str().starts_with(prefix))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Snapshot recorded for a git commit
    pub fn by_commit(&self, commit_hash: &str) -> Option<&SnapshotMetadata> {
        self.by_id.values().find(|meta| {
            meta.git
                .as_ref()
                .is_some_and(|g| g.commit_hash == commit_hash)
        })
    }

    /// Snapshots matching every filter of `query`, newest first
    pub fn search(&self, query: &SnapshotQuery) -> Vec<&SnapshotMetadata> {
        let mut candidates: Option<BTreeSet<SnapshotId>> = None;
        let mut narrow = |ids: BTreeSet<SnapshotId>| {
            candidates = Some(match candidates.take() {
                Some(current) => current.intersection(&ids).cloned().collect(),
                None => ids,
            });
        };

        if let Some(keyword) = &query.keyword {
            let words = extract_keywords(keyword);
            if words.is_empty() {
                // Too short to be indexed; fall back to substring match
                let needle = keyword.to_lowercase();
                narrow(
                    self.by_id
                        .values()
                        .filter(|m| m.instruction.to_lowercase().contains(&needle))
                        .map(|m| m.id.clone())
                        .collect(),
                );
            } else {
                for word in words {
                    narrow(posting(&self.keywords, &word));
                }
            }
        }
        if let Some(tag) = &query.tag {
            narrow(posting(&self.tags, tag));
        }
        if let Some(author) = &query.author {
            narrow(posting(&self.authors, author));
        }
        if let Some(session) = &query.session_id {
            narrow(posting(&self.sessions, session));
        }

        let results = self
            .newest_first()
            .into_iter()
            .filter(|meta| {
                candidates
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&meta.id))
            })
            .filter(|meta| query.matches_scan(meta));
        match query.limit {
            Some(limit) => results.take(limit).collect(),
            None => results.collect(),
        }
    }

    /// Distinct tags in use, sorted
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.keys().cloned().collect();
        tags.sort();
        tags
    }

    fn index(&mut self, meta: &SnapshotMetadata, seq: u64) {
        self.by_time.insert((meta.timestamp, seq), meta.id.clone());
        for word in extract_keywords(&meta.instruction) {
            add_posting(&mut self.keywords, word, &meta.id);
        }
        for tag in &meta.tags {
            add_posting(&mut self.tags, tag.clone(), &meta.id);
        }
        if let Some(author) = &meta.author {
            add_posting(&mut self.authors, author.clone(), &meta.id);
        }
        if let Some(session) = &meta.session_id {
            add_posting(&mut self.sessions, session.clone(), &meta.id);
        }
    }

    fn unindex(&mut self, meta: &SnapshotMetadata, seq: u64) {
        self.by_time.remove(&(meta.timestamp, seq));
        for word in extract_keywords(&meta.instruction) {
            remove_posting(&mut self.keywords, &word, &meta.id);
        }
        for tag in &meta.tags {
            remove_posting(&mut self.tags, tag, &meta.id);
        }
        if let Some(author) = &meta.author {
            remove_posting(&mut self.authors, author, &meta.id);
        }
        if let Some(session) = &meta.session_id {
            remove_posting(&mut self.sessions, session, &meta.id);
        }
    }
}

fn posting(postings: &Postings, key: &str) -> BTreeSet<SnapshotId> {
    postings.get(key).cloned().unwrap_or_default()
}

fn add_posting(postings: &mut Postings, key: String, id: &SnapshotId) {
    postings.entry(key).or_default().insert(id.clone());
}

fn remove_posting(postings: &mut Postings, key: &str, id: &SnapshotId) {
    if let Some(ids) = postings.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            postings.remove(key);
        }
    }
}
