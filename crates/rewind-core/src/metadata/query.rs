//! Search filters over the metadata index

use crate::types::SnapshotMetadata;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Filters for `search_snapshots`; all set fields must match
#[derive(Debug, Clone, Default)]
pub struct SnapshotQuery {
    /// Words that must all appear in the instruction
    pub keyword: Option<String>,
    pub tag: Option<String>,
    pub author: Option<String>,
    pub session_id: Option<String>,
    /// Only snapshots that backed up this path
    pub path: Option<PathBuf>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SnapshotQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn touching(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filters the indexes cannot answer
    pub(crate) fn matches_scan(&self, meta: &SnapshotMetadata) -> bool {
        if self.since.is_some_and(|since| meta.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| meta.timestamp > until) {
            return false;
        }
        match &self.path {
            Some(path) => meta.tracks(Path::new(path)),
            None => true,
        }
    }
}
