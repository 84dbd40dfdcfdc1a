//! Tool monitor
//!
//! Decides whether a tool call should trigger a snapshot before it runs.
//! Order of precedence: built-in table, configured declarations, the tool's
//! own `modifies_files` declaration, keyword heuristics, configured default.

mod heuristics;
mod names;
mod types;

#[cfg(test)]
mod tests;

pub use heuristics::split_words;
pub use names::builtin_verdict;
pub use types::{Classification, ToolDescriptor};

use crate::config::MonitorConfig;
use heuristics::Patterns;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Classifies tools and caches the verdicts
#[derive(Debug)]
pub struct ToolMonitor {
    config: RwLock<MonitorConfig>,
    /// `Err` holds the message of a pattern that failed to compile
    patterns: RwLock<Result<Patterns, String>>,
    cache: RwLock<HashMap<ToolDescriptor, Classification>>,
}

impl Default for ToolMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl ToolMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let patterns = compile_patterns(&config);
        Self {
            config: RwLock::new(config),
            patterns: RwLock::new(patterns),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the configuration and drop cached verdicts
    pub fn update_config(&self, config: MonitorConfig) {
        *self.patterns.write() = compile_patterns(&config);
        *self.config.write() = config;
        self.cache.write().clear();
        debug!("Tool monitor configuration updated");
    }

    /// Classify a tool, using the cache when possible
    pub fn classify_tool(&self, descriptor: &ToolDescriptor) -> Classification {
        if let Some(cached) = self.cache.read().get(descriptor) {
            return *cached;
        }
        let classification = self.classify_uncached(descriptor);
        debug!(tool = %descriptor.name, ?classification, "Classified tool");
        self.cache
            .write()
            .insert(descriptor.clone(), classification);
        classification
    }

    /// Whether a snapshot should be taken before running the tool
    pub fn should_snapshot(&self, descriptor: &ToolDescriptor) -> bool {
        self.classify_tool(descriptor).modifies_files()
    }

    /// Classify by name alone
    pub fn should_snapshot_named(&self, name: &str) -> bool {
        self.should_snapshot(&ToolDescriptor::new(name))
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }

    fn classify_uncached(&self, descriptor: &ToolDescriptor) -> Classification {
        if let Some(modifies) = builtin_verdict(&descriptor.name) {
            return Classification::Declared(modifies);
        }

        let config = self.config.read();
        if let Some(modifies) = config.declared.get(&descriptor.name) {
            return Classification::Declared(*modifies);
        }
        if let Some(modifies) = descriptor.modifies_files {
            return Classification::Declared(modifies);
        }

        let patterns = self.patterns.read();
        let patterns = match patterns.as_ref() {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!(tool = %descriptor.name, error = %e, "Tool classification failed, snapshotting");
                return Classification::Default(true);
            }
        };
        match heuristics::score(descriptor, patterns) {
            Some(score) if score.confidence >= config.confidence_threshold => {
                Classification::Heuristic {
                    modifies: score.modifies,
                    confidence: score.confidence,
                }
            }
            _ => Classification::Default(config.default_snapshot),
        }
    }
}

fn compile_patterns(config: &MonitorConfig) -> Result<Patterns, String> {
    Patterns::compile(&config.modifying_patterns, &config.readonly_patterns).map_err(|e| {
        warn!(error = %e, "Invalid tool monitor pattern");
        e.to_string()
    })
}

/// Paths a tool call will touch, from its JSON arguments
///
/// Reads `file_path` (or `path`, `notebook_path`), a `paths` array, and
/// `file_path` inside each `edits[]` item. Duplicates are removed, first
/// occurrence wins.
pub fn affected_paths(arguments: &Value) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut push = |path: &str| {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() && !paths.contains(&path) {
            paths.push(path);
        }
    };

    if let Some(path) = ["file_path", "path", "notebook_path"]
        .iter()
        .find_map(|key| arguments.get(key).and_then(Value::as_str))
    {
        push(path);
    }
    if let Some(list) = arguments.get("paths").and_then(Value::as_array) {
        for path in list.iter().filter_map(Value::as_str) {
            push(path);
        }
    }
    if let Some(edits) = arguments.get("edits").and_then(Value::as_array) {
        for edit in edits {
            if let Some(path) = edit.get("file_path").and_then(Value::as_str) {
                push(path);
            }
        }
    }
    paths
}
