//! Keyword and parameter scoring

use super::types::ToolDescriptor;
use regex::Regex;

const MODIFYING_WORDS: &[&str] = &[
    "write", "edit", "create", "delete", "remove", "rename", "move", "patch", "replace", "apply",
    "save", "update", "modify", "insert", "append", "format", "refactor", "generate", "mkdir",
    "touch", "overwrite", "truncate",
];

const READ_ONLY_WORDS: &[&str] = &[
    "read", "get", "list", "search", "find", "grep", "glob", "view", "show", "fetch", "query",
    "inspect", "status", "log", "cat", "stat", "describe", "explain", "count", "check", "lookup",
];

const MODIFYING_PARAMS: &[&str] = &[
    "content", "contents", "new_string", "old_string", "new_content", "edits", "patch",
    "replacement", "new_source",
];

const NAME_WEIGHT: f32 = 2.0;
const DESCRIPTION_WEIGHT: f32 = 1.0;
const PARAM_WEIGHT: f32 = 1.5;
const PATTERN_WEIGHT: f32 = 2.0;

/// Verdict of the heuristics, before the confidence threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub modifies: bool,
    pub confidence: f32,
}

/// Compiled extra patterns from configuration
#[derive(Debug, Default)]
pub struct Patterns {
    pub modifying: Vec<Regex>,
    pub read_only: Vec<Regex>,
}

impl Patterns {
    pub fn compile(modifying: &[String], read_only: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            modifying: compile_all(modifying)?,
            read_only: compile_all(read_only)?,
        })
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

/// Split `writeFile`, `multi_edit`, `web-fetch` into lowercase words
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in text.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Score a tool; `None` when nothing points either way
pub fn score(descriptor: &ToolDescriptor, patterns: &Patterns) -> Option<Score> {
    let mut modifying = 0.0f32;
    let mut read_only = 0.0f32;

    let mut tally = |text: &str, weight: f32| {
        for word in split_words(text) {
            if MODIFYING_WORDS.contains(&word.as_str()) {
                modifying += weight;
            } else if READ_ONLY_WORDS.contains(&word.as_str()) {
                read_only += weight;
            }
        }
    };
    tally(&descriptor.name, NAME_WEIGHT);
    if let Some(description) = &descriptor.description {
        tally(description, DESCRIPTION_WEIGHT);
    }

    for param in &descriptor.parameters {
        if MODIFYING_PARAMS.contains(&param.to_lowercase().as_str()) {
            modifying += PARAM_WEIGHT;
        }
    }

    let haystacks = [Some(descriptor.name.as_str()), descriptor.description.as_deref()];
    for text in haystacks.into_iter().flatten() {
        modifying += PATTERN_WEIGHT * patterns.modifying.iter().filter(|r| r.is_match(text)).count() as f32;
        read_only += PATTERN_WEIGHT * patterns.read_only.iter().filter(|r| r.is_match(text)).count() as f32;
    }

    let total = modifying + read_only;
    if total <= 0.0 {
        return None;
    }
    Some(Score {
        modifies: modifying > read_only,
        confidence: (modifying - read_only).abs() / total,
    })
}
