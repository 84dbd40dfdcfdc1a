//! Commit messages and porcelain parsing

use chrono::{DateTime, Utc};
use std::path::PathBuf;

const SUBJECT_MAX_CHARS: usize = 72;
const INSTRUCTION_MAX_CHARS: usize = 500;
const LISTED_FILES: usize = 10;

/// Collapse control characters and runs of whitespace into single spaces
fn sanitize(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

/// Structured commit message for a snapshot commit
///
/// Every field is single-line; the instruction cannot inject extra
/// paragraphs or trailers.
pub fn commit_message(instruction: &str, timestamp: DateTime<Utc>, files: &[PathBuf]) -> String {
    let instruction = sanitize(instruction);
    let subject = if instruction.is_empty() {
        "rewind: snapshot".to_string()
    } else {
        truncate(&format!("rewind: {}", instruction), SUBJECT_MAX_CHARS)
    };

    let mut message = format!(
        "{}\n\nTimestamp: {}\nFiles ({}):\n",
        subject,
        timestamp.to_rfc3339(),
        files.len()
    );
    for file in files.iter().take(LISTED_FILES) {
        message.push_str(&format!("  - {}\n", sanitize(&file.display().to_string())));
    }
    if files.len() > LISTED_FILES {
        message.push_str(&format!("  ... and {} more\n", files.len() - LISTED_FILES));
    }
    message.push_str(&format!(
        "Instruction: {}\n",
        truncate(&instruction, INSTRUCTION_MAX_CHARS)
    ));
    message
}

/// Paths listed by `git status --porcelain -z`
///
/// Records are NUL-terminated `XY path`. Renames and copies are followed by
/// a record holding the source path, which is skipped.
pub fn parse_porcelain(output: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut records = output.split('\0');
    while let Some(record) = records.next() {
        let (Some(status), Some(path)) = (record.get(..2), record.get(3..)) else {
            continue;
        };
        if path.is_empty() {
            continue;
        }
        paths.push(PathBuf::from(path));
        if status.contains(['R', 'C']) {
            records.next();
        }
    }
    paths
}
