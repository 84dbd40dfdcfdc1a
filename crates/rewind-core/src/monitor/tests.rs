//! Tool monitor tests

use super::*;
use crate::config::MonitorConfig;
use serde_json::json;
use std::path::PathBuf;

#[test]
fn test_builtin_tools() {
    let monitor = ToolMonitor::default();
    assert_eq!(
        monitor.classify_tool(&ToolDescriptor::new("Write")),
        Classification::Declared(true)
    );
    assert_eq!(
        monitor.classify_tool(&ToolDescriptor::new("Read")),
        Classification::Declared(false)
    );
    assert!(monitor.should_snapshot_named("MultiEdit"));
    assert!(monitor.should_snapshot_named("bash"));
    assert!(!monitor.should_snapshot_named("Grep"));
}

#[test]
fn test_builtin_wins_over_declaration() {
    let monitor = ToolMonitor::default();
    let descriptor = ToolDescriptor::new("Read").declaring(true);
    assert_eq!(monitor.classify_tool(&descriptor), Classification::Declared(false));
}

#[test]
fn test_declarations() {
    let mut config = MonitorConfig::default();
    config.declared.insert("deploy_site".to_string(), false);
    let monitor = ToolMonitor::new(config);

    assert_eq!(
        monitor.classify_tool(&ToolDescriptor::new("deploy_site").declaring(true)),
        Classification::Declared(false)
    );
    assert_eq!(
        monitor.classify_tool(&ToolDescriptor::new("custom_tool").declaring(true)),
        Classification::Declared(true)
    );
}

#[test]
fn test_heuristics() {
    let monitor = ToolMonitor::default();

    let writer = ToolDescriptor::new("writeConfigFile")
        .with_description("Writes configuration to disk")
        .with_parameters(["path", "content"]);
    match monitor.classify_tool(&writer) {
        Classification::Heuristic { modifies, confidence } => {
            assert!(modifies);
            assert!(confidence >= 0.5);
        }
        other => panic!("unexpected classification {:?}", other),
    }

    let reader = ToolDescriptor::new("list_branches").with_description("Show branches");
    assert_eq!(
        monitor.classify_tool(&reader),
        Classification::Heuristic {
            modifies: false,
            confidence: 1.0
        }
    );
}

#[test]
fn test_low_confidence_uses_default() {
    let config = MonitorConfig {
        default_snapshot: false,
        ..MonitorConfig::default()
    };
    let monitor = ToolMonitor::new(config);

    // "read" and "update" cancel out
    let mixed = ToolDescriptor::new("read_and_update");
    assert_eq!(monitor.classify_tool(&mixed), Classification::Default(false));

    let unknown = ToolDescriptor::new("zorblax");
    assert_eq!(monitor.classify_tool(&unknown), Classification::Default(false));
    assert!(ToolMonitor::default().should_snapshot(&unknown));
}

#[test]
fn test_extra_patterns() {
    let config = MonitorConfig {
        modifying_patterns: vec!["^deploy".to_string()],
        ..MonitorConfig::default()
    };
    let monitor = ToolMonitor::new(config);
    assert!(matches!(
        monitor.classify_tool(&ToolDescriptor::new("deploy_preview")),
        Classification::Heuristic { modifies: true, .. }
    ));
}

#[test]
fn test_invalid_pattern_falls_back_to_snapshot() {
    let config = MonitorConfig {
        default_snapshot: false,
        readonly_patterns: vec!["([unclosed".to_string()],
        ..MonitorConfig::default()
    };
    let monitor = ToolMonitor::new(config);
    assert_eq!(
        monitor.classify_tool(&ToolDescriptor::new("list_files")),
        Classification::Default(true)
    );
    // Built-ins do not depend on patterns
    assert!(!monitor.should_snapshot_named("Read"));
}

#[test]
fn test_cache_invalidated_on_config_change() {
    let monitor = ToolMonitor::default();
    let tool = ToolDescriptor::new("sync_remote");
    assert_eq!(monitor.classify_tool(&tool), Classification::Default(true));
    assert_eq!(monitor.cached_count(), 1);

    let mut config = MonitorConfig::default();
    config.declared.insert("sync_remote".to_string(), false);
    monitor.update_config(config);
    assert_eq!(monitor.cached_count(), 0);
    assert_eq!(monitor.classify_tool(&tool), Classification::Declared(false));
}

#[test]
fn test_split_words() {
    assert_eq!(split_words("writeFile"), vec!["write", "file"]);
    assert_eq!(split_words("MultiEdit"), vec!["multi", "edit"]);
    assert_eq!(split_words("web-fetch"), vec!["web", "fetch"]);
    assert_eq!(split_words("json_edit_tool"), vec!["json", "edit", "tool"]);
}

#[test]
fn test_affected_paths() {
    let args = json!({
        "file_path": "src/a.js",
        "edits": [
            {"file_path": "src/b.js", "old_string": "x", "new_string": "y"},
            {"file_path": "src/a.js"}
        ]
    });
    assert_eq!(
        affected_paths(&args),
        vec![PathBuf::from("src/a.js"), PathBuf::from("src/b.js")]
    );

    let args = json!({"path": "notes.md", "paths": ["a", "b", ""]});
    assert_eq!(
        affected_paths(&args),
        vec![PathBuf::from("notes.md"), PathBuf::from("a"), PathBuf::from("b")]
    );
    assert!(affected_paths(&json!({"command": "ls"})).is_empty());
}
