//! Scripted git runner for tests

use super::runner::{GitOutput, GitRunner};
use crate::error::{RewindError, RewindResult};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug)]
struct Rule {
    prefix: Vec<String>,
    output: GitOutput,
    once: bool,
}

/// Answers git invocations from prefix-matched rules and records every call
///
/// Rules are checked in insertion order; `once` rules are consumed when hit.
/// Unmatched calls succeed with empty output.
#[derive(Debug, Default)]
pub(crate) struct ScriptedGit {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Vec<String>>>,
    missing: bool,
}

impl ScriptedGit {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A runner whose binary cannot be started
    pub(crate) fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    /// Git present inside a repository on `main` with one commit
    pub(crate) fn repo() -> Self {
        let git = Self::new();
        git.on(&["--version"], ok("git version 2.43.0\n"));
        git.on(&["rev-parse", "--is-inside-work-tree"], ok("true\n"));
        git.on(&["rev-parse", "--abbrev-ref", "HEAD"], ok("main\n"));
        git.on(&["rev-parse", "--verify"], fail(1, ""));
        git.on(&["rev-parse", "HEAD"], ok("1111111111111111111111111111111111111111\n"));
        git
    }

    pub(crate) fn on(&self, prefix: &[&str], output: GitOutput) {
        self.push(prefix, output, false);
    }

    /// Rule used for the next matching call only; takes precedence
    pub(crate) fn once(&self, prefix: &[&str], output: GitOutput) {
        self.push(prefix, output, true);
    }

    fn push(&self, prefix: &[&str], output: GitOutput, once: bool) {
        let rule = Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            output,
            once,
        };
        let mut rules = self.rules.lock();
        if once {
            let first_persistent = rules.iter().position(|r| !r.once).unwrap_or(rules.len());
            rules.insert(first_persistent, rule);
        } else {
            rules.push(rule);
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    /// Whether any call started with `prefix`
    pub(crate) fn called(&self, prefix: &[&str]) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|call| starts_with(call, prefix))
    }
}

fn starts_with(call: &[String], prefix: &[impl AsRef<str>]) -> bool {
    call.len() >= prefix.len() && call.iter().zip(prefix).all(|(a, b)| a == b.as_ref())
}

pub(crate) fn ok(stdout: &str) -> GitOutput {
    GitOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub(crate) fn fail(code: i32, stderr: &str) -> GitOutput {
    GitOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl GitRunner for ScriptedGit {
    async fn run(&self, args: &[&str]) -> RewindResult<GitOutput> {
        let call: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.calls.lock().push(call.clone());
        if self.missing {
            return Err(RewindError::git(
                format!("git {}", args.join(" ")),
                "Failed to start git: No such file or directory",
            ));
        }

        let mut rules = self.rules.lock();
        let Some(index) = rules.iter().position(|r| starts_with(&call, &r.prefix)) else {
            return Ok(ok(""));
        };
        let output = rules[index].output.clone();
        if rules[index].once {
            rules.remove(index);
        }
        Ok(output)
    }
}
