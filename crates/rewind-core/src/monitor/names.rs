//! Built-in tool classification table

/// Tools that write to the filesystem
pub mod modifying {
    pub const WRITE: &str = "Write";
    pub const EDIT: &str = "Edit";
    pub const MULTI_EDIT: &str = "MultiEdit";
    pub const JSON_EDIT: &str = "json_edit_tool";
    pub const NOTEBOOK_EDIT: &str = "notebook_edit";
    /// Shell commands can touch anything
    pub const BASH: &str = "bash";
}

/// Tools that only read or talk to the user
pub mod read_only {
    pub const READ: &str = "Read";
    pub const GLOB: &str = "Glob";
    pub const GREP: &str = "Grep";
    pub const TODO_READ: &str = "TodoRead";
    pub const TODO_WRITE: &str = "TodoWrite";
    pub const TASK_OUTPUT: &str = "task_output";
    pub const TASK_DONE: &str = "task_done";
    pub const ASK_USER: &str = "ask_user_question";
    pub const WEB_FETCH: &str = "web-fetch";
    pub const WEB_SEARCH: &str = "web-search";
    pub const ENTER_PLAN_MODE: &str = "enter_plan_mode";
    pub const EXIT_PLAN_MODE: &str = "exit_plan_mode";
}

/// Verdict for a built-in tool, `None` if the name is not built in
pub fn builtin_verdict(name: &str) -> Option<bool> {
    use modifying::*;
    use read_only::*;
    match name {
        WRITE | EDIT | MULTI_EDIT | JSON_EDIT | NOTEBOOK_EDIT | BASH => Some(true),
        READ | GLOB | GREP | TODO_READ | TODO_WRITE | TASK_OUTPUT | TASK_DONE | ASK_USER
        | WEB_FETCH | WEB_SEARCH | ENTER_PLAN_MODE | EXIT_PLAN_MODE => Some(false),
        _ => None,
    }
}
