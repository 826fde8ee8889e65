use std::path::{Path, PathBuf};

use crate::agent::Agent;
use crate::error::{DuetError, Result};

pub const STATE_DIR: &str = ".duet";
pub const ARCHIVE_DIR: &str = ".duet-archive";
pub const CONFIG_FILE: &str = "duet.toml";
pub const PROJECT_DIR_ENV: &str = "DUET_PROJECT_DIR";

pub const TASK_FILE: &str = "task.md";
pub const ROUND_FILE: &str = "round.txt";
pub const STEP_FILE: &str = "step.txt";
pub const TURN_FILE: &str = "turn.txt";
pub const LAST_ACTION_FILE: &str = "last_action.txt";
pub const PLAN_FILE: &str = "plan.md";
pub const WORK_FILE: &str = "work.md";
pub const REVIEW_FILE: &str = "review.md";
pub const HISTORY_FILE: &str = "history.md";
pub const WATCHER_PID_FILE: &str = "watcher.pid";
pub const WATCHER_LOG_FILE: &str = "watcher.log";

/// Resolve the project root: explicit flag, then `DUET_PROJECT_DIR`, then
/// the current directory.
pub fn resolve_project_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os(PROJECT_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    Ok(std::env::current_dir()?)
}

/// File locations for one project's session.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    project: PathBuf,
    root: PathBuf,
}

impl SessionPaths {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        let project = project.into();
        let root = project.join(STATE_DIR);
        Self { project, root }
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_root(&self) -> PathBuf {
        self.project.join(ARCHIVE_DIR)
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn turn(&self) -> PathBuf {
        self.file(TURN_FILE)
    }

    pub fn slot(&self, agent: Agent) -> PathBuf {
        self.file(slot_file_name(agent))
    }

    pub fn watcher_pid(&self) -> PathBuf {
        self.file(WATCHER_PID_FILE)
    }

    pub fn watcher_log(&self) -> PathBuf {
        self.file(WATCHER_LOG_FILE)
    }

    pub fn transcript(&self, agent: Agent) -> PathBuf {
        self.file(&format!("pane-{agent}.log"))
    }

    /// Resolve a user-supplied session file name. Only bare names are allowed.
    pub fn session_file(&self, name: &str) -> Result<PathBuf> {
        validate_bare_name(name)?;
        Ok(self.file(name))
    }
}

pub fn slot_file_name(agent: Agent) -> &'static str {
    match agent {
        Agent::Author => WORK_FILE,
        Agent::Reviewer => REVIEW_FILE,
    }
}

/// Reject anything that could escape the directory it is joined onto.
pub fn validate_bare_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0'])
        || trimmed != name
    {
        return Err(DuetError::InvalidName(format!(
            "'{name}' is not a bare file name"
        )));
    }
    Ok(())
}
