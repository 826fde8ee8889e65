use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::error::{DuetError, Result};
use crate::paths::{self, SessionPaths};
use crate::slot::SlotLog;
use crate::time;

pub const INITIAL_STEP: &str = "planning";
pub const NO_ACTION: &str = "(No action yet)";

/// Point-in-time view of the session, as shown by `duet status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub task: String,
    pub round: u32,
    pub step: String,
    pub turn: Agent,
    pub last_action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOutcome {
    pub overwritten: bool,
}

/// Handle over one project's `.duet/` directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    paths: SessionPaths,
}

impl SessionStore {
    pub fn open(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: SessionPaths::new(project_dir),
        }
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn exists(&self) -> bool {
        self.paths.root().is_dir()
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(DuetError::NotInitialized(self.paths.root().to_path_buf()))
        }
    }

    /// Create a fresh session, replacing any existing one.
    pub fn init(&self, task: &str) -> Result<InitOutcome> {
        let task = task.trim();
        if task.is_empty() {
            return Err(DuetError::InvalidName("task description is empty".to_string()));
        }
        let overwritten = self.exists();
        if overwritten {
            fs::remove_dir_all(self.paths.root())?;
        }
        fs::create_dir_all(self.paths.root())?;

        let ts = time::timestamp();
        self.write(paths::TASK_FILE, &format!("# Task\n\n{task}\n\n---\nCreated: {ts}\n"))?;
        self.set_round(1)?;
        self.set_step(INITIAL_STEP)?;
        self.set_turn(Agent::Author)?;
        self.set_last_action(NO_ACTION)?;
        self.write(paths::PLAN_FILE, "# Plan\n\n(The author writes the plan here)\n")?;
        for agent in Agent::ALL {
            self.write_slot(agent, &SlotLog::default())?;
        }
        self.write(
            paths::HISTORY_FILE,
            &format!("# Collaboration History\n\n**Task**: {task}\n**Started**: {ts}\n"),
        )?;
        info!(dir = %self.paths.root().display(), overwritten, "session initialized");
        Ok(InitOutcome { overwritten })
    }

    /// Remove the session directory. Returns false when there was none.
    pub fn clean(&self) -> Result<bool> {
        match fs::remove_dir_all(self.paths.root()) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn turn(&self) -> Result<Agent> {
        match self.read_optional(paths::TURN_FILE)? {
            None => Ok(Agent::Author),
            Some(raw) if raw.trim().is_empty() => Ok(Agent::Author),
            Some(raw) => raw.parse().map_err(|_| {
                DuetError::corrupt(paths::TURN_FILE, format!("unknown agent '{}'", raw.trim()))
            }),
        }
    }

    pub fn round(&self) -> Result<u32> {
        match self.read_optional(paths::ROUND_FILE)? {
            None => Ok(1),
            Some(raw) => raw.trim().parse().map_err(|_| {
                DuetError::corrupt(paths::ROUND_FILE, format!("not a number: '{}'", raw.trim()))
            }),
        }
    }

    pub fn step(&self) -> Result<String> {
        Ok(self
            .read_optional(paths::STEP_FILE)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| INITIAL_STEP.to_string()))
    }

    pub fn task(&self) -> Result<String> {
        let raw = self.read_optional(paths::TASK_FILE)?.unwrap_or_default();
        let body = raw.strip_prefix("# Task\n\n").unwrap_or(&raw);
        let body = match body.rfind("\n\n---\nCreated:") {
            Some(end) => &body[..end],
            None => body,
        };
        Ok(body.trim().to_string())
    }

    pub fn last_action(&self) -> Result<String> {
        Ok(self
            .read_optional(paths::LAST_ACTION_FILE)?
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| NO_ACTION.to_string()))
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        self.ensure_initialized()?;
        Ok(SessionSnapshot {
            task: self.task()?,
            round: self.round()?,
            step: self.step()?,
            turn: self.turn()?,
            last_action: self.last_action()?,
        })
    }

    pub fn slot(&self, agent: Agent) -> Result<SlotLog> {
        let name = paths::slot_file_name(agent);
        match self.read_optional(name)? {
            None => Ok(SlotLog::default()),
            Some(raw) => {
                SlotLog::parse(&raw).map_err(|reason| DuetError::corrupt(name, reason))
            }
        }
    }

    pub fn history(&self) -> Result<String> {
        self.ensure_initialized()?;
        Ok(self.read_optional(paths::HISTORY_FILE)?.unwrap_or_default())
    }

    /// Read a session file by bare name; `None` if it does not exist.
    pub fn read_file(&self, name: &str) -> Result<Option<String>> {
        self.ensure_initialized()?;
        let path = self.paths.session_file(name)?;
        read_to_string_optional(&path)
    }

    /// Copy every session file into `<project>/.duet-archive/<name>/`.
    pub fn archive(&self, name: Option<&str>) -> Result<PathBuf> {
        self.ensure_initialized()?;
        let name = match name {
            Some(name) => {
                paths::validate_bare_name(name)?;
                name.to_string()
            }
            None => format!("session-{}", time::file_stamp()),
        };
        let dest = self.paths.archive_root().join(&name);
        fs::create_dir_all(&dest)?;
        for entry in fs::read_dir(self.paths.root())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::copy(entry.path(), dest.join(entry.file_name()))?;
            }
        }
        info!(dest = %dest.display(), "session archived");
        Ok(dest)
    }

    pub(crate) fn set_turn(&self, agent: Agent) -> Result<()> {
        self.write(paths::TURN_FILE, agent.as_str())
    }

    pub(crate) fn set_round(&self, round: u32) -> Result<()> {
        self.write(paths::ROUND_FILE, &round.to_string())
    }

    pub(crate) fn set_step(&self, step: &str) -> Result<()> {
        self.write(paths::STEP_FILE, step)
    }

    pub(crate) fn set_last_action(&self, action: &str) -> Result<()> {
        self.write(paths::LAST_ACTION_FILE, action)
    }

    pub(crate) fn write_slot(&self, agent: Agent, log: &SlotLog) -> Result<()> {
        let (title, placeholder) = match agent {
            Agent::Author => ("Author Work", "(Waiting for the author to submit)"),
            Agent::Reviewer => ("Reviewer Feedback", "(Waiting for the reviewer to respond)"),
        };
        self.write(paths::slot_file_name(agent), &log.render(title, placeholder))
    }

    pub(crate) fn append_history(&self, text: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.paths.file(paths::HISTORY_FILE))?;
        file.write_all(text.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>> {
        read_to_string_optional(&self.paths.file(name))
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        debug!(file = name, bytes = contents.len(), "write session file");
        write_atomic(&self.paths.file(name), contents)
    }
}

fn read_to_string_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Replace `path` with `contents` via a synced temp file and rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::open(dir.path());
        (dir, store)
    }

    #[test]
    fn init_creates_initial_state() {
        let (_dir, store) = store();
        let outcome = store.init("build a parser").expect("init");
        assert!(!outcome.overwritten);

        let snap = store.snapshot().expect("snapshot");
        assert_eq!(snap.task, "build a parser");
        assert_eq!(snap.round, 1);
        assert_eq!(snap.step, "planning");
        assert_eq!(snap.turn, Agent::Author);
        assert_eq!(snap.last_action, NO_ACTION);
        assert!(store.slot(Agent::Author).expect("slot").is_empty());
        assert!(store.history().expect("history").contains("**Task**: build a parser"));
    }

    #[test]
    fn reinit_reports_overwrite_and_resets() {
        let (_dir, store) = store();
        store.init("first").expect("init");
        store.set_turn(Agent::Reviewer).expect("turn");
        let outcome = store.init("second").expect("reinit");
        assert!(outcome.overwritten);
        assert_eq!(store.turn().expect("turn"), Agent::Author);
        assert_eq!(store.task().expect("task"), "second");
    }

    #[test]
    fn snapshot_requires_session() {
        let (_dir, store) = store();
        assert!(matches!(store.snapshot(), Err(DuetError::NotInitialized(_))));
    }

    #[test]
    fn corrupt_turn_file_is_reported() {
        let (_dir, store) = store();
        store.init("t").expect("init");
        fs::write(store.paths().turn(), "ralph").expect("write");
        assert!(matches!(store.turn(), Err(DuetError::Corrupt { .. })));
    }

    #[test]
    fn multiline_task_round_trips() {
        let (_dir, store) = store();
        store.init("line one\n\nline two").expect("init");
        assert_eq!(store.task().expect("task"), "line one\n\nline two");
    }

    #[test]
    fn read_file_only_accepts_bare_names() {
        let (_dir, store) = store();
        store.init("t").expect("init");
        assert!(store.read_file("turn.txt").expect("read").is_some());
        assert!(store.read_file("missing.md").expect("read").is_none());
        assert!(matches!(store.read_file("../x"), Err(DuetError::InvalidName(_))));
    }

    #[test]
    fn archive_and_clean() {
        let (dir, store) = store();
        store.init("t").expect("init");
        let dest = store.archive(Some("v1")).expect("archive");
        assert_eq!(dest, dir.path().join(".duet-archive/v1"));
        assert!(dest.join("history.md").is_file());
        assert!(store.clean().expect("clean"));
        assert!(!store.exists());
        assert!(!store.clean().expect("clean again"));
        assert!(dest.join("task.md").is_file());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("turn.txt");
        write_atomic(&path, "author").expect("write");
        write_atomic(&path, "reviewer").expect("overwrite");
        assert_eq!(fs::read_to_string(&path).expect("read"), "reviewer");
        assert!(!dir.path().join(".turn.txt.tmp").exists());
    }
}
