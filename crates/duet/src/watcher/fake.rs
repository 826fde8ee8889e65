//! Scripted [`PaneInspector`] for watcher tests.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, bail};

use super::pane::{Keys, PaneInspector};

struct Script {
    foreground: VecDeque<String>,
    default_foreground: String,
    screen: String,
    reaction_bytes: usize,
    stuck_submits: u32,
    failing: bool,
    injected: Vec<Keys>,
    captures: HashMap<String, PathBuf>,
    capture_calls: Vec<(String, Option<PathBuf>)>,
}

pub struct FakePanes {
    script: Mutex<Script>,
}

impl Default for FakePanes {
    fn default() -> Self {
        Self {
            script: Mutex::new(Script {
                foreground: VecDeque::new(),
                default_foreground: "claude".to_string(),
                screen: String::new(),
                reaction_bytes: 64,
                stuck_submits: 0,
                failing: false,
                injected: Vec::new(),
                captures: HashMap::new(),
                capture_calls: Vec::new(),
            }),
        }
    }
}

impl FakePanes {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("fake panes lock")
    }

    /// Map a pane to a transcript path without recording a capture call.
    pub fn attach(&self, pane: &str, path: &Path) {
        self.script()
            .captures
            .insert(pane.to_string(), path.to_path_buf());
    }

    /// Foreground commands returned in order before falling back to `claude`.
    pub fn set_foreground(&self, commands: &[&str]) {
        self.script().foreground = commands.iter().map(|c| c.to_string()).collect();
    }

    pub fn set_default_foreground(&self, command: &str) {
        self.script().default_foreground = command.to_string();
    }

    pub fn set_screen(&self, text: &str) {
        self.script().screen = text.to_string();
    }

    /// Bytes appended to the pane's transcript when Enter is pressed.
    pub fn set_reaction_bytes(&self, bytes: usize) {
        self.script().reaction_bytes = bytes;
    }

    /// Leave the trigger visible in the input line for the next `n` submits.
    pub fn stick_submits(&self, n: u32) {
        self.script().stuck_submits = n;
    }

    pub fn fail_commands(&self) {
        self.script().failing = true;
    }

    pub fn injected(&self) -> Vec<Keys> {
        self.script().injected.clone()
    }

    pub fn capture_calls(&self) -> Vec<(String, Option<PathBuf>)> {
        self.script().capture_calls.clone()
    }
}

impl PaneInspector for FakePanes {
    async fn foreground_process(&self, _pane: &str) -> Result<String> {
        let mut script = self.script();
        if script.failing {
            bail!("no server running");
        }
        let next = script.foreground.pop_front();
        Ok(next.unwrap_or_else(|| script.default_foreground.clone()))
    }

    async fn recent_text(&self, _pane: &str, _lines: usize) -> Result<String> {
        let script = self.script();
        if script.failing {
            bail!("no server running");
        }
        Ok(script.screen.clone())
    }

    async fn inject(&self, pane: &str, keys: Keys) -> Result<()> {
        let mut script = self.script();
        if script.failing {
            bail!("no server running");
        }
        script.injected.push(keys.clone());
        match keys {
            Keys::Literal(text) => script.screen = format!("> {text}"),
            Keys::ClearLine => script.screen = "> ".to_string(),
            Keys::Submit if script.stuck_submits > 0 => {
                script.stuck_submits -= 1;
            }
            Keys::Submit => {
                script.screen = "working...".to_string();
                let bytes = script.reaction_bytes;
                if let (Some(path), true) = (script.captures.get(pane), bytes > 0) {
                    let mut file = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)?;
                    file.write_all(&vec![b'.'; bytes])?;
                }
            }
        }
        Ok(())
    }

    async fn capture_to(&self, pane: &str, path: Option<&Path>) -> Result<()> {
        let mut script = self.script();
        if script.failing {
            bail!("no server running");
        }
        script
            .capture_calls
            .push((pane.to_string(), path.map(Path::to_path_buf)));
        match path {
            Some(path) => {
                script.captures.insert(pane.to_string(), path.to_path_buf());
            }
            None => {
                script.captures.remove(pane);
            }
        }
        Ok(())
    }
}
