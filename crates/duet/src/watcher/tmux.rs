use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tracing::debug;

use super::pane::{Keys, PaneInspector};

/// [`PaneInspector`] backed by the `tmux` CLI.
#[derive(Debug, Clone)]
pub struct TmuxPanes {
    binary: String,
}

impl Default for TmuxPanes {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
        }
    }
}

impl TmuxPanes {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check whether the tmux session exists.
    pub async fn has_session(&self, session: &str) -> bool {
        Command::new(&self.binary)
            .args(["has-session", "-t", session])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(args = ?args, "tmux");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to run `{} {}`", self.binary, args[0]))?;
        if !output.status.success() {
            bail!(
                "tmux {} failed (exit {}): {}",
                args[0],
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PaneInspector for TmuxPanes {
    async fn foreground_process(&self, pane: &str) -> Result<String> {
        let out = self
            .run(&["display-message", "-p", "-t", pane, "#{pane_current_command}"])
            .await?;
        Ok(out.trim().to_string())
    }

    async fn recent_text(&self, pane: &str, lines: usize) -> Result<String> {
        let out = self.run(&["capture-pane", "-p", "-J", "-t", pane]).await?;
        Ok(tail_lines(&out, lines))
    }

    async fn inject(&self, pane: &str, keys: Keys) -> Result<()> {
        match keys {
            Keys::Literal(text) => self.run(&["send-keys", "-t", pane, "-l", &text]).await?,
            Keys::Submit => self.run(&["send-keys", "-t", pane, "Enter"]).await?,
            Keys::ClearLine => self.run(&["send-keys", "-t", pane, "C-u"]).await?,
        };
        Ok(())
    }

    async fn capture_to(&self, pane: &str, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => {
                let command = format!("cat >> {}", shell_quote(&path.to_string_lossy()));
                self.run(&["pipe-pane", "-t", pane, &command]).await?;
            }
            None => {
                self.run(&["pipe-pane", "-t", pane]).await?;
            }
        }
        Ok(())
    }
}

/// Last `n` non-empty lines of `text`.
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}
