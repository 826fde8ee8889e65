use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::deliver::output_size;
use super::pane::PaneInspector;
use crate::agent::Agent;
use crate::paths::SessionPaths;
use crate::time;

/// Captured pane output, one file per agent.
#[derive(Debug, Clone)]
pub struct Transcripts {
    author: PathBuf,
    reviewer: PathBuf,
}

impl Transcripts {
    pub fn new(paths: &SessionPaths) -> Self {
        Self {
            author: paths.transcript(Agent::Author),
            reviewer: paths.transcript(Agent::Reviewer),
        }
    }

    pub fn path(&self, agent: Agent) -> &Path {
        match agent {
            Agent::Author => &self.author,
            Agent::Reviewer => &self.reviewer,
        }
    }

    pub async fn attach<P: PaneInspector>(&self, panes: &P, pane: &str, agent: Agent) -> Result<()> {
        panes
            .capture_to(pane, Some(self.path(agent)))
            .await
            .with_context(|| format!("failed to capture pane {pane}"))
    }

    pub async fn detach<P: PaneInspector>(&self, panes: &P, pane: &str) -> Result<()> {
        panes.capture_to(pane, None).await
    }

    /// Detach, empty and reattach a transcript that grew past `max_bytes`.
    /// Returns true when it was truncated.
    pub async fn enforce_limit<P: PaneInspector>(
        &self,
        panes: &P,
        pane: &str,
        agent: Agent,
        max_bytes: u64,
    ) -> Result<bool> {
        let path = self.path(agent);
        let size = output_size(path);
        if size <= max_bytes {
            return Ok(false);
        }
        self.detach(panes, pane).await?;
        OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|file| file.set_len(0))
            .with_context(|| format!("failed to truncate {}", path.display()))?;
        self.attach(panes, pane, agent).await?;
        info!(%agent, size, max_bytes, "transcript truncated");
        Ok(true)
    }

    /// Rename each non-empty transcript to `pane-<agent>.<stamp>.log`.
    pub fn archive(&self) -> Vec<PathBuf> {
        let stamp = time::file_stamp();
        let mut archived = Vec::new();
        for agent in Agent::ALL {
            let path = self.path(agent);
            if output_size(path) == 0 {
                continue;
            }
            let dest = path.with_file_name(format!("pane-{agent}.{stamp}.log"));
            match fs::rename(path, &dest) {
                Ok(()) => archived.push(dest),
                Err(err) => warn!(%agent, "failed to archive transcript: {err}"),
            }
        }
        archived
    }
}

/// Append-only watcher log (`watcher.log`).
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one timestamped line. Failures are logged, never fatal.
    pub fn record(&self, message: &str) {
        let line = format!("[{}] {message}\n", time::timestamp());
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(err) = result {
            warn!(path = %self.path.display(), "failed to write watcher log: {err}");
        }
    }
}
