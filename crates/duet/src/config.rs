use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::agent::Agent;
use crate::paths::CONFIG_FILE;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    watcher: WatcherFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WatcherFileConfig {
    tmux_session: Option<String>,
    author_pane: Option<String>,
    reviewer_pane: Option<String>,
    trigger_text: Option<String>,
    poll_interval_ms: Option<u64>,
    degraded_delay_ms: Option<u64>,
    quiet_period_ms: Option<u64>,
    max_stability_wait_ms: Option<u64>,
    reconfirm_delay_ms: Option<u64>,
    verify_timeout_ms: Option<u64>,
    max_inject_retries: Option<u32>,
    transcript_max_bytes: Option<u64>,
    event_listener: Option<bool>,
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub session: Option<String>,
    pub poll_ms: Option<u64>,
    pub no_listener: bool,
}

/// Resolved watcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub tmux_session: String,
    pub author_pane: String,
    pub reviewer_pane: String,
    pub trigger_text: String,
    pub poll_interval: Duration,
    pub degraded_delay: Duration,
    pub quiet_period: Duration,
    pub max_stability_wait: Duration,
    pub reconfirm_delay: Duration,
    pub verify_timeout: Duration,
    pub max_inject_retries: u32,
    pub transcript_max_bytes: u64,
    pub event_listener: bool,
    /// Pause between liveness samples and between typed text and Enter.
    pub settle_delay: Duration,
    /// How long a superseded watcher gets between SIGTERM and SIGKILL.
    pub shutdown_grace: Duration,
}

const DEFAULT_SESSION: &str = "duet";

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::for_session(DEFAULT_SESSION)
    }
}

impl WatcherConfig {
    pub fn for_session(session: &str) -> Self {
        Self {
            tmux_session: session.to_string(),
            author_pane: format!("{session}:0.0"),
            reviewer_pane: format!("{session}:0.1"),
            trigger_text: "go".to_string(),
            poll_interval: Duration::from_secs(2),
            degraded_delay: Duration::from_secs(30),
            quiet_period: Duration::from_secs(3),
            max_stability_wait: Duration::from_secs(60),
            reconfirm_delay: Duration::from_secs(2),
            verify_timeout: Duration::from_secs(15),
            max_inject_retries: 3,
            transcript_max_bytes: 5 * 1024 * 1024,
            event_listener: true,
            settle_delay: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(3),
        }
    }

    /// Load `duet.toml` (or the explicit path) and apply overrides.
    ///
    /// A missing default file is fine; a missing explicit file is an error.
    pub fn load(project_dir: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        let file_cfg = match &overrides.config_path {
            Some(path) => read_file_config(path)?,
            None => {
                let path = project_dir.join(CONFIG_FILE);
                if path.is_file() {
                    read_file_config(&path)?
                } else {
                    FileConfig::default()
                }
            }
        };
        Self::resolve(file_cfg.watcher, overrides)
    }

    fn resolve(file: WatcherFileConfig, overrides: &ConfigOverrides) -> Result<Self> {
        let session = overrides
            .session
            .clone()
            .or(file.tmux_session)
            .unwrap_or_else(|| DEFAULT_SESSION.to_string());
        if session.trim().is_empty() {
            bail!("tmux session name is empty");
        }
        let base = Self::for_session(&session);
        let ms = Duration::from_millis;

        let trigger_text = file.trigger_text.unwrap_or(base.trigger_text);
        if trigger_text.trim().is_empty() || trigger_text.contains('\n') {
            bail!("trigger_text must be a non-empty single line");
        }
        let poll_interval = overrides
            .poll_ms
            .or(file.poll_interval_ms)
            .map(ms)
            .unwrap_or(base.poll_interval);
        if poll_interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }

        Ok(Self {
            author_pane: file.author_pane.unwrap_or(base.author_pane),
            reviewer_pane: file.reviewer_pane.unwrap_or(base.reviewer_pane),
            trigger_text,
            poll_interval,
            degraded_delay: file.degraded_delay_ms.map(ms).unwrap_or(base.degraded_delay),
            quiet_period: file.quiet_period_ms.map(ms).unwrap_or(base.quiet_period),
            max_stability_wait: file
                .max_stability_wait_ms
                .map(ms)
                .unwrap_or(base.max_stability_wait),
            reconfirm_delay: file.reconfirm_delay_ms.map(ms).unwrap_or(base.reconfirm_delay),
            verify_timeout: file.verify_timeout_ms.map(ms).unwrap_or(base.verify_timeout),
            max_inject_retries: file.max_inject_retries.unwrap_or(base.max_inject_retries),
            transcript_max_bytes: file
                .transcript_max_bytes
                .unwrap_or(base.transcript_max_bytes),
            event_listener: !overrides.no_listener
                && file.event_listener.unwrap_or(base.event_listener),
            ..base
        })
    }

    pub fn pane_for(&self, agent: Agent) -> &str {
        match agent {
            Agent::Author => &self.author_pane,
            Agent::Reviewer => &self.reviewer_pane,
        }
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str::<FileConfig>(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))
}
