//! One delivery attempt: make sure the agent is alive and idle, type the
//! trigger, and confirm the agent reacted.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::pane::{Keys, PaneInspector, detect_prompt, is_bare_shell, is_stuck_input};
use super::state::PaneHealth;
use crate::config::WatcherConfig;

pub const LIVENESS_SAMPLES: u32 = 3;
pub const PROMPT_TAIL_LINES: usize = 15;
pub const INPUT_TAIL_LINES: usize = 3;
const SIZE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    AgentExited { command: String },
    OutputUnstable,
    InputStuck,
    NoReaction,
    Terminal(String),
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentExited { command } => write!(f, "agent exited (pane runs {command})"),
            Self::OutputUnstable => f.write_str("output never settled"),
            Self::InputStuck => f.write_str("trigger stuck in the input line"),
            Self::NoReaction => f.write_str("no output after trigger"),
            Self::Terminal(msg) => write!(f, "terminal error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferral {
    InteractivePrompt(&'static str),
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Delivered,
    Failed(DeliveryFailure),
    Deferred(Deferral),
}

/// Size of the pane's captured transcript; zero when absent.
pub fn output_size(capture: &Path) -> u64 {
    std::fs::metadata(capture).map(|m| m.len()).unwrap_or(0)
}

pub async fn deliver<P: PaneInspector>(
    panes: &P,
    config: &WatcherConfig,
    pane: &str,
    capture: &Path,
    health: &mut PaneHealth,
) -> Attempt {
    match attempt(panes, config, pane, capture, health).await {
        Ok(outcome) => outcome,
        Err(err) => Attempt::Failed(DeliveryFailure::Terminal(format!("{err:#}"))),
    }
}

async fn attempt<P: PaneInspector>(
    panes: &P,
    config: &WatcherConfig,
    pane: &str,
    capture: &Path,
    health: &mut PaneHealth,
) -> Result<Attempt> {
    if health.is_paused() {
        let prompt = detect_prompt(&panes.recent_text(pane, PROMPT_TAIL_LINES).await?);
        if !health.try_resume(prompt.is_some(), output_size(capture)) {
            debug!(pane, "pane still paused");
            return Ok(Attempt::Deferred(Deferral::Paused));
        }
        info!(pane, "prompt cleared, resuming deliveries");
    }

    if let Some(command) = agent_exited(panes, config, pane).await? {
        return Ok(Attempt::Failed(DeliveryFailure::AgentExited { command }));
    }

    let text = panes.recent_text(pane, PROMPT_TAIL_LINES).await?;
    if let Some(label) = detect_prompt(&text) {
        return Ok(prompt_seen(health, pane, label, output_size(capture)));
    }
    health.clear_prompt();

    let Some(stable) = wait_for_quiet(config, capture).await else {
        return Ok(Attempt::Failed(DeliveryFailure::OutputUnstable));
    };

    sleep(config.reconfirm_delay).await;
    let text = panes.recent_text(pane, PROMPT_TAIL_LINES).await?;
    if let Some(label) = detect_prompt(&text) {
        return Ok(prompt_seen(health, pane, label, output_size(capture)));
    }
    if output_size(capture) != stable {
        return Ok(Attempt::Failed(DeliveryFailure::OutputUnstable));
    }

    if !inject_trigger(panes, config, pane).await? {
        return Ok(Attempt::Failed(DeliveryFailure::InputStuck));
    }

    let deadline = Instant::now() + config.verify_timeout;
    loop {
        if output_size(capture) > stable {
            return Ok(Attempt::Delivered);
        }
        if Instant::now() >= deadline {
            return Ok(Attempt::Failed(DeliveryFailure::NoReaction));
        }
        sleep(SIZE_POLL).await;
    }
}

/// Returns the shell name when every sample shows a bare shell.
async fn agent_exited<P: PaneInspector>(
    panes: &P,
    config: &WatcherConfig,
    pane: &str,
) -> Result<Option<String>> {
    let mut command = String::new();
    for sample in 0..LIVENESS_SAMPLES {
        command = panes.foreground_process(pane).await?;
        if !is_bare_shell(&command) {
            return Ok(None);
        }
        if sample + 1 < LIVENESS_SAMPLES {
            sleep(config.settle_delay).await;
        }
    }
    Ok(Some(command))
}

fn prompt_seen(health: &mut PaneHealth, pane: &str, label: &'static str, size: u64) -> Attempt {
    if health.record_prompt(size) {
        warn!(pane, prompt = label, "interactive prompt persists, pausing deliveries to pane");
        Attempt::Deferred(Deferral::Paused)
    } else {
        debug!(pane, prompt = label, hits = health.prompt_hits(), "interactive prompt visible");
        Attempt::Deferred(Deferral::InteractivePrompt(label))
    }
}

/// Wait until the transcript size holds still for `quiet_period`.
async fn wait_for_quiet(config: &WatcherConfig, capture: &Path) -> Option<u64> {
    let deadline = Instant::now() + config.max_stability_wait;
    let step = SIZE_POLL.min(config.quiet_period).max(Duration::from_millis(1));
    let mut last = output_size(capture);
    let mut since = Instant::now();
    loop {
        if since.elapsed() >= config.quiet_period {
            return Some(last);
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(step).await;
        let now = output_size(capture);
        if now != last {
            last = now;
            since = Instant::now();
        }
    }
}

/// Type the trigger and press Enter, clearing and retrying while the text
/// sits unsubmitted. Returns false if it never went through.
async fn inject_trigger<P: PaneInspector>(
    panes: &P,
    config: &WatcherConfig,
    pane: &str,
) -> Result<bool> {
    for attempt in 0..=config.max_inject_retries {
        panes
            .inject(pane, Keys::Literal(config.trigger_text.clone()))
            .await?;
        sleep(config.settle_delay).await;
        panes.inject(pane, Keys::Submit).await?;
        sleep(config.settle_delay).await;

        let tail = panes.recent_text(pane, INPUT_TAIL_LINES).await?;
        if !is_stuck_input(&tail, &config.trigger_text) {
            return Ok(true);
        }
        debug!(pane, attempt, "trigger stuck in input line, clearing");
        panes.inject(pane, Keys::ClearLine).await?;
    }
    Ok(false)
}
