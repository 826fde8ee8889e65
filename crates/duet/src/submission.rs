use std::io::Read;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::agent::{self, Agent, Tag};
use crate::error::{DuetError, Result};
use crate::paths;
use crate::policy::{self, PolicyMode, PolicyViolation};
use crate::slot::SlotEntry;
use crate::store::SessionStore;
use crate::time;

/// The reviewer keeps a short rolling log; the author keeps only the latest.
pub const REVIEW_LOG_CAPACITY: usize = 3;
pub const WORK_LOG_CAPACITY: usize = 1;

/// Longest summary copied into history for file and stdin submissions.
pub const HISTORY_SUMMARY_LIMIT: usize = 200;

/// Where submission content comes from, before it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionInput {
    Inline(String),
    File(PathBuf),
    Stdin,
}

impl SubmissionInput {
    /// Read the content and note where it came from.
    pub fn read(self) -> Result<(String, SubmissionSource)> {
        match self {
            Self::Inline(text) => Ok((text, SubmissionSource::Inline)),
            Self::File(path) => {
                let text = std::fs::read_to_string(&path)?;
                Ok((text, SubmissionSource::File(path)))
            }
            Self::Stdin => {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                Ok((text, SubmissionSource::Stdin))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionSource {
    Inline,
    File(PathBuf),
    Stdin,
}

impl SubmissionSource {
    fn external_label(&self) -> Option<&'static str> {
        match self {
            Self::Inline => None,
            Self::File(_) => Some("file"),
            Self::Stdin => Some("stdin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub agent: Agent,
    pub tag: Tag,
    pub summary: String,
    pub content: String,
    pub round: u32,
    pub step: String,
    pub timestamp: String,
    pub source: SubmissionSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tag: Tag,
    pub summary: String,
    pub round_before: u32,
    pub round_after: u32,
    pub next_turn: Agent,
    pub warnings: Vec<PolicyViolation>,
}

/// Validate and record a submission, then hand the turn to the other agent.
///
/// Every check runs before the first write. The turn file is written last so
/// a watcher never sees the turn flip before the content it announces.
pub fn submit(
    store: &SessionStore,
    agent: Agent,
    content: &str,
    source: SubmissionSource,
    mode: PolicyMode,
) -> Result<Receipt> {
    store.ensure_initialized()?;

    let received = content;
    let content = content.trim_end();
    if content.trim().is_empty() {
        return Err(DuetError::EmptySubmission);
    }

    let turn = store.turn()?;
    if turn != agent {
        return Err(DuetError::WrongTurn { agent, turn });
    }

    let tag = match agent::extract_tag(content) {
        Some(tag) if agent.allows(tag) => tag,
        _ => {
            return Err(DuetError::InvalidTag {
                agent,
                found: agent::leading_token(content).map(str::to_string),
            });
        }
    };

    // Line-based rules see the text as received, trailing newline included.
    let warnings = policy::run_check(mode, agent, tag, received)?;
    for violation in &warnings {
        warn!(%agent, rule = violation.rule, "policy warning: {}", violation.message);
    }

    let round_before = store.round()?;
    let round_after = match agent {
        Agent::Author => round_before,
        Agent::Reviewer => round_before
            .checked_add(1)
            .ok_or_else(|| DuetError::corrupt(paths::ROUND_FILE, "round counter overflow"))?,
    };
    let submission = Submission {
        agent,
        tag,
        summary: agent::extract_summary(content),
        content: content.to_string(),
        round: round_before,
        step: store.step()?,
        timestamp: time::timestamp(),
        source,
    };

    let mut log = store.slot(agent)?;
    let capacity = match agent {
        Agent::Author => WORK_LOG_CAPACITY,
        Agent::Reviewer => REVIEW_LOG_CAPACITY,
    };
    log.push(
        SlotEntry {
            tag,
            round: submission.round,
            step: submission.step.clone(),
            updated: submission.timestamp.clone(),
            summary: submission.summary.clone(),
            content: submission.content.clone(),
        },
        capacity,
    );
    store.write_slot(agent, &log)?;
    store.append_history(&history_entry(&submission))?;
    store.set_last_action(&format!(
        "[{tag}] {} (by {}, {})",
        submission.summary,
        agent.display_name(),
        time::clock()
    ))?;

    if round_after != round_before {
        store.set_round(round_after)?;
    }

    let next_turn = agent.other();
    store.set_turn(next_turn)?;

    info!(%agent, %tag, round = round_after, next = %next_turn, "submission recorded");
    Ok(Receipt {
        tag,
        summary: submission.summary,
        round_before,
        round_after,
        next_turn,
        warnings,
    })
}

/// Render the history block for one submission.
pub fn history_entry(sub: &Submission) -> String {
    let header = format!(
        "\n---\n\n## [{}] [{}] Round {} | Step: {}\n**Time**: {}\n",
        sub.agent.display_name(),
        sub.tag,
        sub.round,
        sub.step,
        sub.timestamp,
    );
    match sub.source.external_label() {
        None => format!("{header}**Summary**: {}\n\n{}\n\n", sub.summary, sub.content),
        Some(label) => format!(
            "{header}**Summary**: {}\n\n(full content in {}; submitted via {label})\n\n",
            bounded(&sub.summary, HISTORY_SUMMARY_LIMIT),
            paths::slot_file_name(sub.agent),
        ),
    }
}

fn bounded(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
