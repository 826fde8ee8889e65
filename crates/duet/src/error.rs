use std::path::PathBuf;

use thiserror::Error;

use crate::agent::{Agent, Tag};
use crate::policy::PolicyViolation;

pub type Result<T> = std::result::Result<T, DuetError>;

#[derive(Error, Debug)]
pub enum DuetError {
    #[error("session not initialized at {} (run: duet init \"task description\")", .0.display())]
    NotInitialized(PathBuf),

    #[error("submission is empty")]
    EmptySubmission,

    #[error("it is the {turn}'s turn, not the {agent}'s (check with: duet whose-turn)")]
    WrongTurn { agent: Agent, turn: Agent },

    #[error(
        "{agent} submission must start with a valid tag, found {} (valid: {})",
        .found.as_deref().map(|t| format!("[{t}]")).unwrap_or_else(|| "no tag".to_string()),
        tag_list(.agent.allowed_tags())
    )]
    InvalidTag { agent: Agent, found: Option<String> },

    #[error("policy rejected submission: {}", join_violations(.0))]
    PolicyRejected(Vec<PolicyViolation>),

    #[error(
        "step transition blocked: author is [{}], reviewer is [{}] (need CONSENSUS+CONSENSUS, CONSENSUS+PASS or PASS+CONSENSUS)",
        slot_label(.author),
        slot_label(.reviewer)
    )]
    Blocked {
        author: Option<Tag>,
        reviewer: Option<Tag>,
    },

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("corrupt session file {file}: {reason}")]
    Corrupt { file: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DuetError {
    /// Errors the caller can fix by changing content, waiting, or forcing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::WrongTurn { .. }
                | Self::InvalidTag { .. }
                | Self::PolicyRejected(_)
                | Self::Blocked { .. }
                | Self::EmptySubmission
        )
    }

    pub(crate) fn corrupt(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// Render an optional tag the way reports show it.
pub fn tag_label(tag: Option<Tag>) -> &'static str {
    tag.map(Tag::as_str).unwrap_or("none")
}

fn slot_label(tag: &Option<Tag>) -> &'static str {
    tag_label(*tag)
}

fn tag_list(tags: &[Tag]) -> String {
    tags.iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_violations(violations: &[PolicyViolation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
