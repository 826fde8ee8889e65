use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, Tag};
use crate::error::{DuetError, Result};

pub const POLICY_MODE_ENV: &str = "DUET_POLICY_MODE";

/// Enforcement level for content rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    #[default]
    Off,
    Warn,
    Block,
}

impl PolicyMode {
    /// Read `DUET_POLICY_MODE`; unset or unknown values mean `Off`.
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(POLICY_MODE_ENV).ok().as_deref())
    }

    pub fn from_value(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("warn") => Self::Warn,
            Some("block") => Self::Block,
            _ => Self::Off,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Warn => "warn",
            Self::Block => "block",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyViolation {
    pub rule: &'static str,
    pub message: String,
}

impl PolicyViolation {
    fn new(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

/// Each group counts once if any of its variants appears.
const RESEARCH_FIELD_GROUPS: [(&str, &[&str]); 4] = [
    ("reference implementation", &["参考实现", "reference"]),
    ("key types", &["关键类型", "key type"]),
    (
        "data format/structure",
        &["数据格式", "data format", "数据结构", "data structure"],
    ),
    ("verification method", &["验证方式", "verification"]),
];

const RESEARCH_MIN_GROUPS: usize = 2;
const RESEARCH_MIN_LINES: usize = 3;

/// Content rules for a submission. Pure; no mode applied.
pub fn check(agent: Agent, tag: Tag, content: &str) -> Vec<PolicyViolation> {
    let mut violations = Vec::new();
    match (agent, tag) {
        (Agent::Author, Tag::Code | Tag::Fix) => {
            if !content.to_lowercase().contains("test results") {
                violations.push(PolicyViolation::new(
                    "test-results",
                    format!("[{tag}] submission must include test results"),
                ));
            }
        }
        (Agent::Author, Tag::Research) => {
            let lower = content.to_lowercase();
            let groups = RESEARCH_FIELD_GROUPS
                .iter()
                .filter(|(_, variants)| variants.iter().any(|v| lower.contains(v)))
                .count();
            // Counts lines of the whole submission, header included.
            let lines = content.split('\n').count();
            if groups < RESEARCH_MIN_GROUPS && lines <= RESEARCH_MIN_LINES {
                let fields = RESEARCH_FIELD_GROUPS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ");
                violations.push(PolicyViolation::new(
                    "research-content",
                    format!("[RESEARCH] submission needs at least {RESEARCH_MIN_GROUPS} of: {fields}"),
                ));
            }
        }
        (Agent::Reviewer, Tag::Pass | Tag::NeedsWork) => {
            let has_reason = content.lines().skip(1).any(|l| !l.trim().is_empty());
            if !has_reason {
                violations.push(PolicyViolation::new(
                    "reason-required",
                    format!("[{tag}] must explain its reasons after the first line"),
                ));
            }
        }
        _ => {}
    }
    violations
}

/// Apply `mode` to the rules: off skips, warn reports, block rejects.
pub fn run_check(
    mode: PolicyMode,
    agent: Agent,
    tag: Tag,
    content: &str,
) -> Result<Vec<PolicyViolation>> {
    if mode == PolicyMode::Off {
        return Ok(Vec::new());
    }
    let violations = check(agent, tag, content);
    if mode == PolicyMode::Block && !violations.is_empty() {
        return Err(DuetError::PolicyRejected(violations));
    }
    Ok(violations)
}
