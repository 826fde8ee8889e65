use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DuetError;

/// One of the two collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    Author,
    Reviewer,
}

const AUTHOR_TAGS: &[Tag] = &[
    Tag::Plan,
    Tag::Research,
    Tag::Code,
    Tag::Fix,
    Tag::Challenge,
    Tag::Discuss,
    Tag::Question,
    Tag::Consensus,
];

const REVIEWER_TAGS: &[Tag] = &[
    Tag::Pass,
    Tag::NeedsWork,
    Tag::Challenge,
    Tag::Discuss,
    Tag::Question,
    Tag::Consensus,
];

impl Agent {
    pub const ALL: [Agent; 2] = [Agent::Author, Agent::Reviewer];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Reviewer => "reviewer",
        }
    }

    /// Capitalized name used in history headers.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Author => "Author",
            Self::Reviewer => "Reviewer",
        }
    }

    pub fn other(self) -> Agent {
        match self {
            Self::Author => Self::Reviewer,
            Self::Reviewer => Self::Author,
        }
    }

    pub fn allowed_tags(self) -> &'static [Tag] {
        match self {
            Self::Author => AUTHOR_TAGS,
            Self::Reviewer => REVIEWER_TAGS,
        }
    }

    pub fn allows(self, tag: Tag) -> bool {
        self.allowed_tags().contains(&tag)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Author => 0,
            Self::Reviewer => 1,
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Agent {
    type Err = DuetError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "author" => Ok(Self::Author),
            "reviewer" => Ok(Self::Reviewer),
            other => Err(DuetError::InvalidName(format!(
                "unknown agent '{other}' (expected author|reviewer)"
            ))),
        }
    }
}

/// Intent marker carried by the first line of every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tag {
    Plan,
    Research,
    Code,
    Fix,
    Pass,
    NeedsWork,
    Challenge,
    Discuss,
    Question,
    Consensus,
}

impl Tag {
    pub const ALL: [Tag; 10] = [
        Tag::Plan,
        Tag::Research,
        Tag::Code,
        Tag::Fix,
        Tag::Pass,
        Tag::NeedsWork,
        Tag::Challenge,
        Tag::Discuss,
        Tag::Question,
        Tag::Consensus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "PLAN",
            Self::Research => "RESEARCH",
            Self::Code => "CODE",
            Self::Fix => "FIX",
            Self::Pass => "PASS",
            Self::NeedsWork => "NEEDS_WORK",
            Self::Challenge => "CHALLENGE",
            Self::Discuss => "DISCUSS",
            Self::Question => "QUESTION",
            Self::Consensus => "CONSENSUS",
        }
    }

    pub fn parse(raw: &str) -> Option<Tag> {
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bracketed token at the very start of the first line, e.g. `CODE` for
/// `[CODE] done`. Returned raw so unknown tokens can be reported.
pub fn leading_token(content: &str) -> Option<&str> {
    let first = content.lines().next()?;
    let rest = first.strip_prefix('[')?;
    let (token, _) = rest.split_once(']')?;
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Recognized tag at the start of the first line.
pub fn extract_tag(content: &str) -> Option<Tag> {
    leading_token(content).and_then(Tag::parse)
}

/// First line with its leading tag removed.
pub fn extract_summary(content: &str) -> String {
    let first = content.lines().next().unwrap_or_default();
    match extract_tag(content) {
        Some(tag) => first[tag.as_str().len() + 2..].trim().to_string(),
        None => first.trim().to_string(),
    }
}
