use serde::Serialize;
use tracing::info;

use crate::agent::{Agent, Tag};
use crate::error::{DuetError, Result, tag_label};
use crate::policy::{self, PolicyViolation};
use crate::store::SessionStore;
use crate::time;

/// (author, reviewer) tag pairs that count as agreement.
pub const ACCEPTED_PAIRS: [(Tag, Tag); 3] = [
    (Tag::Consensus, Tag::Consensus),
    (Tag::Consensus, Tag::Pass),
    (Tag::Pass, Tag::Consensus),
];

/// Latest canonical tag of each slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LatestTags {
    pub author: Option<Tag>,
    pub reviewer: Option<Tag>,
}

impl LatestTags {
    pub fn read(store: &SessionStore) -> Result<Self> {
        Ok(Self {
            author: store.slot(Agent::Author)?.latest().map(|e| e.tag),
            reviewer: store.slot(Agent::Reviewer)?.latest().map(|e| e.tag),
        })
    }

    pub fn agreed(&self) -> bool {
        match (self.author, self.reviewer) {
            (Some(a), Some(r)) => ACCEPTED_PAIRS.contains(&(a, r)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReceipt {
    pub step: String,
    pub previous_step: String,
    pub forced: bool,
    pub tags: LatestTags,
}

/// Move to step `name` and reset the round, if both agents agree.
pub fn advance_step(store: &SessionStore, name: &str, force: bool) -> Result<StepReceipt> {
    store.ensure_initialized()?;
    let name = validate_step_name(name)?;

    let tags = LatestTags::read(store)?;
    if !force && !tags.agreed() {
        return Err(DuetError::Blocked {
            author: tags.author,
            reviewer: tags.reviewer,
        });
    }

    let previous_step = store.step()?;
    store.set_step(name)?;
    store.set_round(1)?;
    store.append_history(&format!(
        "\n---\n\n# Step: {name}\n\nStarted: {}\n\n",
        time::timestamp()
    ))?;
    info!(from = %previous_step, to = %name, forced = force, "step advanced");

    Ok(StepReceipt {
        step: name.to_string(),
        previous_step,
        forced: force,
        tags,
    })
}

fn validate_step_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DuetError::InvalidName("step name is empty".to_string()));
    }
    if name.contains(['\n', '\r']) {
        return Err(DuetError::InvalidName(format!(
            "step name must be a single line: {name:?}"
        )));
    }
    Ok(name)
}

/// Outcome of a read-only gate inspection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GateReport {
    pub tags: LatestTags,
    pub issues: Vec<String>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn inspect_consensus(store: &SessionStore) -> Result<GateReport> {
    store.ensure_initialized()?;
    let tags = LatestTags::read(store)?;
    let mut issues = Vec::new();
    if !tags.agreed() {
        issues.push(format!(
            "no consensus: author is [{}], reviewer is [{}]",
            tag_label(tags.author),
            tag_label(tags.reviewer)
        ));
    }
    Ok(GateReport { tags, issues })
}

/// Consensus plus the content rules on each agent's latest entry.
pub fn inspect_next_step(store: &SessionStore) -> Result<GateReport> {
    let mut report = inspect_consensus(store)?;
    for agent in Agent::ALL {
        if let PolicyInspection::Checked { violations, .. } = inspect_policy(store, agent)? {
            report
                .issues
                .extend(violations.into_iter().map(|v| format!("{agent}: {v}")));
        }
    }
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyInspection {
    NoSubmission,
    Checked {
        tag: Tag,
        violations: Vec<PolicyViolation>,
    },
}

/// Re-run the content rules on an agent's latest entry, whatever the mode.
pub fn inspect_policy(store: &SessionStore, agent: Agent) -> Result<PolicyInspection> {
    store.ensure_initialized()?;
    let log = store.slot(agent)?;
    Ok(match log.latest() {
        None => PolicyInspection::NoSubmission,
        Some(entry) => PolicyInspection::Checked {
            tag: entry.tag,
            violations: policy::check(agent, entry.tag, &entry.content),
        },
    })
}
