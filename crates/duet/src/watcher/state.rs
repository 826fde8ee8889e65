use crate::agent::Agent;

/// Consecutive failures before waiting `degraded_delay` between attempts.
pub const DEGRADED_AFTER: u32 = 10;
/// Consecutive failures before each retry raises an operator alert.
pub const ALERT_AFTER: u32 = 30;
/// Consecutive prompt sightings that pause a pane.
pub const PROMPT_PAUSE_HITS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Normal,
    Degraded,
    Alert,
}

impl Backoff {
    pub fn for_failures(fail_count: u32) -> Self {
        if fail_count >= ALERT_AFTER {
            Self::Alert
        } else if fail_count >= DEGRADED_AFTER {
            Self::Degraded
        } else {
            Self::Normal
        }
    }
}

/// Interactive-prompt bookkeeping for one pane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneHealth {
    prompt_hits: u32,
    paused: bool,
    pause_size: u64,
}

impl PaneHealth {
    pub fn prompt_hits(&self) -> u32 {
        self.prompt_hits
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause_size(&self) -> u64 {
        self.pause_size
    }

    /// Count a prompt sighting. Returns true when this sighting paused the pane.
    pub fn record_prompt(&mut self, output_size: u64) -> bool {
        self.prompt_hits += 1;
        if !self.paused && self.prompt_hits >= PROMPT_PAUSE_HITS {
            self.paused = true;
            self.pause_size = output_size;
            return true;
        }
        false
    }

    pub fn clear_prompt(&mut self) {
        self.prompt_hits = 0;
    }

    /// Lift a pause once the pane has produced new output and the prompt is
    /// gone. Either condition alone keeps it paused. Returns true when the
    /// pane is usable.
    pub fn try_resume(&mut self, prompt_visible: bool, output_size: u64) -> bool {
        if !self.paused {
            return true;
        }
        if !prompt_visible && output_size != self.pause_size {
            self.paused = false;
            self.prompt_hits = 0;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnChange {
    pub previous: Option<Agent>,
    pub current: Agent,
}

/// In-memory delivery bookkeeping for one watcher process.
#[derive(Debug, Clone, Default)]
pub struct WatcherState {
    seen_turn: Option<Agent>,
    acked_turn: Option<Agent>,
    fail_count: u32,
    panes: [PaneHealth; 2],
}

impl WatcherState {
    pub fn seen_turn(&self) -> Option<Agent> {
        self.seen_turn
    }

    pub fn acked_turn(&self) -> Option<Agent> {
        self.acked_turn
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    /// Record the current turn; reports a change.
    pub fn observe(&mut self, turn: Agent) -> Option<TurnChange> {
        if self.seen_turn == Some(turn) {
            return None;
        }
        let previous = self.seen_turn.replace(turn);
        self.fail_count = 0;
        Some(TurnChange {
            previous,
            current: turn,
        })
    }

    /// Agent still owed a trigger for the turn it holds.
    pub fn owed(&self) -> Option<Agent> {
        self.seen_turn.filter(|seen| self.acked_turn != Some(*seen))
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::for_failures(self.fail_count)
    }

    pub fn record_delivered(&mut self) {
        self.acked_turn = self.seen_turn;
        self.fail_count = 0;
        if let Some(agent) = self.seen_turn {
            self.panes[agent.index()].clear_prompt();
        }
    }

    pub fn record_failure(&mut self) -> u32 {
        self.fail_count += 1;
        self.fail_count
    }

    pub fn pane(&self, agent: Agent) -> &PaneHealth {
        &self.panes[agent.index()]
    }

    pub fn pane_mut(&mut self, agent: Agent) -> &mut PaneHealth {
        &mut self.panes[agent.index()]
    }
}
