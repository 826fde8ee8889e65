//! Delivery watcher: polls the turn flag and nudges the agent that holds it.

pub mod deliver;
#[cfg(test)]
pub(crate) mod fake;
mod listener;
pub mod lock;
pub mod pane;
pub mod state;
pub mod tmux;
pub mod transcript;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub use deliver::{Attempt, Deferral, DeliveryFailure};
pub use pane::{Keys, PaneInspector};
pub use state::{Backoff, PaneHealth, WatcherState};
pub use tmux::TmuxPanes;

use crate::agent::Agent;
use crate::config::WatcherConfig;
use crate::store::SessionStore;
use lock::PidLock;
use transcript::{EventLog, Transcripts};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NoSession,
    Idle,
    Delivered(Agent),
    Deferred(Agent, Deferral),
    Failed {
        agent: Agent,
        failure: DeliveryFailure,
        fail_count: u32,
    },
}

pub struct Watcher<P> {
    store: SessionStore,
    config: WatcherConfig,
    panes: P,
    state: WatcherState,
    transcripts: Transcripts,
    events: EventLog,
}

impl<P: PaneInspector> Watcher<P> {
    pub fn new(store: SessionStore, config: WatcherConfig, panes: P) -> Self {
        let transcripts = Transcripts::new(store.paths());
        let events = EventLog::new(store.paths().watcher_log());
        Self {
            store,
            config,
            panes,
            state: WatcherState::default(),
            transcripts,
            events,
        }
    }

    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Start transcript capture on both panes. Failures are logged; delivery
    /// then sees no output growth and retries.
    pub async fn attach_transcripts(&self) {
        for agent in Agent::ALL {
            let pane = self.config.pane_for(agent);
            if let Err(err) = self.transcripts.attach(&self.panes, pane, agent).await {
                warn!(%agent, pane, "{err:#}");
            }
        }
    }

    /// One poll cycle.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        if !self.store.exists() {
            return Ok(TickOutcome::NoSession);
        }
        let turn = self.store.turn()?;
        if let Some(change) = self.state.observe(turn) {
            let from = change.previous.map(Agent::as_str).unwrap_or("none");
            info!(from, to = %turn, "turn changed");
            self.events
                .record(&format!("===== turn: {from} -> {turn} ====="));
        }

        for agent in Agent::ALL {
            let pane = self.config.pane_for(agent);
            if let Err(err) = self
                .transcripts
                .enforce_limit(&self.panes, pane, agent, self.config.transcript_max_bytes)
                .await
            {
                warn!(%agent, "transcript rotation failed: {err:#}");
            }
        }

        let Some(agent) = self.state.owed() else {
            return Ok(TickOutcome::Idle);
        };

        match self.state.backoff() {
            Backoff::Normal => {}
            Backoff::Degraded => {
                warn!(
                    %agent,
                    failures = self.state.fail_count(),
                    "delivery degraded, waiting {:?} before retry",
                    self.config.degraded_delay
                );
                sleep(self.config.degraded_delay).await;
            }
            Backoff::Alert => {
                error!(
                    %agent,
                    failures = self.state.fail_count(),
                    "delivery keeps failing, operator attention needed"
                );
                self.events.record(&format!(
                    "ALERT: {} consecutive delivery failures to {agent}",
                    self.state.fail_count()
                ));
                sleep(self.config.degraded_delay).await;
            }
        }

        let was_paused = self.state.pane(agent).is_paused();
        let pane = self.config.pane_for(agent);
        let outcome = deliver::deliver(
            &self.panes,
            &self.config,
            pane,
            self.transcripts.path(agent),
            self.state.pane_mut(agent),
        )
        .await;

        Ok(match outcome {
            Attempt::Delivered => {
                self.state.record_delivered();
                info!(%agent, pane, "trigger delivered");
                self.events.record(&format!("delivered to {agent}"));
                TickOutcome::Delivered(agent)
            }
            Attempt::Failed(failure) => {
                let fail_count = self.state.record_failure();
                warn!(%agent, pane, fail_count, "delivery failed: {failure}");
                self.events
                    .record(&format!("delivery to {agent} failed ({fail_count}): {failure}"));
                TickOutcome::Failed {
                    agent,
                    failure,
                    fail_count,
                }
            }
            Attempt::Deferred(deferral) => {
                debug!(%agent, pane, ?deferral, "delivery deferred");
                if !was_paused && deferral == Deferral::Paused {
                    self.events
                        .record(&format!("{agent} pane paused on an interactive prompt"));
                }
                TickOutcome::Deferred(agent, deferral)
            }
        })
    }

    /// Poll until `shutdown` resolves. A wake from `wake` starts the next
    /// cycle early.
    pub async fn run(&mut self, wake: Arc<Notify>, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.tick() => {
                    if let Err(err) = outcome {
                        warn!("watcher cycle failed: {err:#}");
                    }
                }
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(self.config.poll_interval) => {}
                _ = wake.notified() => debug!("woken by session change"),
            }
        }
    }

    /// Stop capturing and archive transcripts.
    pub async fn shutdown(&self) -> Vec<PathBuf> {
        for agent in Agent::ALL {
            let pane = self.config.pane_for(agent);
            if let Err(err) = self.transcripts.detach(&self.panes, pane).await {
                debug!(%agent, pane, "detach failed: {err:#}");
            }
        }
        self.transcripts.archive()
    }
}

/// Run the watcher against tmux until Ctrl-C or SIGTERM.
pub async fn run_foreground(store: SessionStore, config: WatcherConfig) -> Result<()> {
    store.ensure_initialized()?;
    let panes = TmuxPanes::default();
    if !panes.has_session(&config.tmux_session).await {
        warn!(
            session = %config.tmux_session,
            "tmux session not found, deliveries will fail until it exists"
        );
    }

    let lock = PidLock::acquire(&store.paths().watcher_pid(), config.shutdown_grace).await?;
    let wake = Arc::new(Notify::new());
    let listener = if config.event_listener {
        listener::spawn(store.paths().root(), wake.clone())
    } else {
        None
    };

    let mut watcher = Watcher::new(store, config, panes);
    watcher.attach_transcripts().await;
    watcher
        .events()
        .record(&format!("watcher started (pid {})", lock.pid()));
    info!(pid = lock.pid(), "watcher started");

    watcher.run(wake, shutdown_signal()).await;

    if let Some(handle) = listener {
        handle.abort();
    }
    let archived = watcher.shutdown().await;
    for path in &archived {
        info!(path = %path.display(), "transcript archived");
    }
    watcher.events().record("watcher stopped");
    lock.release()?;
    info!("watcher stopped");
    Ok(())
}

async fn shutdown_signal() {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("cannot listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }
}
