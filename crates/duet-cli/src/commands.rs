use std::path::Path;

use anyhow::{Context, Result, bail};
use duet::error::tag_label;
use duet::gate::{self, PolicyInspection};
use duet::submission;
use duet::watcher::lock::{self, WatcherStatus};
use duet::{Agent, ConfigOverrides, DuetError, PolicyMode, SessionStore, SubmissionInput, WatcherConfig};

/// Start a fresh session.
pub fn init(project: &Path, task: &str) -> Result<()> {
    let store = SessionStore::open(project);
    let outcome = store.init(task)?;
    if outcome.overwritten {
        eprintln!("warning: replaced the existing session in {}", store.paths().root().display());
    }
    println!("Session initialized: {}", store.paths().root().display());
    println!("Turn: author");
    Ok(())
}

pub fn whose_turn(project: &Path) -> Result<()> {
    let store = SessionStore::open(project);
    store.ensure_initialized()?;
    println!("{}", store.turn()?);
    Ok(())
}

pub fn submit(project: &Path, agent: Agent, input: SubmissionInput) -> Result<()> {
    let store = SessionStore::open(project);
    store.ensure_initialized()?;
    let (content, source) = input.read().context("failed to read submission")?;
    let mode = PolicyMode::from_env();

    let receipt = match submission::submit(&store, agent, &content, source, mode) {
        Ok(receipt) => receipt,
        Err(DuetError::PolicyRejected(violations)) => {
            for v in &violations {
                eprintln!("  - {v}");
            }
            bail!(
                "submission rejected by policy ({} violation(s), DUET_POLICY_MODE={})",
                violations.len(),
                mode.as_str()
            );
        }
        Err(err) => return Err(err.into()),
    };

    for v in &receipt.warnings {
        eprintln!("warning: {v}");
    }
    println!("Submitted: [{}] {}", receipt.tag, receipt.summary);
    if receipt.round_after != receipt.round_before {
        println!("Round: {} -> {}", receipt.round_before, receipt.round_after);
    } else {
        println!("Round: {}", receipt.round_after);
    }
    println!("Turn: {}", receipt.next_turn);
    Ok(())
}

pub fn status(project: &Path, json: bool) -> Result<()> {
    let store = SessionStore::open(project);
    let snapshot = store.snapshot()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    println!("Task:        {}", snapshot.task);
    println!("Step:        {}", snapshot.step);
    println!("Round:       {}", snapshot.round);
    println!("Turn:        {}", snapshot.turn);
    println!("Last action: {}", snapshot.last_action);
    Ok(())
}

pub fn read(project: &Path, name: &str) -> Result<()> {
    let store = SessionStore::open(project);
    match store.read_file(name)? {
        Some(text) => print!("{text}"),
        None => println!("(File {name} does not exist)"),
    }
    Ok(())
}

pub fn history(project: &Path) -> Result<()> {
    let store = SessionStore::open(project);
    print!("{}", store.history()?);
    Ok(())
}

pub fn step(project: &Path, name: &str, force: bool) -> Result<()> {
    let store = SessionStore::open(project);
    let receipt = gate::advance_step(&store, name, force)?;
    if receipt.forced && !receipt.tags.agreed() {
        eprintln!(
            "warning: forced past missing consensus (author [{}], reviewer [{}])",
            tag_label(receipt.tags.author),
            tag_label(receipt.tags.reviewer)
        );
    }
    println!("Entered step: {} (round reset to 1)", receipt.step);
    Ok(())
}

pub fn archive(project: &Path, name: Option<&str>) -> Result<()> {
    let store = SessionStore::open(project);
    let dest = store.archive(name)?;
    println!("Archived: {}", dest.display());
    Ok(())
}

pub fn clean(project: &Path) -> Result<()> {
    let store = SessionStore::open(project);
    if store.clean()? {
        println!("Session cleaned");
    } else {
        println!("No session to clean");
    }
    Ok(())
}

pub fn policy_check(project: &Path, agent: Agent) -> Result<()> {
    let store = SessionStore::open(project);
    match gate::inspect_policy(&store, agent)? {
        PolicyInspection::NoSubmission => {
            println!("{agent} has not submitted yet");
            Ok(())
        }
        PolicyInspection::Checked { tag, violations } if violations.is_empty() => {
            println!("{agent} [{tag}]: ok");
            Ok(())
        }
        PolicyInspection::Checked { tag, violations } => {
            for v in &violations {
                eprintln!("  - {v}");
            }
            bail!("{agent} [{tag}] violates {} rule(s)", violations.len());
        }
    }
}

pub fn check_consensus(project: &Path) -> Result<()> {
    let store = SessionStore::open(project);
    report(gate::inspect_consensus(&store)?, "consensus reached")
}

pub fn check_next_step(project: &Path) -> Result<()> {
    let store = SessionStore::open(project);
    report(gate::inspect_next_step(&store)?, "ready for the next step")
}

fn report(gate_report: duet::GateReport, ok: &str) -> Result<()> {
    println!(
        "author: [{}]  reviewer: [{}]",
        tag_label(gate_report.tags.author),
        tag_label(gate_report.tags.reviewer)
    );
    if gate_report.passed() {
        println!("{ok}");
        return Ok(());
    }
    for issue in &gate_report.issues {
        eprintln!("  - {issue}");
    }
    bail!("{} issue(s) found", gate_report.issues.len());
}

pub async fn watcher_run(project: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = WatcherConfig::load(project, overrides)?;
    let store = SessionStore::open(project);
    println!(
        "Watching {} (author pane {}, reviewer pane {}); Ctrl-C to stop",
        store.paths().root().display(),
        config.author_pane,
        config.reviewer_pane
    );
    duet::watcher::run_foreground(store, config).await
}

pub async fn watcher_stop(project: &Path) -> Result<()> {
    let store = SessionStore::open(project);
    let grace = WatcherConfig::default().shutdown_grace;
    match lock::stop(&store.paths().watcher_pid(), grace).await? {
        Some(pid) => println!("watcher stopped (pid: {pid})"),
        None => println!("watcher is not running"),
    }
    Ok(())
}

pub fn watcher_status(project: &Path) -> Result<()> {
    let store = SessionStore::open(project);
    let pid_path = store.paths().watcher_pid();
    match lock::status(&pid_path)? {
        WatcherStatus::Running(pid) => println!("watcher is running (pid: {pid})"),
        WatcherStatus::Stale(Some(pid)) => {
            println!("watcher is not running (stale pid file for {pid})");
            let _ = std::fs::remove_file(&pid_path);
        }
        WatcherStatus::Stale(None) => {
            println!("watcher is not running (unreadable pid file)");
            let _ = std::fs::remove_file(&pid_path);
        }
        WatcherStatus::Stopped => println!("watcher is not running"),
    }
    Ok(())
}
