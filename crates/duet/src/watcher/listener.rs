//! Optional filesystem listener that wakes the poll loop early.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::paths::TURN_FILE;

/// Candidate watch tools, tried in order. Both print one changed file per
/// line so [`wakes_on`] can pick out the turn file.
fn candidates(dir: &Path) -> Vec<(&'static str, Vec<String>)> {
    let dir = dir.to_string_lossy().into_owned();
    vec![
        (
            "inotifywait",
            vec![
                "-m".into(),
                "-q".into(),
                "-e".into(),
                "close_write,moved_to".into(),
                "--format".into(),
                "%f".into(),
                dir.clone(),
            ],
        ),
        ("fswatch", vec![dir]),
    ]
}

/// Only a write or rename onto `turn.txt` wakes the loop. Log and transcript
/// appends in the same directory must not cut the poll interval short.
fn wakes_on(line: &str) -> bool {
    Path::new(line.trim()).file_name().is_some_and(|name| name == TURN_FILE)
}

/// Spawn the first available watch tool on `dir`. Each event on the turn
/// file wakes `wake`. Returns `None` when no tool is installed.
pub fn spawn(dir: &Path, wake: Arc<Notify>) -> Option<JoinHandle<()>> {
    for (program, args) in candidates(dir) {
        let child = Command::new(program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        match child {
            Ok(child) => {
                info!(tool = program, "event listener started");
                return Some(tokio::spawn(forward(child, wake)));
            }
            Err(err) => debug!(tool = program, "event listener unavailable: {err}"),
        }
    }
    info!("no event listener available, polling only");
    None
}

async fn forward(mut child: Child, wake: Arc<Notify>) {
    let Some(stdout) = child.stdout.take() else {
        return;
    };
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if wakes_on(&line) {
            wake.notify_one();
        }
    }
    debug!("event listener exited");
}
