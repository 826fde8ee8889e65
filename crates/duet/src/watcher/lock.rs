//! `watcher.pid`: at most one watcher per session.
//!
//! The running watcher holds an exclusive `flock` on the PID file for its
//! whole lifetime. The recorded pid is only trusted while that lock is held,
//! so a file left behind by a crash (stale, empty or half written) never
//! causes a signal to be sent.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
    Running(i32),
    /// A PID file exists but no watcher holds it. The pid is `None` when the
    /// file is empty or unreadable as a number.
    Stale(Option<i32>),
    Stopped,
}

/// The pid recorded in `path`. Empty or malformed content reads as `None`.
pub fn read_pid(path: &Path) -> Result<Option<i32>> {
    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => match raw.trim().parse() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => {
                warn!(path = %path.display(), "ignoring malformed pid file");
                Ok(None)
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

pub fn is_alive(pid: i32) -> bool {
    pid > 0 && unsafe { libc::kill(pid, 0) } == 0
}

fn signal(pid: i32, sig: libc::c_int) {
    if pid > 0 {
        unsafe {
            libc::kill(pid, sig);
        }
    }
}

fn open_pid_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Non-blocking exclusive lock. `Ok(false)` when another descriptor holds it.
fn try_lock(file: &File) -> Result<bool> {
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err).context("flock failed")
    }
}

/// Whether a live watcher holds the lock on `path`.
fn is_held(path: &Path) -> Result<bool> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open {}", path.display()));
        }
    };
    // Dropping `file` releases the lock taken for this check.
    Ok(!try_lock(&file)?)
}

/// The locked descriptor still names the file at `path` (not an unlinked one).
fn still_linked(file: &File, path: &Path) -> Result<bool> {
    let held = file.metadata().context("failed to stat locked pid file")?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to stat {}", path.display())),
    }
}

/// Overwrite in place. Readers only trust the content while the lock is held,
/// so a torn write is never mistaken for a live watcher.
fn write_pid(file: &mut File, pid: u32) -> std::io::Result<()> {
    file.set_len(0)?;
    file.rewind()?;
    file.write_all(pid.to_string().as_bytes())?;
    file.sync_all()
}

pub fn status(path: &Path) -> Result<WatcherStatus> {
    if !path.exists() {
        return Ok(WatcherStatus::Stopped);
    }
    let pid = read_pid(path)?;
    Ok(match pid {
        Some(pid) if is_held(path)? => WatcherStatus::Running(pid),
        pid => WatcherStatus::Stale(pid),
    })
}

/// SIGTERM, then SIGKILL once `grace` runs out.
async fn terminate(pid: i32, grace: Duration) {
    signal(pid, libc::SIGTERM);
    let deadline = Instant::now() + grace;
    while is_alive(pid) && Instant::now() < deadline {
        sleep(POLL).await;
    }
    if is_alive(pid) {
        warn!(pid, "watcher ignored SIGTERM, sending SIGKILL");
        signal(pid, libc::SIGKILL);
    }
}

/// Stop the watcher that holds `path`. Returns the pid that was signalled.
/// Files nobody holds are stale and are removed without signalling anyone.
pub async fn stop(path: &Path, grace: Duration) -> Result<Option<i32>> {
    if !path.exists() {
        return Ok(None);
    }
    if !is_held(path)? {
        if let Some(pid) = read_pid(path)? {
            info!(pid, "removing stale watcher.pid");
        }
        let _ = fs::remove_file(path);
        return Ok(None);
    }
    let Some(pid) = read_pid(path)? else {
        bail!("{} is locked but names no pid", path.display());
    };
    if pid == std::process::id() as i32 {
        return Ok(None);
    }
    terminate(pid, grace).await;
    let _ = fs::remove_file(path);
    Ok(Some(pid))
}

/// Ownership of `watcher.pid` for this process. The lock is released when
/// this value is dropped.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    pid: u32,
    _file: File,
}

impl PidLock {
    /// Replace any live prior watcher, then record our pid.
    pub async fn acquire(path: &Path, grace: Duration) -> Result<Self> {
        let own = std::process::id();
        let deadline = Instant::now() + grace + POLL * 10;
        let mut superseded = false;
        let mut file = loop {
            let file = open_pid_file(path)?;
            if try_lock(&file)? {
                if still_linked(&file, path)? {
                    break file;
                }
                continue;
            }
            if !superseded {
                superseded = true;
                match read_pid(path)? {
                    Some(prior) if prior != own as i32 => {
                        terminate(prior, grace).await;
                        info!(pid = prior, "superseded previous watcher");
                    }
                    _ => {}
                }
            } else if Instant::now() >= deadline {
                bail!("{} is held by another watcher", path.display());
            } else {
                sleep(POLL).await;
            }
        };
        if let Some(prior) = read_pid(path)? {
            if prior != own as i32 {
                info!(pid = prior, "replacing stale watcher.pid");
            }
        }
        write_pid(&mut file, own).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            pid: own,
            _file: file,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the PID file if it still names this process.
    pub fn release(self) -> Result<bool> {
        match read_pid(&self.path)? {
            Some(pid) if pid == self.pid as i32 => {
                fs::remove_file(&self.path)
                    .with_context(|| format!("failed to remove {}", self.path.display()))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
