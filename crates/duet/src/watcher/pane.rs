//! The terminal contract the watcher relies on, plus the text heuristics
//! applied to what a pane shows.

use std::future::Future;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

/// Keystrokes the watcher can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keys {
    /// Typed verbatim, no key-name interpretation.
    Literal(String),
    /// Enter.
    Submit,
    /// Clear the current input line (C-u).
    ClearLine,
}

/// Everything the watcher needs from a terminal multiplexer.
pub trait PaneInspector: Send + Sync {
    /// Name of the process in the pane's foreground, e.g. `claude` or `bash`.
    fn foreground_process(&self, pane: &str) -> impl Future<Output = Result<String>> + Send;

    /// The last `lines` non-empty lines visible in the pane.
    fn recent_text(&self, pane: &str, lines: usize) -> impl Future<Output = Result<String>> + Send;

    fn inject(&self, pane: &str, keys: Keys) -> impl Future<Output = Result<()>> + Send;

    /// Start appending pane output to `path`, or stop when `None`.
    fn capture_to(&self, pane: &str, path: Option<&Path>)
    -> impl Future<Output = Result<()>> + Send;
}

const SHELLS: &[&str] = &[
    "bash", "zsh", "sh", "fish", "dash", "ksh", "tcsh", "csh", "nu",
];

/// True when the foreground command is an interactive shell rather than an agent.
pub fn is_bare_shell(command: &str) -> bool {
    let command = command.trim();
    let command = command.strip_prefix('-').unwrap_or(command);
    let name = command.rsplit('/').next().unwrap_or(command);
    SHELLS.contains(&name)
}

fn prompt_signatures() -> &'static [(&'static str, Regex)] {
    static SIGNATURES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    SIGNATURES.get_or_init(|| {
        [
            ("password", r"(?im)^.*\bpassword\b.*:\s*$"),
            ("passphrase", r"(?im)^.*\bpassphrase\b.*:\s*$"),
            (
                "credential",
                r"(?im)^.*\b(token|credentials?|api[ _-]?key|secret)\b.*:\s*$",
            ),
            ("confirmation", r"(?i)\[y/n\]"),
            ("confirmation", r"(?i)\(yes/no(/\[fingerprint\])?\)"),
            (
                "one-time code",
                r"(?im)^.*\b(otp|one[- ]time (pass)?code|verification code|authenticator code|2fa code)\b.*:\s*$",
            ),
            ("press enter", r"(?i)press (enter|return) to continue"),
            ("permission", r"(?i)do you want to (proceed|allow)"),
        ]
        .into_iter()
        .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (label, re)))
        .collect()
    })
}

/// Label of the first interactive-prompt signature found in `text`.
pub fn detect_prompt(text: &str) -> Option<&'static str> {
    prompt_signatures()
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(label, _)| *label)
}

const INPUT_MARKERS: &[&str] = &[">", "❯", "›"];

/// True when an input line still holds the unsubmitted trigger, e.g. `> go`
/// or `│ > go │` inside a boxed input area.
pub fn is_stuck_input(tail: &str, trigger: &str) -> bool {
    tail.lines().any(|line| {
        let line = line.trim().trim_matches('│').trim();
        INPUT_MARKERS
            .iter()
            .filter_map(|marker| line.strip_prefix(marker))
            .any(|rest| rest.trim() == trigger)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_shells() {
        for cmd in ["bash", "-zsh", "/bin/sh", "fish", "nu", " dash "] {
            assert!(is_bare_shell(cmd), "{cmd}");
        }
        for cmd in ["claude", "node", "codex", "bashful", "python3"] {
            assert!(!is_bare_shell(cmd), "{cmd}");
        }
    }

    #[test]
    fn detects_prompts() {
        assert_eq!(detect_prompt("[sudo] password for me:"), Some("password"));
        assert_eq!(detect_prompt("Enter passphrase for key '/k':  "), Some("passphrase"));
        assert_eq!(detect_prompt("Paste your API key:"), Some("credential"));
        assert_eq!(detect_prompt("Overwrite? [y/N] "), Some("confirmation"));
        assert_eq!(
            detect_prompt("Are you sure you want to continue connecting (yes/no/[fingerprint])?"),
            Some("confirmation")
        );
        assert_eq!(detect_prompt("Enter verification code:"), Some("one-time code"));
        assert_eq!(detect_prompt("Press Enter to continue..."), Some("press enter"));
        assert_eq!(detect_prompt(" Do you want to proceed?\n ❯ 1. Yes"), Some("permission"));
    }

    #[test]
    fn ordinary_output_is_not_a_prompt() {
        let text = "Updated the password hashing module.\nAll tests pass.\n> ";
        assert_eq!(detect_prompt(text), None);
        assert_eq!(detect_prompt("token refresh logic: done\nok"), None);
    }

    #[test]
    fn detects_stuck_trigger() {
        assert!(is_stuck_input("output\n> go", "go"));
        assert!(is_stuck_input("❯ go  ", "go"));
        assert!(is_stuck_input("│ > go                 │", "go"));
        assert!(is_stuck_input("› go", "go"));
        assert!(!is_stuck_input("> ", "go"));
        assert!(!is_stuck_input("> going on", "go"));
        assert!(!is_stuck_input("go", "go"));
    }
}
