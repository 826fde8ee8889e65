use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn duet(project: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("duet");
    cmd.arg("--project")
        .arg(project)
        .env_remove("DUET_PROJECT_DIR")
        .env("DUET_POLICY_MODE", "off")
        .env("RUST_LOG", "off");
    cmd
}

fn init(project: &Path) {
    duet(project)
        .args(["init", "build", "a", "parser"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Session initialized"));
}

#[test]
fn full_round_trip_reaches_next_step() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);

    duet(p)
        .arg("whose-turn")
        .assert()
        .success()
        .stdout("author\n");

    duet(p)
        .args(["submit", "author", "[PLAN] x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Turn: reviewer"));

    duet(p)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"turn\": \"reviewer\""))
        .stdout(predicate::str::contains("\"round\": 1"));

    duet(p)
        .args(["submit", "reviewer", "[PASS] ok\n\nreason"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Round: 1 -> 2"))
        .stdout(predicate::str::contains("Turn: author"));

    duet(p)
        .args(["step", "implementation"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("author is [PLAN], reviewer is [PASS]"));

    duet(p)
        .args(["submit", "author", "[CONSENSUS] agreed"])
        .assert()
        .success();
    duet(p)
        .args(["submit", "reviewer", "[CONSENSUS] agreed"])
        .assert()
        .success();

    duet(p)
        .args(["policy", "check-consensus"])
        .assert()
        .success()
        .stdout(predicate::str::contains("consensus reached"));

    duet(p)
        .args(["step", "implementation"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entered step: implementation"));

    duet(p)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Step:        implementation"))
        .stdout(predicate::str::contains("Round:       1"));
}

#[test]
fn wrong_turn_fails_without_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);

    duet(p)
        .args(["submit", "reviewer", "[PASS] ok\n\nwhy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("author's turn"));
    duet(p).arg("whose-turn").assert().stdout("author\n");
}

#[test]
fn invalid_tag_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);

    duet(p)
        .args(["submit", "author", "[PASS] not mine"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("valid tag"));
}

#[test]
fn block_mode_rejects_code_without_tests() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);

    duet(p)
        .env("DUET_POLICY_MODE", "block")
        .args(["submit", "author", "[CODE] done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("test-results"));
    duet(p).arg("whose-turn").assert().stdout("author\n");

    duet(p)
        .env("DUET_POLICY_MODE", "warn")
        .args(["submit", "author", "[CODE] done"])
        .assert()
        .success()
        .stderr(predicate::str::contains("warning: test-results"));

    duet(p)
        .args(["policy", "check", "author"])
        .assert()
        .failure();
}

#[test]
fn submit_from_file_keeps_history_short() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);
    let msg = p.join("msg.md");
    fs::write(&msg, "[PLAN] from a file\n\nlong body that stays in work.md\n").expect("write");

    duet(p)
        .args(["submit", "author", "--file"])
        .arg(&msg)
        .assert()
        .success();

    duet(p)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("submitted via file"))
        .stdout(predicate::str::contains("long body").not());

    duet(p)
        .args(["read", "work.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("long body that stays in work.md"));
}

#[test]
fn submit_from_stdin() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);

    duet(p)
        .args(["submit", "author", "--stdin"])
        .write_stdin("[RESEARCH] notes\nreference: foo\nkey type: Bar\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted: [RESEARCH] notes"));
}

#[test]
fn read_rejects_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);

    duet(p)
        .args(["read", "../secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bare file name"));
    duet(p)
        .args(["read", "nope.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("does not exist"));
}

#[test]
fn commands_require_a_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    duet(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn submit_checks_the_session_before_reading_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.md");
    duet(dir.path())
        .args(["submit", "author", "--file"])
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"))
        .stderr(predicate::str::contains("failed to read submission").not());
    duet(dir.path())
        .args(["submit", "author", "--stdin"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn forced_step_archive_and_clean() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);

    duet(p)
        .args(["step", "--force", "review"])
        .assert()
        .success()
        .stderr(predicate::str::contains("forced past missing consensus"));

    duet(p).args(["archive", "first"]).assert().success();
    assert!(p.join(".duet-archive/first/history.md").is_file());

    duet(p)
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session cleaned"));
    assert!(!p.join(".duet").exists());
}

#[test]
fn watcher_status_without_watcher() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);

    duet(p)
        .args(["watcher", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
    duet(p)
        .args(["watcher", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[test]
fn empty_pid_file_reads_as_not_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);
    let pid_file = p.join(".duet").join("watcher.pid");
    fs::write(&pid_file, "").expect("write");

    duet(p)
        .args(["watcher", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
    assert!(!pid_file.exists());

    fs::write(&pid_file, "").expect("write");
    duet(p)
        .args(["watcher", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unreadable pid file"));
}

#[test]
fn reinit_warns_about_overwrite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path();
    init(p);
    duet(p)
        .args(["init", "again"])
        .assert()
        .success()
        .stderr(predicate::str::contains("replaced the existing session"));
}
