use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("stdkit").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Run a batch of simulated jobs through a FIFO bounded-concurrency semaphore",
        ));
}

#[test]
fn test_version_output() {
    let mut cmd = Command::cargo_bin("stdkit").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stdkit"));
}

#[test]
fn test_batch_reports_summary() {
    let mut cmd = Command::cargo_bin("stdkit").unwrap();
    cmd.args(["--limit", "2", "--jobs", "6", "--delay-ms", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded: 6"))
        .stdout(predicate::str::contains("failed: 0"))
        .stdout(predicate::str::contains("peak concurrency: 2"));
}

#[test]
fn test_failed_jobs_exit_with_error() {
    let mut cmd = Command::cargo_bin("stdkit").unwrap();
    cmd.args(["--limit", "3", "--jobs", "4", "--delay-ms", "1", "--fail-on", "2"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("succeeded: 3"))
        .stdout(predicate::str::contains("failed: 1"))
        .stderr(predicate::str::contains("1 of 4 jobs failed"));
}

#[test]
fn test_invalid_job_count() {
    let mut cmd = Command::cargo_bin("stdkit").unwrap();
    cmd.args(["--jobs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid arguments"));
}

#[test]
fn test_fail_on_outside_batch() {
    let mut cmd = Command::cargo_bin("stdkit").unwrap();
    cmd.args(["--jobs", "2", "--fail-on", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside the batch of 2 jobs"));
}

#[test]
fn test_quiet_mode_prints_nothing() {
    let mut cmd = Command::cargo_bin("stdkit").unwrap();
    cmd.args(["--quiet", "--jobs", "3", "--delay-ms", "1"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
