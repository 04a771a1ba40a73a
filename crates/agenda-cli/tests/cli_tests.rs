//! Integration tests for the `agenda` CLI binary.
//!
//! These tests use `assert_cmd` and `predicates` to exercise the events,
//! select and watch subcommands through the actual binary, including stdin
//! input, feed concatenation, hidden events and error reporting.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

const NOW: &str = "2024-05-14T12:00:00Z";

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn agenda() -> Command {
    Command::cargo_bin("agenda").unwrap()
}

/// Run a subcommand that succeeds and parse its stdout as JSON.
fn json_output(args: &[&str]) -> serde_json::Value {
    let output = agenda().args(args).assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout should be JSON")
}

// ─────────────────────────────────────────────────────────────────────────────
// events subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn events_from_file() {
    let team = fixture("team.ics");
    let events = json_output(&["events", "-i", &team, "--now", NOW]);
    let events = events.as_array().expect("events should be an array");

    let titles: Vec<&str> = events.iter().map(|e| e["title"].as_str().unwrap()).collect();
    assert_eq!(titles.iter().filter(|t| **t == "Standup").count(), 16);
    assert_eq!(titles.iter().filter(|t| **t == "Standup (moved)").count(), 1);
    assert!(titles.contains(&"Design review"));
    assert!(titles.contains(&"Offsite"));
    assert!(!titles.contains(&"Missing start"));

    let moved = events
        .iter()
        .find(|e| e["title"] == "Standup (moved)")
        .unwrap();
    assert_eq!(moved["id"], "standup@example.com@20240515T073000Z");
    assert_eq!(moved["start"], "2024-05-15T09:00:00Z");
    assert_eq!(moved["is_hidden"], false);

    let offsite = events.iter().find(|e| e["title"] == "Offsite").unwrap();
    assert_eq!(offsite["is_all_day"], true);
    assert_eq!(offsite["end"], "2024-05-18T00:00:00Z");
}

#[test]
fn events_from_stdin() {
    let home = std::fs::read_to_string(fixture("home.ics")).unwrap();
    agenda()
        .args(["events", "--now", NOW])
        .write_stdin(home)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"Dentist\""))
        .stdout(predicate::str::contains("dentist@example.org@20240514T120500Z"));
}

#[test]
fn events_report_malformed_blocks_on_stderr() {
    agenda()
        .args(["events", "-i", &fixture("team.ics"), "--now", NOW])
        .assert()
        .success()
        .stderr(predicate::str::contains("missing DTSTART"));
}

#[test]
fn events_not_a_calendar_fails() {
    agenda()
        .args(["events", "-i", &fixture("not-a-calendar.txt")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to build events from feed"))
        .stderr(predicate::str::contains("BEGIN:VCALENDAR"));
}

#[test]
fn events_missing_file_fails() {
    agenda()
        .args(["events", "-i", "/nonexistent/feed.ics"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn events_respect_size_ceiling_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("agenda.toml");
    std::fs::write(&config, "max_feed_bytes = 64\n").unwrap();

    agenda()
        .args(["events", "-i", &fixture("team.ics")])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Feed too large"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("agenda.toml");
    std::fs::write(&config, "max_ocurrences = 10\n").unwrap();

    agenda()
        .args(["events", "-i", &fixture("home.ics")])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

// ─────────────────────────────────────────────────────────────────────────────
// select subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn select_picks_next_meeting() {
    let selection = json_output(&["select", "-i", &fixture("team.ics"), "--now", NOW]);

    assert_eq!(selection["primary"]["title"], "Design review");
    let upcoming: Vec<&str> = selection["upcoming"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert_eq!(upcoming, vec!["Standup (moved)", "Offsite", "Standup"]);
    assert_eq!(selection["later"].as_array().unwrap().len(), 5);
}

#[test]
fn select_concatenates_feeds() {
    let selection = json_output(&[
        "select",
        "-i",
        &fixture("team.ics"),
        "-i",
        &fixture("home.ics"),
        "--now",
        NOW,
    ]);
    assert_eq!(selection["primary"]["title"], "Dentist");
    assert_eq!(selection["upcoming"][0]["title"], "Design review");
}

#[test]
fn select_hides_requested_events() {
    let selection = json_output(&[
        "select",
        "-i",
        &fixture("team.ics"),
        "--now",
        NOW,
        "--hide",
        "review@example.com@20240514T130000Z",
    ]);
    assert_eq!(selection["primary"]["title"], "Standup (moved)");
    let listed = serde_json::to_string(&selection).unwrap();
    assert!(!listed.contains("Design review"));
}

#[test]
fn select_nothing_left_gives_null_primary() {
    agenda()
        .args(["select", "-i", &fixture("home.ics"), "--now", "2030-01-01T00:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"primary\": null"));
}

#[test]
fn select_rejects_malformed_hide_id() {
    agenda()
        .args(["select", "-i", &fixture("home.ics"), "--hide", "not-an-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid event id"));
}

#[test]
fn select_rejects_malformed_now() {
    agenda()
        .args(["select", "-i", &fixture("home.ics"), "--now", "tomorrow"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RFC 3339"));
}

// ─────────────────────────────────────────────────────────────────────────────
// watch subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn watch_once_prints_selection() {
    agenda()
        .args(["watch", "--once", "--config", &fixture("watch.toml")])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"primary\""))
        .stdout(predicate::str::contains("\"upcoming\""))
        .stdout(predicate::str::contains("\"later\""));
}

#[test]
fn watch_once_reports_unreadable_feed() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("agenda.toml");
    std::fs::write(&config, "feeds = [\"missing.ics\"]\n").unwrap();

    agenda()
        .args(["watch", "--once", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Refresh failed"))
        .stderr(predicate::str::contains("missing.ics"));
}

#[test]
fn watch_without_feeds_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("agenda.toml");
    std::fs::write(&config, "refresh_interval_secs = 10\n").unwrap();

    agenda()
        .args(["watch", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No feeds configured"));
}

// ─────────────────────────────────────────────────────────────────────────────
// General
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn no_subcommand_shows_usage() {
    agenda()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn version_flag() {
    agenda()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("agenda"));
}
