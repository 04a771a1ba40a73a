use std::io::Write;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};

use agenda_core::{Diagnostics, EngineConfig, EngineError};

#[test]
fn empty_file_gives_defaults() {
    let config = EngineConfig::from_toml_str("").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.default_timezone, "UTC");
    assert_eq!(config.max_occurrences, 1000);
    assert_eq!(config.forward_window_days, 730);
    assert_eq!(config.lookback_days, 7);
    assert_eq!(config.max_feed_bytes, 4 * 1024 * 1024);
    assert_eq!(config.refresh_interval(), StdDuration::from_secs(300));
    assert!(config.feeds.is_empty());
}

#[test]
fn reads_every_field() {
    let config = EngineConfig::from_toml_str(
        r#"
default_timezone = "Europe/Berlin"
max_occurrences = 250
forward_window_days = 30
lookback_days = 1
max_feed_bytes = 65536
refresh_interval_secs = 60
feeds = ["work.ics", "home.ics"]
"#,
    )
    .unwrap();
    assert_eq!(config.default_timezone, "Europe/Berlin");
    assert_eq!(config.max_occurrences, 250);
    assert_eq!(config.feeds, vec!["work.ics", "home.ics"]);

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let window = config.window_at(now);
    assert_eq!(window.start, now - Duration::days(1));
    assert_eq!(window.end, now + Duration::days(30));
    assert_eq!(window.max_occurrences, 250);

    let mut diag = Diagnostics::new();
    assert_eq!(
        config.resolver(&mut diag).default_zone(),
        chrono_tz::Tz::Europe__Berlin
    );
}

#[test]
fn rejects_unknown_keys() {
    let err = EngineConfig::from_toml_str("max_occurrence = 5").unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn rejects_out_of_range_values() {
    for text in [
        "max_occurrences = 0",
        "forward_window_days = 0",
        "forward_window_days = 100000",
        "lookback_days = -1",
        "refresh_interval_secs = 0",
    ] {
        assert!(
            matches!(EngineConfig::from_toml_str(text), Err(EngineError::Config(_))),
            "{} should be rejected",
            text
        );
    }
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "lookback_days = 3").unwrap();
    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.lookback_days, 3);

    let missing = EngineConfig::load(std::path::Path::new("/definitely/not/here.toml"));
    assert!(matches!(missing, Err(EngineError::Config(_))));
}
