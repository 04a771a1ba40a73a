//! End-to-end tests: feed text through parsing, expansion and normalization.

use chrono::{DateTime, TimeZone, Utc};

use agenda_core::{
    select, EngineConfig, EngineError, EventId, HiddenSet, NormalizedEvent, Pipeline, Warning,
};

const TEAM_FEED: &str = "BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//agenda//tests//EN
BEGIN:VTIMEZONE
TZID:America/New_York
END:VTIMEZONE
BEGIN:VEVENT
UID:standup@example.com
SUMMARY:Standup
DTSTART;TZID=America/New_York:20240101T090000
DTEND;TZID=America/New_York:20240101T091500
RRULE:FREQ=WEEKLY;BYDAY=MO;COUNT=10
EXDATE;TZID=America/New_York:20240122T090000
END:VEVENT
BEGIN:VEVENT
UID:standup@example.com
RECURRENCE-ID;TZID=America/New_York:20240115T090000
SUMMARY:Standup (late start)
DTSTART;TZID=America/New_York:20240115T100000
DTEND;TZID=America/New_York:20240115T101500
SEQUENCE:1
END:VEVENT
BEGIN:VEVENT
UID:offsite@example.com
SUMMARY:Offsite
LOCATION:Harbor Hall
DTSTART:20240117T140000Z
DURATION:PT3H
END:VEVENT
BEGIN:VEVENT
UID:dropped@example.com
SUMMARY:Dropped
STATUS:CANCELLED
DTSTART:20240118T140000Z
DURATION:PT1H
END:VEVENT
END:VCALENDAR
";

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn run(documents: &[&str], hidden: &HiddenSet, now: DateTime<Utc>) -> Vec<NormalizedEvent> {
    Pipeline::default()
        .run(documents, hidden, now)
        .expect("pipeline should succeed")
        .events
}

fn titled<'a>(events: &'a [NormalizedEvent], title: &str) -> Vec<&'a NormalizedEvent> {
    events.iter().filter(|e| e.title == title).collect()
}

#[test]
fn builds_series_with_override_exception_and_singles() {
    let events = run(&[TEAM_FEED], &HiddenSet::new(), utc(2024, 1, 10, 0, 0));

    // Ten Mondays from Jan 1; Jan 1 is before the lookback window and Jan 22
    // is excluded, and Jan 15 is replaced.
    assert_eq!(titled(&events, "Standup").len(), 7);
    let moved = titled(&events, "Standup (late start)");
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].start, utc(2024, 1, 15, 15, 0));
    assert_eq!(moved[0].id.to_string(), "standup@example.com@20240115T140000Z");
    assert!(events.iter().all(|e| e.start != utc(2024, 1, 22, 14, 0)));

    let offsite = titled(&events, "Offsite");
    assert_eq!(offsite[0].end, utc(2024, 1, 17, 17, 0));
    assert_eq!(offsite[0].location.as_deref(), Some("Harbor Hall"));

    assert!(titled(&events, "Dropped").is_empty());
    assert_eq!(events.len(), 9);
    for pair in events.windows(2) {
        assert!(pair[0].start <= pair[1].start, "events must be ordered by start");
    }
}

#[test]
fn identities_are_stable_across_refreshes() {
    let early = run(&[TEAM_FEED], &HiddenSet::new(), utc(2024, 1, 10, 0, 0));
    let later = run(&[TEAM_FEED], &HiddenSet::new(), utc(2024, 1, 12, 0, 0));

    let id = EventId::new("standup@example.com", utc(2024, 1, 29, 14, 0));
    assert!(early.iter().any(|e| e.id == id));
    assert!(later.iter().any(|e| e.id == id));
}

#[test]
fn hidden_ids_mark_matching_events() {
    let hidden: HiddenSet = [EventId::new("standup@example.com", utc(2024, 1, 15, 14, 0))]
        .into_iter()
        .collect();
    let now = utc(2024, 1, 15, 13, 0);
    let events = run(&[TEAM_FEED], &hidden, now);

    let moved = titled(&events, "Standup (late start)");
    assert!(moved[0].is_hidden, "hiding by slot follows the moved occurrence");

    let result = select(&events, now);
    assert_eq!(result.primary.unwrap().title, "Offsite");
}

#[test]
fn documents_are_concatenated_in_order() {
    let second = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nUID:home\nSUMMARY:Dentist\nDTSTART:20240111T080000Z\nDURATION:PT1H\nEND:VEVENT\nEND:VCALENDAR\n";
    let events = run(&[TEAM_FEED, second], &HiddenSet::new(), utc(2024, 1, 10, 0, 0));
    assert_eq!(events.len(), 10);
    assert_eq!(events[1].title, "Dentist");
}

#[test]
fn one_bad_document_fails_the_run() {
    let result = Pipeline::default().run(
        &[TEAM_FEED, "HTTP/1.1 503 Service Unavailable"],
        &HiddenSet::new(),
        utc(2024, 1, 10, 0, 0),
    );
    assert!(matches!(result, Err(EngineError::Format(_))));
}

#[test]
fn per_event_problems_surface_as_warnings() {
    let feed = "BEGIN:VCALENDAR
BEGIN:VEVENT
UID:ok
DTSTART;TZID=Atlantis/Central:20240111T090000
DURATION:PT30M
END:VEVENT
BEGIN:VEVENT
UID:broken
SUMMARY:No start
END:VEVENT
BEGIN:VEVENT
UID:backwards
DTSTART:20240111T100000Z
DTEND:20240111T090000Z
END:VEVENT
END:VCALENDAR
";
    let output = Pipeline::default()
        .run(&[feed], &HiddenSet::new(), utc(2024, 1, 10, 0, 0))
        .unwrap();

    assert_eq!(output.events.len(), 1);
    assert_eq!(output.events[0].start, utc(2024, 1, 11, 9, 0));
    assert_eq!(output.warnings.len(), 3);
    assert!(matches!(output.warnings[0], Warning::PerEventParse { .. }));
    assert!(output
        .warnings
        .contains(&Warning::TimeZoneFallback { zone: "Atlantis/Central".to_string() }));
    assert!(output
        .warnings
        .contains(&Warning::InvalidRange { event_id: "backwards@20240111T100000Z".to_string() }));
}

#[test]
fn floating_times_use_configured_zone() {
    let feed = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nUID:f\nDTSTART:20240111T090000\nDURATION:PT30M\nEND:VEVENT\nEND:VCALENDAR\n";
    let config = EngineConfig {
        default_timezone: "Europe/Berlin".to_string(),
        ..EngineConfig::default()
    };
    let output = Pipeline::new(config)
        .run(&[feed], &HiddenSet::new(), utc(2024, 1, 10, 0, 0))
        .unwrap();
    assert_eq!(output.events[0].start, utc(2024, 1, 11, 8, 0));
}

#[test]
fn forward_window_limits_unbounded_series() {
    let feed = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nUID:daily\nDTSTART:20240101T090000Z\nDURATION:PT30M\nRRULE:FREQ=DAILY\nEND:VEVENT\nEND:VCALENDAR\n";
    let config = EngineConfig {
        forward_window_days: 10,
        lookback_days: 0,
        ..EngineConfig::default()
    };
    let output = Pipeline::new(config)
        .run(&[feed], &HiddenSet::new(), utc(2024, 3, 1, 0, 0))
        .unwrap();
    assert_eq!(output.events.len(), 10);
    assert_eq!(output.events[0].start, utc(2024, 3, 1, 9, 0));
}
