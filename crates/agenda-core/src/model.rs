//! Data model shared by the parser, expander, normalizer and selector.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A DATE or DATE-TIME value as written in the feed, before zone resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateValue {
    /// `19980119T070000Z`
    Utc(DateTime<Utc>),
    /// `TZID=America/New_York:19980119T020000`
    Zoned { tzid: String, local: NaiveDateTime },
    /// `19980118T230000`, interpreted in the configured default zone.
    Floating(NaiveDateTime),
    /// `VALUE=DATE:19970714`
    Date(NaiveDate),
}

impl DateValue {
    pub fn is_date(&self) -> bool {
        matches!(self, DateValue::Date(_))
    }
}

/// How the end of an event is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEnd {
    At(DateValue),
    Duration(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

/// Recurrence data of a series master.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecurrenceSet {
    /// The `RRULE` value, kept as text and handed to the rule iterator.
    pub rule: Option<String>,
    pub rdates: Vec<DateValue>,
    pub exdates: Vec<DateValue>,
}

/// What role a record plays in its series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Single,
    Recurring(RecurrenceSet),
    /// Replaces the occurrence of the series that was generated at `recurrence_id`.
    Override { recurrence_id: DateValue },
}

/// One `VEVENT` block, validated at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEventRecord {
    pub series_id: String,
    pub summary: String,
    pub dtstart: DateValue,
    pub end: EventEnd,
    pub kind: RecordKind,
    pub location: Option<String>,
    pub description: Option<String>,
    pub status: EventStatus,
    pub sequence: u32,
    pub all_day: bool,
}

impl RawEventRecord {
    pub fn is_override(&self) -> bool {
        matches!(self.kind, RecordKind::Override { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == EventStatus::Cancelled
    }
}

/// One concrete instance of a record inside the expansion window.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence<'a> {
    pub series_id: &'a str,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// The generated start this occurrence stands for. Differs from `start`
    /// only when an override moved the occurrence.
    pub recurrence_id: DateTime<Utc>,
    pub source: &'a RawEventRecord,
}

impl Occurrence<'_> {
    pub fn id(&self) -> EventId {
        EventId::new(self.series_id, self.recurrence_id)
    }
}

const ID_INSTANT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// The externally visible handle of an occurrence: series UID plus its slot.
///
/// Rendered as `<uid>@<YYYYMMDDTHHMMSSZ>`. UIDs frequently contain `@`
/// themselves, so parsing splits on the last one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId {
    series_id: String,
    start: DateTime<Utc>,
}

impl EventId {
    pub fn new(series_id: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            series_id: series_id.into(),
            start,
        }
    }

    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.series_id, self.start.format(ID_INSTANT_FORMAT))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid event id {0:?}: expected <uid>@<YYYYMMDDTHHMMSSZ>")]
pub struct InvalidEventId(String);

impl FromStr for EventId {
    type Err = InvalidEventId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (series_id, instant) = s
            .rsplit_once('@')
            .ok_or_else(|| InvalidEventId(s.to_string()))?;
        if series_id.is_empty() {
            return Err(InvalidEventId(s.to_string()));
        }
        let start = NaiveDateTime::parse_from_str(instant, ID_INSTANT_FORMAT)
            .map_err(|_| InvalidEventId(s.to_string()))?
            .and_utc();
        Ok(Self::new(series_id, start))
    }
}

impl TryFrom<String> for EventId {
    type Error = InvalidEventId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> Self {
        id.to_string()
    }
}

/// A concrete, identity-stable event as published in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub id: EventId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub is_all_day: bool,
    pub is_hidden: bool,
}

impl NormalizedEvent {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// The prioritized view computed by the selector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectionResult {
    pub primary: Option<NormalizedEvent>,
    pub upcoming: Vec<NormalizedEvent>,
    pub later: Vec<NormalizedEvent>,
}

impl SelectionResult {
    /// Every selected event in display order.
    pub fn iter(&self) -> impl Iterator<Item = &NormalizedEvent> {
        self.primary
            .iter()
            .chain(self.upcoming.iter())
            .chain(self.later.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none()
    }
}
