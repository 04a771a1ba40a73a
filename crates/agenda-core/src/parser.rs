//! iCalendar document → lazy sequence of [`RawEventRecord`]s.
//!
//! The parser works line by line over the borrowed input and only materializes
//! one `VEVENT` block at a time. A malformed block is skipped and recorded as a
//! [`Warning::PerEventParse`]; a document that is not an iCalendar object at all
//! fails wholesale with [`EngineError::Format`].
//!
//! # Key design decisions
//!
//! - **Size ceiling first**: the byte length is checked before any line is
//!   touched, so oversized input costs nothing on constrained hardware.
//! - **Block isolation**: every failure inside a `VEVENT` is captured as the
//!   block's error and the parser keeps consuming until `END:VEVENT`, so the
//!   next block starts from a clean state.
//! - **Concatenated calendars**: several `VCALENDAR` objects in one document
//!   are read back to back.

use std::borrow::Cow;
use std::iter::{Enumerate, Peekable};
use std::str::Lines;

use chrono::Duration;

use crate::config::EngineConfig;
use crate::diagnostics::Warning;
use crate::error::{EngineError, Result};
use crate::model::{DateValue, EventEnd, EventStatus, RawEventRecord, RecordKind, RecurrenceSet};
use crate::value::{parse_date_list, parse_date_value, parse_duration, unescape_text};

/// Entry point for turning raw feed text into records.
#[derive(Debug, Clone, Copy)]
pub struct FeedParser {
    max_bytes: usize,
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl FeedParser {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_feed_bytes)
    }

    /// Start parsing `raw`.
    ///
    /// # Errors
    /// Returns [`EngineError::FeedTooLarge`] if `raw` exceeds the size ceiling
    /// and [`EngineError::Format`] if it does not open with `BEGIN:VCALENDAR`.
    pub fn parse<'a>(&self, raw: &'a str) -> Result<FeedRecords<'a>> {
        if raw.len() > self.max_bytes {
            return Err(EngineError::FeedTooLarge {
                size: raw.len(),
                limit: self.max_bytes,
            });
        }

        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        let mut lines = ContentLines::new(raw);
        let (_, first) = lines
            .next()
            .ok_or_else(|| EngineError::Format("empty document".to_string()))?;
        let opens_calendar = parse_content_line(&first)
            .is_some_and(|line| line.name == "BEGIN" && line.value_is("VCALENDAR"));
        if !opens_calendar {
            return Err(EngineError::Format(format!(
                "expected BEGIN:VCALENDAR, found {:?}",
                truncate(&first, 40)
            )));
        }

        Ok(FeedRecords {
            lines,
            pending_event: None,
            warnings: Vec::new(),
        })
    }
}

/// The records of one document, produced on demand.
///
/// Finite and not restartable: parse the text again for a second pass.
pub struct FeedRecords<'a> {
    lines: ContentLines<'a>,
    /// Line of a `BEGIN:VEVENT` that cut the previous block short.
    pending_event: Option<usize>,
    warnings: Vec<Warning>,
}

impl FeedRecords<'_> {
    /// Warnings for the blocks skipped so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    fn skip(&mut self, line: usize, reason: String) {
        tracing::debug!(line, %reason, "skipping malformed VEVENT");
        self.warnings.push(Warning::PerEventParse { line, reason });
    }

    /// Consume lines up to the `END` matching an already-read `BEGIN:<name>`.
    ///
    /// Event and calendar boundaries end the skip even when `name` was never
    /// closed, so one unbalanced component cannot hide the blocks after it.
    fn skip_component(&mut self, name: &str) -> Skipped {
        let mut depth = 0usize;
        for (line_no, text) in self.lines.by_ref() {
            let Some(line) = parse_content_line(&text) else {
                continue;
            };
            match line.name.as_str() {
                "BEGIN" if line.value_is("VEVENT") => return Skipped::NewEvent(line_no),
                "BEGIN" if line.value_is("VCALENDAR") => return Skipped::CalendarEnd,
                "END" if line.value_is("VEVENT") => return Skipped::EventEnd,
                "END" if line.value_is("VCALENDAR") => return Skipped::CalendarEnd,
                "BEGIN" => depth += 1,
                "END" if depth == 0 && line.value_is(name) => return Skipped::Closed,
                "END" => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        Skipped::CalendarEnd
    }

    /// Read the rest of a block through its `END:VEVENT`.
    fn read_event(&mut self) -> std::result::Result<RawEventRecord, String> {
        let mut props = Vec::new();
        let mut error: Option<String> = None;

        loop {
            let Some((line_no, text)) = self.lines.next() else {
                return Err("VEVENT not terminated before end of input".to_string());
            };
            let Some(line) = parse_content_line(&text) else {
                error.get_or_insert_with(|| format!("unparseable content line {line_no}"));
                continue;
            };
            match line.name.as_str() {
                "END" if line.value_is("VEVENT") => break,
                "BEGIN" if line.value_is("VEVENT") => {
                    self.pending_event = Some(line_no);
                    return Err(format!("VEVENT not terminated before line {line_no}"));
                }
                "BEGIN" => {
                    let nested = line.value.trim().to_ascii_uppercase();
                    match self.skip_component(&nested) {
                        Skipped::Closed => {}
                        Skipped::NewEvent(next) => {
                            self.pending_event = Some(next);
                            return Err(format!("{nested} not terminated before line {next}"));
                        }
                        Skipped::EventEnd => {
                            return Err(format!("{nested} not terminated before END:VEVENT"));
                        }
                        Skipped::CalendarEnd => {
                            return Err(format!("{nested} not terminated before end of calendar"));
                        }
                    }
                }
                "END" if line.value_is("VCALENDAR") => {
                    return Err("VEVENT not terminated before END:VCALENDAR".to_string());
                }
                _ => props.push(line),
            }
        }

        if let Some(reason) = error {
            return Err(reason);
        }
        build_record(&props)
    }
}

impl Iterator for FeedRecords<'_> {
    type Item = RawEventRecord;

    fn next(&mut self) -> Option<RawEventRecord> {
        loop {
            let start_line = match self.pending_event.take() {
                Some(line) => line,
                None => loop {
                    let (line_no, text) = self.lines.next()?;
                    let Some(line) = parse_content_line(&text) else {
                        continue;
                    };
                    if line.name != "BEGIN" || line.value_is("VCALENDAR") {
                        continue;
                    }
                    if line.value_is("VEVENT") {
                        break line_no;
                    }
                    let other = line.value.clone();
                    if let Skipped::NewEvent(next) = self.skip_component(&other) {
                        tracing::debug!(component = %other, line = next, "component cut short by VEVENT");
                        break next;
                    }
                },
            };

            match self.read_event() {
                Ok(record) => return Some(record),
                Err(reason) => self.skip(start_line, reason),
            }
        }
    }
}

/// Where skipping a nested component stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skipped {
    /// Its own `END` was reached.
    Closed,
    /// A `BEGIN:VEVENT` on this line cut it short.
    NewEvent(usize),
    /// The enclosing event ended first.
    EventEnd,
    CalendarEnd,
}

/// Unfolded logical lines with their 1-based physical line number.
struct ContentLines<'a> {
    inner: Peekable<Enumerate<Lines<'a>>>,
}

impl<'a> ContentLines<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            inner: raw.lines().enumerate().peekable(),
        }
    }
}

impl<'a> Iterator for ContentLines<'a> {
    type Item = (usize, Cow<'a, str>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, first) = self.inner.next()?;
            if first.trim().is_empty() {
                continue;
            }
            let mut line = Cow::Borrowed(first);
            while let Some((_, cont)) = self
                .inner
                .next_if(|(_, next)| next.starts_with(' ') || next.starts_with('\t'))
            {
                line.to_mut().push_str(&cont[1..]);
            }
            return Some((index + 1, line));
        }
    }
}

/// `NAME;PARAM=value:VALUE`, with the name and parameter keys upper-cased.
#[derive(Debug, Clone)]
struct ContentLine {
    name: String,
    params: Vec<(String, String)>,
    value: String,
}

impl ContentLine {
    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn value_is(&self, expected: &str) -> bool {
        self.value.trim().eq_ignore_ascii_case(expected)
    }

    fn value_is_date(&self) -> bool {
        self.param("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
    }

    fn date(&self) -> std::result::Result<DateValue, String> {
        parse_date_value(&self.value, self.param("TZID"), self.value_is_date())
            .map_err(|e| format!("{}: {e}", self.name))
    }

    fn dates(&self) -> std::result::Result<Vec<DateValue>, String> {
        parse_date_list(&self.value, self.param("TZID"), self.value_is_date())
            .map_err(|e| format!("{}: {e}", self.name))
    }
}

fn parse_content_line(text: &str) -> Option<ContentLine> {
    let mut in_quotes = false;
    let mut colon = None;
    let mut separators = Vec::new();
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => separators.push(i),
            ':' if !in_quotes => {
                colon = Some(i);
                break;
            }
            _ => {}
        }
    }
    let colon = colon?;
    let head = &text[..colon];

    let name_end = separators.first().copied().unwrap_or(colon);
    let name = head[..name_end].trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }

    let mut params = Vec::new();
    separators.push(colon);
    for pair in separators.windows(2) {
        let (key, value) = text[pair[0] + 1..pair[1]].split_once('=')?;
        params.push((
            key.trim().to_ascii_uppercase(),
            value.trim().trim_matches('"').to_string(),
        ));
    }

    Some(ContentLine {
        name: name.to_ascii_uppercase(),
        params,
        value: text[colon + 1..].to_string(),
    })
}

fn build_record(props: &[ContentLine]) -> std::result::Result<RawEventRecord, String> {
    let first = |name: &str| props.iter().find(|p| p.name == name);
    let text = |name: &str| first(name).map(|p| unescape_text(&p.value));

    let series_id = text("UID")
        .map(|uid| uid.trim().to_string())
        .filter(|uid| !uid.is_empty())
        .ok_or("missing UID")?;
    let dtstart = first("DTSTART").ok_or("missing DTSTART")?.date()?;
    let all_day = dtstart.is_date();

    let end = match (first("DTEND"), first("DURATION")) {
        (Some(_), Some(_)) => return Err("both DTEND and DURATION present".to_string()),
        (Some(dtend), None) => EventEnd::At(dtend.date()?),
        (None, Some(duration)) => {
            EventEnd::Duration(parse_duration(&duration.value).map_err(|e| e.to_string())?)
        }
        (None, None) if all_day => EventEnd::Duration(Duration::days(1)),
        (None, None) => EventEnd::Duration(Duration::zero()),
    };

    let kind = if let Some(recurrence_id) = first("RECURRENCE-ID") {
        RecordKind::Override {
            recurrence_id: recurrence_id.date()?,
        }
    } else {
        let rule = first("RRULE").map(|p| p.value.trim().to_string());
        let mut rdates = Vec::new();
        let mut exdates = Vec::new();
        for prop in props {
            match prop.name.as_str() {
                "RDATE" => rdates.extend(prop.dates()?),
                "EXDATE" => exdates.extend(prop.dates()?),
                _ => {}
            }
        }
        if rule.is_some() || !rdates.is_empty() {
            RecordKind::Recurring(RecurrenceSet {
                rule,
                rdates,
                exdates,
            })
        } else {
            RecordKind::Single
        }
    };

    let status = match first("STATUS").map(|p| p.value.trim().to_ascii_uppercase()) {
        Some(s) if s == "CANCELLED" => EventStatus::Cancelled,
        Some(s) if s == "TENTATIVE" => EventStatus::Tentative,
        _ => EventStatus::Confirmed,
    };

    Ok(RawEventRecord {
        series_id,
        summary: text("SUMMARY").unwrap_or_default(),
        dtstart,
        end,
        kind,
        location: text("LOCATION").filter(|s| !s.is_empty()),
        description: text("DESCRIPTION").filter(|s| !s.is_empty()),
        status,
        sequence: first("SEQUENCE")
            .and_then(|p| p.value.trim().parse().ok())
            .unwrap_or(0),
        all_day,
    })
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
