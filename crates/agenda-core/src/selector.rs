//! Next-or-current meeting selection.
//!
//! [`select`] is a pure function of the event set and "now". The display and
//! the voice interface both call it, so identical inputs must give identical
//! output; there is no state kept between calls.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::model::{NormalizedEvent, SelectionResult};

/// Events listed after the primary.
pub const UPCOMING_LIMIT: usize = 3;
/// Events listed after the upcoming ones (ranks 4 to 8).
pub const LATER_LIMIT: usize = 5;

/// Pick the primary meeting and the upcoming/later lists at `now`.
///
/// Hidden events and events that ended before `now` are ignored. An event
/// that has not started yet always outranks one that is running; a running
/// event is only chosen when nothing is upcoming, and then appears nowhere
/// else. A zero-duration event is running only at its exact instant.
pub fn select(events: &[NormalizedEvent], now: DateTime<Utc>) -> SelectionResult {
    let visible = events.iter().filter(|e| !e.is_hidden);

    let (mut upcoming, mut current): (Vec<&NormalizedEvent>, Vec<&NormalizedEvent>) = visible
        .filter(|e| e.start > now || e.end >= now)
        .partition(|e| e.start > now);
    upcoming.sort_by(|a, b| display_order(a, b));
    current.sort_by(|a, b| display_order(a, b));

    let mut remaining = upcoming.into_iter();
    let primary = match remaining.next() {
        Some(next) => Some(next),
        None => current.first().copied(),
    };

    SelectionResult {
        primary: primary.cloned(),
        upcoming: remaining.by_ref().take(UPCOMING_LIMIT).cloned().collect(),
        later: remaining.take(LATER_LIMIT).cloned().collect(),
    }
}

/// Start, then duration, then title, then identity.
///
/// All-day events sort after every timed event sharing their start.
pub fn display_order(a: &NormalizedEvent, b: &NormalizedEvent) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| tie_break_duration(a).cmp(&tie_break_duration(b)))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.id.cmp(&b.id))
}

fn tie_break_duration(event: &NormalizedEvent) -> i64 {
    if event.is_all_day {
        i64::MAX
    } else {
        event.duration().num_milliseconds()
    }
}
