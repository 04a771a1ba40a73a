//! Recurrence expansion -- turns one record and its overrides into concrete occurrences.
//!
//! Wraps the `rrule` crate (v0.13) for rule iteration. Rules are iterated in the
//! wall-clock frame of the series' DTSTART (handed to `rrule` as if it were UTC),
//! and each candidate is converted to a real instant by the
//! [`TimeZoneResolver`], so the DST policy is applied in exactly one place.
//!
//! Expansion always terminates: it stops at the rule's own COUNT/UNTIL, the
//! window end, or `max_occurrences` occurrences inside the window, whichever
//! comes first. Unbounded rules are iterated from a point just before the
//! window, so an old DTSTART costs nothing.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::diagnostics::{Diagnostics, Warning};
use crate::model::{DateValue, EventEnd, Occurrence, RawEventRecord, RecordKind, RecurrenceSet};
use crate::timezone::{resolve_in, TimeZoneResolver};
use crate::value::parse_date_value;

/// Bounds of one expansion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub max_occurrences: usize,
}

impl ExpansionWindow {
    /// An occurrence is inside when it starts before the window end and has
    /// not finished before the window start.
    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && start.max(end) >= self.start
    }
}

/// Occurrence length, measured the way RFC 5545 measures it.
#[derive(Debug, Clone, Copy)]
enum Span {
    /// Elapsed time, for timed events.
    Exact(Duration),
    /// Wall-clock time, for all-day events ("P1D" is one calendar day).
    Nominal(Duration),
}

impl Span {
    fn length(self) -> Duration {
        match self {
            Span::Exact(d) | Span::Nominal(d) => d,
        }
    }

    fn end(self, tz: Tz, local_start: NaiveDateTime, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Span::Exact(d) => start.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC),
            Span::Nominal(d) => local_start
                .checked_add_signed(d)
                .map_or(DateTime::<Utc>::MAX_UTC, |local_end| resolve_in(tz, local_end)),
        }
    }
}

/// The wall-clock frame a series is iterated in.
#[derive(Debug, Clone, Copy)]
struct SeriesFrame {
    tz: Tz,
    local_start: NaiveDateTime,
    span: Span,
}

/// Upper bound from a rule's UNTIL part.
#[derive(Debug, Clone, Copy)]
enum Until {
    Instant(DateTime<Utc>),
    Local(NaiveDateTime),
}

impl Until {
    fn allows(self, tz: Tz, local: NaiveDateTime) -> bool {
        match self {
            Until::Instant(limit) => resolve_in(tz, local) <= limit,
            Until::Local(limit) => local <= limit,
        }
    }
}

/// Exception set of a series, normalized for comparison.
#[derive(Debug, Default)]
struct Exceptions {
    instants: HashSet<DateTime<Utc>>,
    /// DATE-valued exceptions drop every candidate on that local date.
    dates: HashSet<NaiveDate>,
}

impl Exceptions {
    fn excludes(&self, start: DateTime<Utc>, local: NaiveDateTime) -> bool {
        self.instants.contains(&start) || self.dates.contains(&local.date())
    }
}

/// Expands records into occurrences.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecurrenceExpander {
    resolver: TimeZoneResolver,
}

impl RecurrenceExpander {
    pub fn new(resolver: TimeZoneResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TimeZoneResolver {
        &self.resolver
    }

    /// Expand `record` into the occurrences that fall inside `window`.
    ///
    /// `overrides` are the records of the same series carrying a
    /// RECURRENCE-ID. Each replaces the generated occurrence at its slot; a
    /// cancelled override removes it. Records without a rule (and orphan
    /// overrides passed as `record`) yield at most one occurrence.
    ///
    /// A rule that cannot be iterated degrades to a single occurrence at
    /// DTSTART and records a [`Warning::RecurrencePattern`].
    pub fn expand<'a>(
        &self,
        record: &'a RawEventRecord,
        overrides: &[&'a RawEventRecord],
        window: &ExpansionWindow,
        diag: &mut Diagnostics,
    ) -> Vec<Occurrence<'a>> {
        if window.max_occurrences == 0 || window.start >= window.end {
            return Vec::new();
        }

        let set = match &record.kind {
            RecordKind::Recurring(set) => set,
            RecordKind::Single | RecordKind::Override { .. } => {
                return self.single(record, window, diag).into_iter().collect();
            }
        };

        let (tz, local_start) = self.resolver.frame(&record.dtstart, diag);
        let frame = SeriesFrame {
            tz,
            local_start,
            span: self.span(record, tz, local_start, diag),
        };

        let (lower, upper) = frame.search_range(window);
        let rule = match set.rule.as_deref().map(|text| SeriesRule::parse(text, &frame, lower)) {
            Some(Ok(rule)) => Some(rule),
            None => None,
            Some(Err(reason)) => {
                diag.record(Warning::RecurrencePattern {
                    series_id: record.series_id.clone(),
                    reason,
                });
                return self.single(record, window, diag).into_iter().collect();
            }
        };

        let exceptions = self.exceptions(set, diag);
        let by_slot = self.index_overrides(overrides, diag);
        let extra = self.extra_instants(set, rule.is_none(), &frame, diag);

        let mut occurrences = Vec::new();
        let mut generated = HashSet::new();
        let admit = |local: NaiveDateTime| {
            let start = resolve_in(tz, local);
            if exceptions.excludes(start, local) || by_slot.contains_key(&start) {
                return false;
            }
            // Two wall-clock candidates can meet at one instant across a DST gap.
            if !generated.insert(start) {
                return false;
            }
            let end = frame.span.end(tz, local, start);
            if !window.contains(start, end) {
                return false;
            }
            occurrences.push(Occurrence {
                series_id: &record.series_id,
                start,
                end,
                recurrence_id: start,
                source: record,
            });
            true
        };

        let walk = walk_candidates(rule.as_ref(), tz, extra, upper, window.max_occurrences, admit);
        if walk == Walk::GaveUp {
            diag.record(Warning::RecurrencePattern {
                series_id: record.series_id.clone(),
                reason: "rule iteration gave up before reaching the window end".to_string(),
            });
        }

        for (slot, replacement) in by_slot {
            if replacement.is_cancelled() {
                continue;
            }
            let (start, end) = self.bounds(replacement, diag);
            if window.contains(start, end) {
                occurrences.push(Occurrence {
                    series_id: &record.series_id,
                    start,
                    end,
                    recurrence_id: slot,
                    source: replacement,
                });
            }
        }

        occurrences.sort_by_key(|o| (o.start, o.recurrence_id));
        occurrences.truncate(window.max_occurrences);
        tracing::debug!(
            series_id = %record.series_id,
            count = occurrences.len(),
            "expanded recurring series"
        );
        occurrences
    }

    /// The one occurrence of a non-recurring record, if it is in the window.
    fn single<'a>(
        &self,
        record: &'a RawEventRecord,
        window: &ExpansionWindow,
        diag: &mut Diagnostics,
    ) -> Option<Occurrence<'a>> {
        let (start, end) = self.bounds(record, diag);
        let recurrence_id = match &record.kind {
            RecordKind::Override { recurrence_id } => {
                self.resolver.resolve_value(recurrence_id, diag)
            }
            _ => start,
        };
        window.contains(start, end).then_some(Occurrence {
            series_id: &record.series_id,
            start,
            end,
            recurrence_id,
            source: record,
        })
    }

    /// Start and end of a record taken on its own.
    fn bounds(
        &self,
        record: &RawEventRecord,
        diag: &mut Diagnostics,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let (tz, local) = self.resolver.frame(&record.dtstart, diag);
        let start = resolve_in(tz, local);
        let end = self.span(record, tz, local, diag).end(tz, local, start);
        (start, end)
    }

    fn span(
        &self,
        record: &RawEventRecord,
        tz: Tz,
        local_start: NaiveDateTime,
        diag: &mut Diagnostics,
    ) -> Span {
        match &record.end {
            EventEnd::Duration(d) if record.all_day => Span::Nominal(*d),
            EventEnd::Duration(d) => Span::Exact(*d),
            EventEnd::At(end) if record.all_day => {
                let (_, local_end) = self.resolver.frame(end, diag);
                Span::Nominal(local_end - local_start)
            }
            EventEnd::At(end) => {
                Span::Exact(self.resolver.resolve_value(end, diag) - resolve_in(tz, local_start))
            }
        }
    }

    /// RDATE instants in the series frame, ascending. A record without a rule
    /// also contributes its DTSTART.
    fn extra_instants(
        &self,
        set: &RecurrenceSet,
        include_start: bool,
        frame: &SeriesFrame,
        diag: &mut Diagnostics,
    ) -> Vec<NaiveDateTime> {
        let mut instants: Vec<NaiveDateTime> = set
            .rdates
            .iter()
            .map(|rdate| {
                self.resolver
                    .resolve_value(rdate, diag)
                    .with_timezone(&frame.tz)
                    .naive_local()
            })
            .collect();
        if include_start {
            instants.push(frame.local_start);
        }
        instants.sort();
        instants.dedup();
        instants
    }

    fn exceptions(&self, set: &RecurrenceSet, diag: &mut Diagnostics) -> Exceptions {
        let mut exceptions = Exceptions::default();
        for exdate in &set.exdates {
            match exdate {
                DateValue::Date(date) => {
                    exceptions.dates.insert(*date);
                }
                other => {
                    exceptions
                        .instants
                        .insert(self.resolver.resolve_value(other, diag));
                }
            }
        }
        exceptions
    }

    /// Overrides keyed by the slot they replace. The highest SEQUENCE wins;
    /// on a tie the one appearing later in the feed does.
    fn index_overrides<'a>(
        &self,
        overrides: &[&'a RawEventRecord],
        diag: &mut Diagnostics,
    ) -> BTreeMap<DateTime<Utc>, &'a RawEventRecord> {
        let mut by_slot: BTreeMap<DateTime<Utc>, &'a RawEventRecord> = BTreeMap::new();
        for &replacement in overrides {
            let RecordKind::Override { recurrence_id } = &replacement.kind else {
                continue;
            };
            let slot = self.resolver.resolve_value(recurrence_id, diag);
            let keep_existing = by_slot
                .get(&slot)
                .is_some_and(|existing| existing.sequence > replacement.sequence);
            if !keep_existing {
                by_slot.insert(slot, replacement);
            }
        }
        by_slot
    }
}

const RRULE_DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

impl SeriesFrame {
    /// Wall-clock bounds that cover `window` in any zone. The frame is a wall
    /// clock, so the window is widened by the largest UTC offset; exact
    /// filtering happens after resolution.
    fn search_range(&self, window: &ExpansionWindow) -> (NaiveDateTime, NaiveDateTime) {
        let slack = Duration::days(1);
        let lower = window
            .start
            .naive_utc()
            .checked_sub_signed(self.span.length().max(Duration::zero()) + slack)
            .unwrap_or(NaiveDateTime::MIN);
        let upper = window
            .end
            .naive_utc()
            .checked_add_signed(slack)
            .unwrap_or(NaiveDateTime::MAX);
        (lower, upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn parse(value: &str) -> Option<Self> {
        Some(match value.to_ascii_uppercase().as_str() {
            "SECONDLY" => Frequency::Secondly,
            "MINUTELY" => Frequency::Minutely,
            "HOURLY" => Frequency::Hourly,
            "DAILY" => Frequency::Daily,
            "WEEKLY" => Frequency::Weekly,
            "MONTHLY" => Frequency::Monthly,
            "YEARLY" => Frequency::Yearly,
            _ => return None,
        })
    }
}

/// The parts of a rule the expander applies itself.
#[derive(Debug)]
struct RuleParts {
    /// Rule text without UNTIL, handed to `rrule`.
    text: String,
    until: Option<Until>,
    freq: Option<Frequency>,
    interval: u32,
    count: Option<u32>,
}

impl RuleParts {
    fn split(rule: &str) -> Result<Self, String> {
        let rule = rule.trim();
        let rule = rule.strip_prefix("RRULE:").unwrap_or(rule);

        let mut parts = Vec::new();
        let mut until = None;
        let mut freq = None;
        let mut has_freq = false;
        let mut interval = 1;
        let mut count = None;
        for part in rule.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("malformed rule part {part:?}"))?;
            let key = key.to_ascii_uppercase();
            match key.as_str() {
                // UNTIL is applied here rather than by `rrule`, which requires
                // it to share DTSTART's zone; the feed's UNTIL is usually UTC
                // while DTSTART is local.
                "UNTIL" => {
                    let bound = parse_date_value(value, None, false)
                        .map_err(|e| format!("UNTIL: {e}"))?;
                    until = Some(match bound {
                        DateValue::Utc(instant) => Until::Instant(instant),
                        DateValue::Floating(local) | DateValue::Zoned { local, .. } => {
                            Until::Local(local)
                        }
                        DateValue::Date(date) => Until::Local(
                            date.and_hms_opt(23, 59, 59).unwrap_or(NaiveDateTime::MAX),
                        ),
                    });
                    continue;
                }
                "FREQ" => {
                    has_freq = true;
                    freq = Frequency::parse(value);
                }
                "INTERVAL" => interval = value.parse().unwrap_or(1),
                "COUNT" => count = value.parse().ok(),
                _ => {}
            }
            parts.push(part);
        }

        if !has_freq {
            return Err("rule has no FREQ".to_string());
        }
        Ok(Self {
            text: parts.join(";"),
            until,
            freq,
            interval: interval.max(1),
            count,
        })
    }

    /// A start for iteration that lies on the rule's interval lattice and
    /// before `target`, so iteration does not replay the series' whole past.
    /// Rules with COUNT are numbered from DTSTART and always start there.
    fn fast_forward(&self, start: NaiveDateTime, target: NaiveDateTime) -> NaiveDateTime {
        if self.count.is_some() || target <= start {
            return start;
        }
        let interval = i64::from(self.interval);
        match self.freq {
            Some(Frequency::Secondly) => skip_steps(start, target, Duration::seconds(interval)),
            Some(Frequency::Minutely) => skip_steps(start, target, Duration::minutes(interval)),
            Some(Frequency::Hourly) => skip_steps(start, target, Duration::hours(interval)),
            Some(Frequency::Daily) => skip_steps(start, target, Duration::days(interval)),
            Some(Frequency::Weekly) => skip_steps(start, target, Duration::weeks(interval)),
            Some(Frequency::Monthly) => skip_months(start, target, self.interval),
            Some(Frequency::Yearly) => skip_months(start, target, self.interval.saturating_mul(12)),
            None => start,
        }
    }
}

/// Advance `start` by whole steps, stopping at least one step before `target`.
fn skip_steps(start: NaiveDateTime, target: NaiveDateTime, step: Duration) -> NaiveDateTime {
    let step_secs = step.num_seconds();
    if step_secs <= 0 {
        return start;
    }
    let steps = (target - start).num_seconds() / step_secs - 1;
    if steps <= 0 {
        return start;
    }
    start
        .checked_add_signed(Duration::seconds(steps * step_secs))
        .unwrap_or(start)
}

/// Month-based variant of [`skip_steps`]. Starts past the 28th are left alone:
/// shifting them could clamp the day and change the rule's default BYMONTHDAY.
fn skip_months(start: NaiveDateTime, target: NaiveDateTime, months_per_step: u32) -> NaiveDateTime {
    if start.day() > 28 || months_per_step == 0 {
        return start;
    }
    let elapsed = (target.year() - start.year()) * 12 + target.month() as i32 - start.month() as i32;
    let steps = elapsed / months_per_step as i32 - 1;
    if steps <= 0 {
        return start;
    }
    start
        .checked_add_months(Months::new(steps as u32 * months_per_step))
        .unwrap_or(start)
}

/// A parsed rule, ready to iterate in a series frame.
struct SeriesRule {
    set: RRuleSet,
    until: Option<Until>,
    count: Option<u32>,
}

impl SeriesRule {
    /// Parse `rule` for iteration from the frame's start. Iteration may begin
    /// at a later lattice point when everything before `from` is irrelevant.
    fn parse(rule: &str, frame: &SeriesFrame, from: NaiveDateTime) -> Result<Self, String> {
        let parts = RuleParts::split(rule)?;
        let dtstart = parts.fast_forward(frame.local_start, from);
        let rrule_text = format!(
            "DTSTART:{}Z\nRRULE:{}",
            dtstart.format(RRULE_DATE_TIME_FORMAT),
            parts.text
        );
        let set: RRuleSet = rrule_text.parse().map_err(|e| format!("{e}"))?;
        Ok(Self {
            // Bounds `rrule`'s search for a next instance; an exhausted search
            // ends the iterator.
            set: set.limit(),
            until: parts.until,
            count: parts.count,
        })
    }
}

/// How candidate iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// The rule ended, the search range was passed, or the cap was reached.
    Complete,
    /// `rrule` stopped searching while the rule still had instances left.
    GaveUp,
}

/// Offer wall-clock candidates to `admit` in ascending order: the rule's
/// instants merged with `extra`. Stops once `limit` candidates were admitted
/// or the candidates pass `upper`, so the cost follows the window and the cap
/// rather than the age of the series.
fn walk_candidates(
    rule: Option<&SeriesRule>,
    tz: Tz,
    extra: Vec<NaiveDateTime>,
    upper: NaiveDateTime,
    limit: usize,
    mut admit: impl FnMut(NaiveDateTime) -> bool,
) -> Walk {
    let mut extra = extra.into_iter().peekable();
    let mut admitted = 0;
    let mut offer = |local: NaiveDateTime| {
        if admit(local) {
            admitted += 1;
        }
        admitted >= limit
    };

    let mut outcome = Walk::Complete;
    if let Some(rule) = rule {
        let mut instants = (&rule.set).into_iter().map(|dt| dt.naive_utc());
        let mut yielded: u32 = 0;
        loop {
            let Some(local) = instants.next() else {
                if rule.count.is_none_or(|count| yielded < count) {
                    outcome = Walk::GaveUp;
                }
                break;
            };
            yielded = yielded.saturating_add(1);
            if local > upper || !rule.until.is_none_or(|u| u.allows(tz, local)) {
                break;
            }
            while let Some(rdate) = extra.next_if(|rdate| *rdate <= local) {
                if offer(rdate) {
                    return outcome;
                }
            }
            if offer(local) {
                return outcome;
            }
        }
    }

    for rdate in extra {
        if rdate > upper || offer(rdate) {
            break;
        }
    }
    outcome
}
