//! Local wall-clock → UTC conversion with a fixed DST policy.
//!
//! - Ambiguous wall-clock times (fall back) resolve to the earlier instant.
//! - Nonexistent wall-clock times (spring forward) shift forward by the size
//!   of the gap: 02:30 on a night that skips 02:00–03:00 becomes 03:30.
//! - Unknown zone names resolve in UTC and record a
//!   [`Warning::TimeZoneFallback`]. Resolution never fails.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::diagnostics::{Diagnostics, Warning};
use crate::model::DateValue;

/// Windows zone names commonly emitted by Exchange/Outlook feeds.
const WINDOWS_ZONES: &[(&str, &str)] = &[
    ("UTC", "UTC"),
    ("GMT Standard Time", "Europe/London"),
    ("Greenwich Standard Time", "Atlantic/Reykjavik"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Romance Standard Time", "Europe/Paris"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("Central European Standard Time", "Europe/Warsaw"),
    ("E. Europe Standard Time", "Europe/Chisinau"),
    ("FLE Standard Time", "Europe/Kiev"),
    ("Russian Standard Time", "Europe/Moscow"),
    ("India Standard Time", "Asia/Kolkata"),
    ("China Standard Time", "Asia/Shanghai"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("Eastern Standard Time", "America/New_York"),
    ("Central Standard Time", "America/Chicago"),
    ("Mountain Standard Time", "America/Denver"),
    ("US Mountain Standard Time", "America/Phoenix"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("Alaskan Standard Time", "America/Anchorage"),
    ("Hawaiian Standard Time", "Pacific/Honolulu"),
];

/// Look up a zone by the name a feed uses for it.
///
/// Accepts IANA names, quoted names, vendor-prefixed names such as
/// `/mozilla.org/20050126_1/America/New_York` and common Windows names.
pub fn lookup_zone(name: &str) -> Option<Tz> {
    let name = name.trim().trim_matches('"');
    if let Ok(tz) = name.parse::<Tz>() {
        return Some(tz);
    }
    if let Some((_, iana)) = WINDOWS_ZONES.iter().find(|(win, _)| *win == name) {
        return iana.parse().ok();
    }
    let parts: Vec<&str> = name.split('/').filter(|p| !p.is_empty()).collect();
    (1..parts.len()).find_map(|i| parts[i..].join("/").parse::<Tz>().ok())
}

/// Convert a wall-clock time in `tz` to UTC using the fixed DST policy.
pub fn resolve_in(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, latest) => earliest.min(latest).with_timezone(&Utc),
        LocalResult::None => {
            // Reading the wall clock with the pre-transition offset lands
            // exactly one gap-width later on the post-transition clock.
            let before = tz
                .offset_from_utc_datetime(&(local - Duration::days(1)))
                .fix();
            (local - Duration::seconds(i64::from(before.local_minus_utc()))).and_utc()
        }
    }
}

/// Resolves feed date values to UTC instants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeZoneResolver {
    default_zone: Tz,
}

impl Default for TimeZoneResolver {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl TimeZoneResolver {
    /// `default_zone` is used for floating values and DATE values.
    pub fn new(default_zone: Tz) -> Self {
        Self { default_zone }
    }

    /// Build a resolver from a configured zone name, falling back to UTC.
    pub fn with_default_name(name: &str, diag: &mut Diagnostics) -> Self {
        Self::new(zone_or_utc(name, diag))
    }

    pub fn default_zone(&self) -> Tz {
        self.default_zone
    }

    /// The zone called `name`, or UTC with a recorded warning.
    pub fn zone(&self, name: &str, diag: &mut Diagnostics) -> Tz {
        zone_or_utc(name, diag)
    }

    pub fn resolve(
        &self,
        zone_name: &str,
        local: NaiveDateTime,
        diag: &mut Diagnostics,
    ) -> DateTime<Utc> {
        resolve_in(self.zone(zone_name, diag), local)
    }

    pub fn resolve_floating(&self, local: NaiveDateTime) -> DateTime<Utc> {
        resolve_in(self.default_zone, local)
    }

    /// The zone and wall-clock time a value is anchored to.
    ///
    /// Recurrence rules iterate in this frame so that "every day at 09:00"
    /// stays at 09:00 local across DST changes.
    pub fn frame(&self, value: &DateValue, diag: &mut Diagnostics) -> (Tz, NaiveDateTime) {
        match value {
            DateValue::Utc(dt) => (Tz::UTC, dt.naive_utc()),
            DateValue::Zoned { tzid, local } => (self.zone(tzid, diag), *local),
            DateValue::Floating(local) => (self.default_zone, *local),
            DateValue::Date(date) => (self.default_zone, date.and_time(NaiveTime::MIN)),
        }
    }

    pub fn resolve_value(&self, value: &DateValue, diag: &mut Diagnostics) -> DateTime<Utc> {
        match value {
            DateValue::Utc(dt) => *dt,
            other => {
                let (tz, local) = self.frame(other, diag);
                resolve_in(tz, local)
            }
        }
    }
}

fn zone_or_utc(name: &str, diag: &mut Diagnostics) -> Tz {
    lookup_zone(name).unwrap_or_else(|| {
        diag.record(Warning::TimeZoneFallback {
            zone: name.to_string(),
        });
        Tz::UTC
    })
}
