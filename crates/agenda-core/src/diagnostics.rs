//! Degraded-data warnings recorded while building a snapshot.
//!
//! Every warning is logged through `tracing` at the moment it is recorded and
//! kept in a [`Diagnostics`] sink so the refresh report can expose it.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

/// A problem scoped to one event (or one zone name) that was recovered from.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A malformed `VEVENT` block was skipped.
    #[error("skipped malformed event at line {line}: {reason}")]
    PerEventParse { line: usize, reason: String },

    /// A recurrence rule could not be used; the series degraded to one occurrence.
    #[error("recurrence rule of {series_id} ignored: {reason}")]
    RecurrencePattern { series_id: String, reason: String },

    /// An occurrence ending before it starts was dropped.
    #[error("dropped {event_id}: start is after end")]
    InvalidRange { event_id: String },

    /// A zone name could not be resolved and UTC was used instead.
    #[error("unknown time zone {zone:?}, falling back to UTC")]
    TimeZoneFallback { zone: String },
}

/// Collects warnings for one pipeline run.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
    fallback_zones: BTreeSet<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and log it.
    ///
    /// Time zone fallbacks are reported once per zone name.
    pub fn record(&mut self, warning: Warning) {
        if let Warning::TimeZoneFallback { zone } = &warning {
            if !self.fallback_zones.insert(zone.clone()) {
                return;
            }
        }
        tracing::warn!(%warning, "degraded calendar data");
        self.warnings.push(warning);
    }

    pub fn extend(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        for warning in warnings {
            self.record(warning);
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}
