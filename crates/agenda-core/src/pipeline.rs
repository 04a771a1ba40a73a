//! Parser → Expander → Normalizer over one or more documents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::Result;
use crate::expander::{ExpansionWindow, RecurrenceExpander};
use crate::model::{NormalizedEvent, Occurrence, RawEventRecord, RecordKind};
use crate::normalizer::{normalize, HiddenSet};
use crate::parser::FeedParser;

/// Events and warnings produced by one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub events: Vec<NormalizedEvent>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: EngineConfig,
}

impl Pipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build the event set for `now` from the given documents, concatenated
    /// in order.
    ///
    /// # Errors
    /// Fails as a whole if any document is oversized or not an iCalendar
    /// object; nothing is returned for the documents that did parse.
    pub fn run<S: AsRef<str>>(
        &self,
        documents: &[S],
        hidden: &HiddenSet,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutput> {
        let mut diag = Diagnostics::new();
        let parser = FeedParser::from_config(&self.config);

        let mut records = Vec::new();
        for document in documents {
            let mut parsed = parser.parse(document.as_ref())?;
            records.extend(parsed.by_ref());
            diag.extend(parsed.into_warnings());
        }
        tracing::debug!(records = records.len(), "parsed feed documents");

        let expander = RecurrenceExpander::new(self.config.resolver(&mut diag));
        let window = self.config.window_at(now);
        let occurrences = expand_all(&expander, &records, &window, &mut diag);
        tracing::debug!(occurrences = occurrences.len(), "expanded records");

        let events = normalize(occurrences, hidden, &mut diag);
        Ok(PipelineOutput {
            events,
            warnings: diag.into_warnings(),
        })
    }
}

#[derive(Default)]
struct Series<'a> {
    masters: Vec<&'a RawEventRecord>,
    overrides: Vec<&'a RawEventRecord>,
}

/// Expand every record, pairing overrides with the recurring masters of
/// their series. Overrides without a recurring master stand alone.
pub fn expand_all<'a>(
    expander: &RecurrenceExpander,
    records: &'a [RawEventRecord],
    window: &ExpansionWindow,
    diag: &mut Diagnostics,
) -> Vec<Occurrence<'a>> {
    let mut series: BTreeMap<&str, Series<'a>> = BTreeMap::new();
    for record in records {
        let entry = series.entry(record.series_id.as_str()).or_default();
        if record.is_override() {
            entry.overrides.push(record);
        } else {
            entry.masters.push(record);
        }
    }

    let mut occurrences = Vec::new();
    for group in series.values() {
        let has_recurring_master = group
            .masters
            .iter()
            .any(|m| matches!(m.kind, RecordKind::Recurring(_)));
        for &master in &group.masters {
            occurrences.extend(expander.expand(master, &group.overrides, window, diag));
        }
        if !has_recurring_master {
            for &orphan in &group.overrides {
                occurrences.extend(expander.expand(orphan, &[], window, diag));
            }
        }
    }
    occurrences
}
