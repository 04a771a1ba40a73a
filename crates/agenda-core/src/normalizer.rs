//! Occurrences → identity-unique, immutable [`NormalizedEvent`]s.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use crate::diagnostics::{Diagnostics, Warning};
use crate::model::{EventId, NormalizedEvent, Occurrence};

/// Identities the user asked to hide.
pub type HiddenSet = HashSet<EventId>;

/// Build the published event set from the occurrences of every series.
///
/// - Occurrences whose start is after their end are dropped with a
///   [`Warning::InvalidRange`].
/// - Occurrences of cancelled records are dropped.
/// - On an identity collision an override beats a generated occurrence;
///   otherwise the first one seen is kept.
///
/// The result is ordered by (start, identity).
pub fn normalize<'a>(
    occurrences: impl IntoIterator<Item = Occurrence<'a>>,
    hidden: &HiddenSet,
    diag: &mut Diagnostics,
) -> Vec<NormalizedEvent> {
    let mut by_id: BTreeMap<EventId, (bool, NormalizedEvent)> = BTreeMap::new();

    for occurrence in occurrences {
        let id = occurrence.id();
        if occurrence.start > occurrence.end {
            diag.record(Warning::InvalidRange {
                event_id: id.to_string(),
            });
            continue;
        }
        if occurrence.source.is_cancelled() {
            continue;
        }

        let is_override = occurrence.source.is_override();
        match by_id.entry(id) {
            Entry::Vacant(slot) => {
                let event = to_event(slot.key().clone(), &occurrence, hidden);
                slot.insert((is_override, event));
            }
            Entry::Occupied(mut slot) => {
                let (existing_is_override, _) = slot.get();
                if is_override && !existing_is_override {
                    let event = to_event(slot.key().clone(), &occurrence, hidden);
                    slot.insert((true, event));
                }
            }
        }
    }

    let mut events: Vec<NormalizedEvent> = by_id.into_values().map(|(_, event)| event).collect();
    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    events
}

/// Recompute `is_hidden` against a newer hidden set.
pub fn apply_hidden(events: &[NormalizedEvent], hidden: &HiddenSet) -> Vec<NormalizedEvent> {
    events
        .iter()
        .map(|event| NormalizedEvent {
            is_hidden: hidden.contains(&event.id),
            ..event.clone()
        })
        .collect()
}

fn to_event(id: EventId, occurrence: &Occurrence<'_>, hidden: &HiddenSet) -> NormalizedEvent {
    let source = occurrence.source;
    NormalizedEvent {
        is_hidden: hidden.contains(&id),
        id,
        title: source.summary.clone(),
        start: occurrence.start,
        end: occurrence.end,
        location: source.location.clone(),
        description: source.description.clone(),
        is_all_day: source.all_day,
    }
}
